use std::rc::Rc;
use lazy_static::lazy_static;
use thiserror::Error;
use crate::compiler::ast::{ClassDecl, Expr, ExprId, FunctionDecl, Literal, Stmt};
use crate::compiler::lexer::{Token, TokenType};
use crate::util::stack::ensure_sufficient_stack;

#[cfg(test)]
mod tests;

const MAX_ARGUMENTS: usize = 255;

lazy_static! {
    /// Tokens that start a statement; error recovery stops in front of them.
    static ref STATEMENT_KEYWORDS: [TokenType; 9] = [
        TokenType::Class, TokenType::Function, TokenType::Var,
        TokenType::For, TokenType::If, TokenType::While,
        TokenType::Print, TokenType::Return,
        TokenType::From,
    ];
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("Error on line {} col {}: {}", .token.line(), .token.column(), .message)]
pub struct ParseError {
    pub token: Token,
    pub message: String,
}

type ParseResult<T> = Result<T, ParseError>;

pub struct Parser {
    tokens: std::vec::IntoIter<Token>,
    previous: Token, current: Token,
    consumed: usize,
    /// Number of `{ ... }` blocks currently open.
    block_depth: usize,

    next_id: usize,
    errors: Vec<ParseError>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Parser {
        Parser {
            tokens: tokens.into_iter(),
            previous: Token::empty(), current: Token::empty(),
            consumed: 0,
            block_depth: 0,
            next_id: 0,
            errors: Vec::new(),
        }
    }

    pub fn had_error(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<ParseError> {
        self.errors
    }

    // Declaration parsing

    /// Parses the whole token stream. Malformed declarations are recorded in
    /// [`Parser::errors`] and skipped; everything else is returned.
    pub fn parse(&mut self) -> Vec<Stmt> {
        self.consume();

        let mut statements = Vec::new();

        while !self.is_eof() {
            if let Some(stmt) = self.parse_declaration() {
                statements.push(stmt);
            }
        }

        statements
    }

    fn parse_declaration(&mut self) -> Option<Stmt> {
        ensure_sufficient_stack(|| self.parse_declaration_or_recover())
    }

    fn parse_declaration_or_recover(&mut self) -> Option<Stmt> {
        if self.matches(TokenType::Semicolon) {
            return None;
        }

        let start = self.consumed;

        let result = if self.matches(TokenType::Function) {
            self.parse_function("function").map(|function| Stmt::Function(Rc::new(function)))
        } else if self.matches(TokenType::Var) {
            self.parse_var_declaration()
        } else if self.matches(TokenType::Class) {
            self.parse_class_declaration()
        } else if self.matches(TokenType::From) {
            self.parse_import_declaration()
        } else {
            self.parse_statement()
        };

        match result {
            Ok(stmt) => Some(stmt),
            Err(error) => {
                self.errors.push(error);
                self.synchronize(start);
                None
            },
        }
    }

    fn parse_function(&mut self, kind: &str) -> ParseResult<FunctionDecl> {
        let name = self.expect(TokenType::Identifier, &format!("Expect {} name.", kind))?;
        self.expect(TokenType::ParenthesisLeft, &format!("Expect '(' after {} name.", kind))?;

        let mut params = vec![];

        if !self.check(TokenType::ParenthesisRight) {
            loop {
                if params.len() >= MAX_ARGUMENTS {
                    self.report_at_current("Can't have more than 255 parameters.");
                }

                params.push(self.expect(TokenType::Identifier, "Expect parameter name.")?);

                if !self.matches(TokenType::Comma) {
                    break;
                }
            }
        }

        self.expect(TokenType::ParenthesisRight, "Expect ')' after parameters.")?;
        self.expect(TokenType::BracketLeft, &format!("Expect '{{' before {} body.", kind))?;

        let body = self.parse_block()?;
        Ok(FunctionDecl { name, params, body })
    }

    fn parse_var_declaration(&mut self) -> ParseResult<Stmt> {
        let name = self.expect(TokenType::Identifier, "Expect variable name.")?;

        let initializer = if self.matches(TokenType::Assign) {
            Some(self.parse_expression()?)
        } else {
            None
        };

        self.skip_statement_end();
        Ok(Stmt::Var { name, initializer })
    }

    fn parse_class_declaration(&mut self) -> ParseResult<Stmt> {
        let name = self.expect(TokenType::Identifier, "Expect class name.")?;

        let superclass = if self.matches(TokenType::Less) {
            let name = self.expect(TokenType::Identifier, "Expect superclass name.")?;
            Some(Expr::Variable { id: self.next_id(), name })
        } else {
            None
        };

        self.expect(TokenType::BracketLeft, "Expect '{' before class body.")?;

        let mut methods = vec![];

        while !self.check(TokenType::BracketRight) && !self.is_eof() {
            methods.push(Rc::new(self.parse_function("method")?));
        }

        self.expect(TokenType::BracketRight, "Expect '}' after class body.")?;
        Ok(Stmt::Class(ClassDecl { name, superclass, methods }))
    }

    fn parse_import_declaration(&mut self) -> ParseResult<Stmt> {
        let module = self.expect(TokenType::Identifier, "Expect module name after 'from'.")?;
        self.expect(TokenType::Import, "Missing import keyword.")?;

        let mut names = vec![self.expect(TokenType::Identifier, "Expect name after 'import'.")?];

        while self.matches(TokenType::Comma) {
            names.push(self.expect(TokenType::Identifier, "Expect name after ','.")?);
        }

        self.skip_statement_end();
        Ok(Stmt::Import { module, names })
    }

    // Statements

    fn parse_statement(&mut self) -> ParseResult<Stmt> {
        if self.matches(TokenType::Print) {
            let value = self.parse_expression()?;
            self.skip_statement_end();

            Ok(Stmt::Print(value))
        } else if self.matches(TokenType::BracketLeft) {
            Ok(Stmt::Block(self.parse_block()?))
        } else if self.matches(TokenType::If) {
            self.parse_if_statement()
        } else if self.matches(TokenType::While) {
            self.parse_while_statement()
        } else if self.matches(TokenType::For) {
            self.parse_for_statement()
        } else if self.matches(TokenType::Return) {
            self.parse_return_statement()
        } else {
            let expr = self.parse_expression()?;
            self.skip_statement_end();

            Ok(Stmt::Expression(expr))
        }
    }

    fn parse_block(&mut self) -> ParseResult<Vec<Stmt>> {
        let mut statements = vec![];
        self.block_depth += 1;

        while !self.check(TokenType::BracketRight) && !self.is_eof() {
            if let Some(stmt) = self.parse_declaration() {
                statements.push(stmt);
            }
        }

        self.block_depth -= 1;

        self.expect(TokenType::BracketRight, "Expect '}' after block.")?;
        Ok(statements)
    }

    fn parse_if_statement(&mut self) -> ParseResult<Stmt> {
        self.expect(TokenType::ParenthesisLeft, "Expect '(' after 'if'.")?;
        let condition = self.parse_expression()?;
        self.expect(TokenType::ParenthesisRight, "Expect ')' after if condition.")?;

        let then_branch = Box::new(self.parse_statement()?);
        let else_branch = if self.matches(TokenType::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };

        Ok(Stmt::If { condition, then_branch, else_branch })
    }

    fn parse_while_statement(&mut self) -> ParseResult<Stmt> {
        self.expect(TokenType::ParenthesisLeft, "Expect '(' after 'while'.")?;
        let condition = self.parse_expression()?;
        self.expect(TokenType::ParenthesisRight, "Expect ')' after condition.")?;

        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::While { condition, body })
    }

    /// `for` has no node of its own; it becomes a `while` inside a block.
    fn parse_for_statement(&mut self) -> ParseResult<Stmt> {
        self.expect(TokenType::ParenthesisLeft, "Expect '(' after 'for'.")?;

        let initializer = if self.matches(TokenType::Semicolon) {
            None
        } else if self.matches(TokenType::Var) {
            Some(self.parse_var_declaration()?)
        } else {
            let expr = self.parse_expression()?;
            self.skip_statement_end();
            Some(Stmt::Expression(expr))
        };

        let condition = if !self.check(TokenType::Semicolon) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect(TokenType::Semicolon, "Expect ';' after loop condition.")?;

        let increment = if !self.check(TokenType::ParenthesisRight) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect(TokenType::ParenthesisRight, "Expect ')' after for clauses.")?;

        let mut body = self.parse_statement()?;

        if let Some(increment) = increment {
            body = Stmt::Block(vec![body, Stmt::Expression(increment)]);
        }

        let condition = condition.unwrap_or(Expr::Literal(Literal::Boolean(true)));
        body = Stmt::While { condition, body: Box::new(body) };

        if let Some(initializer) = initializer {
            body = Stmt::Block(vec![initializer, body]);
        }

        Ok(body)
    }

    fn parse_return_statement(&mut self) -> ParseResult<Stmt> {
        let keyword = self.previous.clone();

        let value = if self.check(TokenType::Semicolon) || self.check(TokenType::BracketRight) || self.is_eof() {
            None
        } else {
            Some(self.parse_expression()?)
        };

        self.skip_statement_end();
        Ok(Stmt::Return { keyword, value })
    }

    // Expression parsing

    fn parse_expression(&mut self) -> ParseResult<Expr> {
        ensure_sufficient_stack(|| self.parse_assignment())
    }

    fn parse_assignment(&mut self) -> ParseResult<Expr> {
        let expr = self.parse_or()?;

        if self.matches(TokenType::Assign) {
            let equals = self.previous.clone();
            let value = Box::new(self.parse_assignment()?);

            return match expr {
                Expr::Variable { name, .. } => Ok(Expr::Assign { id: self.next_id(), name, value }),
                Expr::Get { object, name } => Ok(Expr::Set { object, name, value }),
                _ => Err(Self::error_at(&equals, "Invalid assignment target.")),
            };
        }

        Ok(expr)
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_and()?;

        while self.matches(TokenType::Or) {
            let operator = self.previous.clone();
            let right = self.parse_and()?;

            expr = Expr::Logical { left: Box::new(expr), operator, right: Box::new(right) };
        }

        Ok(expr)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_equality()?;

        while self.matches(TokenType::And) {
            let operator = self.previous.clone();
            let right = self.parse_equality()?;

            expr = Expr::Logical { left: Box::new(expr), operator, right: Box::new(right) };
        }

        Ok(expr)
    }

    fn parse_equality(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_comparison()?;

        while self.matches_any(&[TokenType::Equal, TokenType::NotEqual]) {
            let operator = self.previous.clone();
            let right = self.parse_comparison()?;

            expr = Expr::Binary { left: Box::new(expr), operator, right: Box::new(right) };
        }

        Ok(expr)
    }

    fn parse_comparison(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_term()?;

        while self.matches_any(&[TokenType::Less, TokenType::LessEqual, TokenType::Greater, TokenType::GreaterEqual]) {
            let operator = self.previous.clone();
            let right = self.parse_term()?;

            expr = Expr::Binary { left: Box::new(expr), operator, right: Box::new(right) };
        }

        Ok(expr)
    }

    fn parse_term(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_factor()?;

        while self.matches_any(&[TokenType::Plus, TokenType::Minus]) {
            let operator = self.previous.clone();
            let right = self.parse_factor()?;

            expr = Expr::Binary { left: Box::new(expr), operator, right: Box::new(right) };
        }

        Ok(expr)
    }

    fn parse_factor(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_unary()?;

        while self.matches_any(&[TokenType::Multiply, TokenType::Divide]) {
            let operator = self.previous.clone();
            let right = self.parse_unary()?;

            expr = Expr::Binary { left: Box::new(expr), operator, right: Box::new(right) };
        }

        Ok(expr)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        if self.matches_any(&[TokenType::Minus, TokenType::Not]) {
            let operator = self.previous.clone();
            let right = self.parse_unary()?;

            return Ok(Expr::Unary { operator, right: Box::new(right) });
        }

        self.parse_call()
    }

    fn parse_call(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;

        loop {
            if self.matches(TokenType::ParenthesisLeft) {
                expr = self.finish_call(expr)?;
            } else if self.matches(TokenType::Dot) {
                let name = self.expect(TokenType::Identifier, "Expect property name after '.'.")?;
                expr = Expr::Get { object: Box::new(expr), name };
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> ParseResult<Expr> {
        let mut args = vec![];

        if !self.check(TokenType::ParenthesisRight) {
            args.push(self.parse_expression()?);

            while self.matches(TokenType::Comma) {
                if args.len() >= MAX_ARGUMENTS {
                    self.report_at_current("Can't have more than 255 arguments.");
                }

                args.push(self.parse_expression()?);
            }
        }

        let paren = self.expect(TokenType::ParenthesisRight, "Expect ')' after arguments.")?;
        Ok(Expr::Call { callee: Box::new(callee), paren, args })
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        if self.matches(TokenType::False) {
            return Ok(Expr::Literal(Literal::Boolean(false)));
        } else if self.matches(TokenType::True) {
            return Ok(Expr::Literal(Literal::Boolean(true)));
        } else if self.matches(TokenType::Null) {
            return Ok(Expr::Literal(Literal::Null));
        } else if self.matches(TokenType::Number) {
            let number = self.previous.clone();

            return match number.source().parse::<f64>() {
                Ok(value) => Ok(Expr::Literal(Literal::Number(value))),
                Err(err) => Err(Self::error_at(&number, &format!("Failed to parse number literal: {}", err))),
            };
        } else if self.matches(TokenType::String) {
            return Ok(Expr::Literal(Literal::String(Rc::from(self.previous.source()))));
        } else if self.matches(TokenType::ParenthesisLeft) {
            let expr = self.parse_expression()?;
            self.expect(TokenType::ParenthesisRight, "Expect ')' after expression.")?;

            return Ok(Expr::Grouping(Box::new(expr)));
        } else if self.matches(TokenType::Super) {
            let keyword = self.previous.clone();
            self.expect(TokenType::Dot, "Expect '.' after 'super'.")?;
            let method = self.expect(TokenType::Identifier, "Expect superclass method name.")?;

            return Ok(Expr::Super { id: self.next_id(), keyword, method });
        } else if self.matches(TokenType::This) {
            return Ok(Expr::This { id: self.next_id(), keyword: self.previous.clone() });
        } else if self.matches(TokenType::Export) {
            let name = self.expect(TokenType::Identifier, "Expect name after 'export'.")?;
            return Ok(Expr::Export { id: self.next_id(), name });
        } else if self.matches(TokenType::Identifier) {
            return Ok(Expr::Variable { id: self.next_id(), name: self.previous.clone() });
        }

        Err(Self::error_at(&self.current, "Expect expression."))
    }

    // Token handling

    fn next_id(&mut self) -> ExprId {
        let id = ExprId(self.next_id);
        self.next_id += 1;
        id
    }

    fn consume(&mut self) {
        std::mem::swap(&mut self.previous, &mut self.current);

        self.current = match self.tokens.next() {
            Some(token) => token,
            // Keep returning the final token once the stream is drained
            None => Token::new(TokenType::Eof, String::new(), *self.previous.end(), *self.previous.end()),
        };

        self.consumed += 1;
    }

    fn expect(&mut self, token_type: TokenType, message: &str) -> ParseResult<Token> {
        if self.current.token_type() == token_type {
            self.consume();
            return Ok(self.previous.clone());
        }

        Err(Self::error_at(&self.current, message))
    }

    /// Statement-ending semicolons are optional.
    #[inline]
    fn skip_statement_end(&mut self) {
        self.matches(TokenType::Semicolon);
    }

    fn matches(&mut self, token_type: TokenType) -> bool { // Should be called "match", but that's a keyword
        if !self.check(token_type) {
            return false;
        }

        self.consume();
        true
    }

    fn matches_any(&mut self, token_types: &[TokenType]) -> bool {
        for token_type in token_types {
            if self.check(*token_type) {
                self.consume();
                return true;
            }
        }

        false
    }

    #[inline]
    fn check(&self, token_type: TokenType) -> bool {
        self.current.token_type() == token_type
    }

    fn is_eof(&self) -> bool {
        self.current.token_type() == TokenType::Eof
    }

    // Error handling

    /// Skips tokens until the next statement boundary, or until the `}` that
    /// closes the enclosing block. Always makes progress if the failed
    /// declaration consumed nothing.
    fn synchronize(&mut self, start: usize) {
        if self.consumed == start {
            self.consume();
        }

        while !self.is_eof() {
            if self.previous.token_type() == TokenType::Semicolon {
                return;
            }

            if STATEMENT_KEYWORDS.contains(&self.current.token_type()) {
                return;
            }

            if self.block_depth > 0 && self.check(TokenType::BracketRight) {
                return;
            }

            self.consume();
        }
    }

    fn error_at(token: &Token, message: &str) -> ParseError {
        ParseError { token: token.clone(), message: message.to_owned() }
    }

    fn report_at_current(&mut self, message: &str) {
        let error = Self::error_at(&self.current, message);
        self.errors.push(error);
    }
}
