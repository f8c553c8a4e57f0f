use std::collections::HashMap;
use thiserror::Error;
use crate::compiler::ast::{ClassDecl, Expr, ExprId, FunctionDecl, Stmt};
use crate::compiler::lexer::Token;
use crate::util::stack::ensure_sufficient_stack;


/// Scope distance for every resolved name-using expression.
pub type Locals = HashMap<ExprId, usize>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    #[error("Error on line {} col {}: Can't read local variable '{}' in its own initializer.", .0.line(), .0.column(), .0.source())]
    OwnInitializer(Token),
    #[error("Error on line {} col {}: Can't return from top-level code.", .0.line(), .0.column())]
    TopLevelReturn(Token),
    #[error("Error on line {} col {}: A class can't inherit from itself.", .0.line(), .0.column())]
    SelfInheritance(Token),
    #[error("Error on line {} col {}: Can't use 'this' outside of a class.", .0.line(), .0.column())]
    ThisOutsideClass(Token),
    #[error("Error on line {} col {}: Can't use 'super' outside of a class.", .0.line(), .0.column())]
    SuperOutsideClass(Token),
    #[error("Error on line {} col {}: Can't use 'super' in a class with no superclass.", .0.line(), .0.column())]
    SuperWithoutSuperclass(Token),
}

impl ResolveError {
    /// Fatal diagnostics prevent the module from running; the rest are warnings.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ResolveError::OwnInitializer(_))
    }

    pub fn token(&self) -> &Token {
        match self {
            ResolveError::OwnInitializer(token)
            | ResolveError::TopLevelReturn(token)
            | ResolveError::SelfInheritance(token)
            | ResolveError::ThisOutsideClass(token)
            | ResolveError::SuperOutsideClass(token)
            | ResolveError::SuperWithoutSuperclass(token) => token,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FunctionType {
    None, Function,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ClassType {
    None, Class, Subclass,
}

pub struct Resolver {
    /// `false` while a name is declared but its initializer has not finished.
    scopes: Vec<HashMap<String, bool>>,
    locals: Locals,

    current_function: FunctionType,
    current_class: ClassType,

    errors: Vec<ResolveError>,
}

impl Resolver {
    pub fn new() -> Resolver {
        Resolver {
            scopes: Vec::new(),
            locals: HashMap::new(),
            current_function: FunctionType::None,
            current_class: ClassType::None,
            errors: Vec::new(),
        }
    }

    /// Resolves a whole program. Returns the scope distances together with
    /// every diagnostic, fatal or not.
    pub fn resolve(mut self, program: &[Stmt]) -> (Locals, Vec<ResolveError>) {
        self.resolve_statements(program);
        (self.locals, self.errors)
    }

    fn resolve_statements(&mut self, statements: &[Stmt]) {
        for stmt in statements {
            self.resolve_statement(stmt);
        }
    }

    fn resolve_statement(&mut self, stmt: &Stmt) {
        ensure_sufficient_stack(|| self.resolve_statement_kind(stmt))
    }

    fn resolve_statement_kind(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expression(expr) | Stmt::Print(expr) => self.resolve_expression(expr),
            Stmt::Var { name, initializer } => {
                self.declare(name);

                if let Some(initializer) = initializer {
                    self.resolve_expression(initializer);
                }

                self.define(name);
            },
            Stmt::Block(statements) => {
                self.begin_scope();
                self.resolve_statements(statements);
                self.end_scope();
            },
            Stmt::If { condition, then_branch, else_branch } => {
                self.resolve_expression(condition);
                self.resolve_statement(then_branch);

                if let Some(else_branch) = else_branch {
                    self.resolve_statement(else_branch);
                }
            },
            Stmt::While { condition, body } => {
                self.resolve_expression(condition);
                self.resolve_statement(body);
            },
            Stmt::Function(function) => {
                // Defined before the body so the function can recurse
                self.declare(&function.name);
                self.define(&function.name);

                self.resolve_function(function, FunctionType::Function);
            },
            Stmt::Return { keyword, value } => {
                if self.current_function == FunctionType::None {
                    self.errors.push(ResolveError::TopLevelReturn(keyword.clone()));
                }

                if let Some(value) = value {
                    self.resolve_expression(value);
                }
            },
            Stmt::Class(class) => self.resolve_class(class),
            Stmt::Import { names, .. } => {
                for name in names {
                    self.declare(name);
                    self.define(name);
                }
            },
        }
    }

    fn resolve_class(&mut self, class: &ClassDecl) {
        let enclosing_class = self.current_class;
        self.current_class = ClassType::Class;

        self.declare(&class.name);
        self.define(&class.name);

        if let Some(superclass) = &class.superclass {
            if let Expr::Variable { name, .. } = superclass {
                if name.source() == class.name.source() {
                    self.errors.push(ResolveError::SelfInheritance(name.clone()));
                }
            }

            self.current_class = ClassType::Subclass;
            self.resolve_expression(superclass);

            self.begin_scope();
            self.define_name("super");
        }

        self.begin_scope();
        self.define_name("this");

        for method in &class.methods {
            self.resolve_function(method, FunctionType::Function);
        }

        self.end_scope();

        if class.superclass.is_some() {
            self.end_scope();
        }

        self.current_class = enclosing_class;
    }

    fn resolve_function(&mut self, function: &FunctionDecl, function_type: FunctionType) {
        let enclosing_function = self.current_function;
        self.current_function = function_type;

        self.begin_scope();

        for param in &function.params {
            self.declare(param);
            self.define(param);
        }

        self.resolve_statements(&function.body);
        self.end_scope();

        self.current_function = enclosing_function;
    }

    fn resolve_expression(&mut self, expr: &Expr) {
        ensure_sufficient_stack(|| self.resolve_expression_kind(expr))
    }

    fn resolve_expression_kind(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal(_) => {},
            Expr::Grouping(expr) => self.resolve_expression(expr),
            Expr::Unary { right, .. } => self.resolve_expression(right),
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.resolve_expression(left);
                self.resolve_expression(right);
            },
            Expr::Variable { id, name } => {
                if let Some(scope) = self.scopes.last() {
                    if scope.get(name.source()) == Some(&false) {
                        self.errors.push(ResolveError::OwnInitializer(name.clone()));
                    }
                }

                self.resolve_local(*id, name);
            },
            Expr::Assign { id, name, value } => {
                self.resolve_expression(value);
                self.resolve_local(*id, name);
            },
            Expr::Call { callee, args, .. } => {
                self.resolve_expression(callee);

                for arg in args {
                    self.resolve_expression(arg);
                }
            },
            Expr::Get { object, .. } => self.resolve_expression(object),
            Expr::Set { object, value, .. } => {
                self.resolve_expression(value);
                self.resolve_expression(object);
            },
            Expr::This { id, keyword } => {
                if self.current_class == ClassType::None {
                    self.errors.push(ResolveError::ThisOutsideClass(keyword.clone()));
                    return;
                }

                self.resolve_local(*id, keyword);
            },
            Expr::Super { id, keyword, .. } => {
                match self.current_class {
                    ClassType::None => self.errors.push(ResolveError::SuperOutsideClass(keyword.clone())),
                    ClassType::Class => self.errors.push(ResolveError::SuperWithoutSuperclass(keyword.clone())),
                    ClassType::Subclass => self.resolve_local(*id, keyword),
                }
            },
            Expr::Export { id, name } => self.resolve_local(*id, name),
        }
    }

    /// Records the distance to the innermost scope declaring `name`. Names
    /// not found in any scope are left to the global fallback.
    fn resolve_local(&mut self, id: ExprId, name: &Token) {
        for (distance, scope) in self.scopes.iter().rev().enumerate() {
            if scope.contains_key(name.source()) {
                self.locals.insert(id, distance);
                return;
            }
        }
    }

    fn begin_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &Token) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.source().to_owned(), false);
        }
    }

    fn define(&mut self, name: &Token) {
        self.define_name(name.source());
    }

    fn define_name(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_owned(), true);
        }
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Resolver::new()
    }
}
