use std::io::Write;
use crate::compiler::ast::{ClassDecl, Expr, FunctionDecl, Literal, Stmt};
use crate::compiler::lexer::Token;
use crate::util;

/// Writes statements back out as source text. Used to show the offending
/// statement under a runtime error report.
pub struct SourceWriter {
    indentation: String,
    pretty: bool,

    indent_level: usize,
}

impl SourceWriter {
    pub fn new(indentation: String, pretty: bool) -> SourceWriter {
        SourceWriter {
            indentation, pretty,
            indent_level: 0,
        }
    }

    pub fn write_to_string(&mut self, stmt: &Stmt) -> String {
        let mut out = Vec::new();

        match self.write_statement(stmt, &mut out) {
            Ok(()) => String::from_utf8_lossy(&out).into_owned(),
            Err(_) => String::new(),
        }
    }

    pub fn write_statement(&mut self, stmt: &Stmt, out: &mut impl Write) -> Result<(), std::io::Error> {
        match stmt {
            Stmt::Expression(expr) => {
                self.write_expression(expr, out)?;
                write!(out, ";")
            },
            Stmt::Print(expr) => {
                write!(out, "print ")?;
                self.write_expression(expr, out)?;
                write!(out, ";")
            },
            Stmt::Var { name, initializer } => {
                write!(out, "var {}", name.source())?;

                if let Some(initializer) = initializer {
                    write!(out, " = ")?;
                    self.write_expression(initializer, out)?;
                }

                write!(out, ";")
            },
            Stmt::Block(statements) => self.write_block(statements, out),
            Stmt::If { condition, then_branch, else_branch } => {
                write!(out, "if (")?;
                self.write_expression(condition, out)?;
                write!(out, ") ")?;
                self.write_statement(then_branch, out)?;

                if let Some(else_branch) = else_branch {
                    write!(out, " else ")?;
                    self.write_statement(else_branch, out)?;
                }

                Ok(())
            },
            Stmt::While { condition, body } => {
                write!(out, "while (")?;
                self.write_expression(condition, out)?;
                write!(out, ") ")?;
                self.write_statement(body, out)
            },
            Stmt::Function(function) => {
                write!(out, "function ")?;
                self.write_function(function, out)
            },
            Stmt::Return { value, .. } => {
                write!(out, "return")?;

                if let Some(value) = value {
                    write!(out, " ")?;
                    self.write_expression(value, out)?;
                }

                write!(out, ";")
            },
            Stmt::Class(class) => self.write_class(class, out),
            Stmt::Import { module, names } => {
                write!(out, "from {} import {};", module.source(), join_names(names))
            },
        }
    }

    fn write_block(&mut self, statements: &[Stmt], out: &mut impl Write) -> Result<(), std::io::Error> {
        write!(out, "{{")?;

        if statements.is_empty() {
            return write!(out, "}}");
        }

        if self.pretty {
            writeln!(out)?;
            self.indent_level += 1;

            let indentation = self.indentation.repeat(self.indent_level);

            for stmt in statements {
                write!(out, "{}", &indentation)?;
                self.write_statement(stmt, out)?;
                writeln!(out)?;
            }

            self.indent_level -= 1;
            write!(out, "{}}}", self.indentation.repeat(self.indent_level))?;
        } else {
            for stmt in statements {
                write!(out, " ")?;
                self.write_statement(stmt, out)?;
            }

            write!(out, " }}")?;
        }

        Ok(())
    }

    fn write_function(&mut self, function: &FunctionDecl, out: &mut impl Write) -> Result<(), std::io::Error> {
        write!(out, "{}({}) ", function.name.source(), join_names(&function.params))?;
        self.write_block(&function.body, out)
    }

    fn write_class(&mut self, class: &ClassDecl, out: &mut impl Write) -> Result<(), std::io::Error> {
        write!(out, "class {}", class.name.source())?;

        if let Some(superclass) = &class.superclass {
            write!(out, " < ")?;
            self.write_expression(superclass, out)?;
        }

        write!(out, " {{")?;

        if class.methods.is_empty() {
            return write!(out, "}}");
        }

        if self.pretty {
            writeln!(out)?;
            self.indent_level += 1;

            let indentation = self.indentation.repeat(self.indent_level);

            for method in &class.methods {
                write!(out, "{}", &indentation)?;
                self.write_function(method, out)?;
                writeln!(out)?;
            }

            self.indent_level -= 1;
            write!(out, "{}}}", self.indentation.repeat(self.indent_level))
        } else {
            for method in &class.methods {
                write!(out, " ")?;
                self.write_function(method, out)?;
            }

            write!(out, " }}")
        }
    }

    pub fn write_expression(&mut self, expr: &Expr, out: &mut impl Write) -> Result<(), std::io::Error> {
        match expr {
            Expr::Literal(literal) => match literal {
                Literal::Number(value) => write!(out, "{}", util::format_number(*value)),
                Literal::String(value) => write!(out, "\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\"")),
                Literal::Boolean(value) => write!(out, "{}", value),
                Literal::Null => write!(out, "null"),
            },
            Expr::Grouping(expr) => {
                write!(out, "(")?;
                self.write_expression(expr, out)?;
                write!(out, ")")
            },
            Expr::Unary { operator, right } => {
                write!(out, "{}", operator.source())?;
                self.write_expression(right, out)
            },
            Expr::Binary { left, operator, right } | Expr::Logical { left, operator, right } => {
                self.write_expression(left, out)?;
                write!(out, " {} ", operator.source())?;
                self.write_expression(right, out)
            },
            Expr::Variable { name, .. } => write!(out, "{}", name.source()),
            Expr::Assign { name, value, .. } => {
                write!(out, "{} = ", name.source())?;
                self.write_expression(value, out)
            },
            Expr::Call { callee, args, .. } => {
                self.write_expression(callee, out)?;
                write!(out, "(")?;

                let arg_count = args.len();

                for (i, arg) in args.iter().enumerate() {
                    self.write_expression(arg, out)?;

                    if i < arg_count - 1 {
                        write!(out, ", ")?;
                    }
                }

                write!(out, ")")
            },
            Expr::Get { object, name } => {
                self.write_expression(object, out)?;
                write!(out, ".{}", name.source())
            },
            Expr::Set { object, name, value } => {
                self.write_expression(object, out)?;
                write!(out, ".{} = ", name.source())?;
                self.write_expression(value, out)
            },
            Expr::This { .. } => write!(out, "this"),
            Expr::Super { method, .. } => write!(out, "super.{}", method.source()),
            Expr::Export { name, .. } => write!(out, "export {}", name.source()),
        }
    }
}

fn join_names(tokens: &[Token]) -> String {
    tokens.iter().map(|token| token.source()).collect::<Vec<&str>>().join(", ")
}
