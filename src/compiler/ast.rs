use std::fmt::{Debug, Formatter};
use std::rc::Rc;
use crate::compiler::lexer::Token;
use crate::util;

/// Identity of a name-using expression node, assigned by the parser.
/// The resolver keys its scope distances on this, so two occurrences of
/// the same name can resolve differently.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(pub usize);

#[derive(Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    String(Rc<str>),
    Boolean(bool),
    Null,
}

#[derive(Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Grouping(Box<Expr>),

    Unary {
        operator: Token,
        right: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        operator: Token,
        right: Box<Expr>,
    },
    Logical {
        left: Box<Expr>,
        operator: Token,
        right: Box<Expr>,
    },

    Variable {
        id: ExprId,
        name: Token,
    },
    Assign {
        id: ExprId,
        name: Token,
        value: Box<Expr>,
    },

    Call {
        callee: Box<Expr>,
        paren: Token,
        args: Vec<Expr>,
    },
    Get {
        object: Box<Expr>,
        name: Token,
    },
    Set {
        object: Box<Expr>,
        name: Token,
        value: Box<Expr>,
    },

    This {
        id: ExprId,
        keyword: Token,
    },
    Super {
        id: ExprId,
        keyword: Token,
        method: Token,
    },
    Export {
        id: ExprId,
        name: Token,
    },
}

impl Expr {
    /// The token an error about this expression should point at.
    pub fn token(&self) -> Option<&Token> {
        match self {
            Expr::Literal(_) => None,
            Expr::Grouping(expr) => expr.token(),
            Expr::Unary { operator, .. } => Some(operator),
            Expr::Binary { operator, .. } => Some(operator),
            Expr::Logical { operator, .. } => Some(operator),
            Expr::Variable { name, .. } => Some(name),
            Expr::Assign { name, .. } => Some(name),
            Expr::Call { paren, .. } => Some(paren),
            Expr::Get { name, .. } => Some(name),
            Expr::Set { name, .. } => Some(name),
            Expr::This { keyword, .. } => Some(keyword),
            Expr::Super { keyword, .. } => Some(keyword),
            Expr::Export { name, .. } => Some(name),
        }
    }
}

#[derive(PartialEq)]
pub struct FunctionDecl {
    pub name: Token,
    pub params: Vec<Token>,
    pub body: Vec<Stmt>,
}

#[derive(Clone, PartialEq)]
pub struct ClassDecl {
    pub name: Token,
    /// Always an [`Expr::Variable`] when present.
    pub superclass: Option<Expr>,
    pub methods: Vec<Rc<FunctionDecl>>,
}

#[derive(Clone, PartialEq)]
pub enum Stmt {
    Expression(Expr),
    Print(Expr),
    Var {
        name: Token,
        initializer: Option<Expr>,
    },
    Block(Vec<Stmt>),
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
    },
    Function(Rc<FunctionDecl>),
    Return {
        keyword: Token,
        value: Option<Expr>,
    },
    Class(ClassDecl),
    Import {
        module: Token,
        names: Vec<Token>,
    },
}

fn join<T: Debug>(items: &[T], separator: &str) -> String {
    items.iter().map(|item| format!("{:?}", item)).collect::<Vec<String>>().join(separator)
}

fn join_names(tokens: &[Token]) -> String {
    tokens.iter().map(|token| token.source().to_owned()).collect::<Vec<String>>().join(", ")
}

impl Debug for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Number(value) => f.write_str(&util::format_number(*value)),
            Literal::String(value) => write!(f, "\"{}\"", value),
            Literal::Boolean(value) => write!(f, "{}", value),
            Literal::Null => f.write_str("null"),
        }
    }
}

impl Debug for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Literal(value) => write!(f, "{:?}", value),
            Expr::Grouping(expr) => write!(f, "(group {:?})", expr),
            Expr::Unary { operator, right } => write!(f, "({}{:?})", operator.source(), right),
            Expr::Binary { left, operator, right }
            | Expr::Logical { left, operator, right } => write!(f, "({:?} {} {:?})", left, operator.source(), right),
            Expr::Variable { name, .. } => f.write_str(name.source()),
            Expr::Assign { name, value, .. } => write!(f, "({} = {:?})", name.source(), value),
            Expr::Call { callee, args, .. } => write!(f, "({:?}({}))", callee, join(args, ", ")),
            Expr::Get { object, name } => write!(f, "({:?}.{})", object, name.source()),
            Expr::Set { object, name, value } => write!(f, "({:?}.{} = {:?})", object, name.source(), value),
            Expr::This { .. } => f.write_str("this"),
            Expr::Super { method, .. } => write!(f, "super.{}", method.source()),
            Expr::Export { name, .. } => write!(f, "(export {})", name.source()),
        }
    }
}

impl Debug for FunctionDecl {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({}) {{ {} }}", self.name.source(), join_names(&self.params), join(&self.body, " "))
    }
}

impl Debug for ClassDecl {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "class {}", self.name.source())?;

        if let Some(superclass) = &self.superclass {
            write!(f, " < {:?}", superclass)?;
        }

        write!(f, " {{ {} }}", join(&self.methods, " "))
    }
}

impl Debug for Stmt {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Stmt::Expression(expr) => write!(f, "{:?};", expr),
            Stmt::Print(expr) => write!(f, "print {:?};", expr),
            Stmt::Var { name, initializer: Some(initializer) } => write!(f, "var {} = {:?};", name.source(), initializer),
            Stmt::Var { name, initializer: None } => write!(f, "var {};", name.source()),
            Stmt::Block(statements) => write!(f, "{{ {} }}", join(statements, " ")),
            Stmt::If { condition, then_branch, else_branch } => {
                write!(f, "if ({:?}) {:?}", condition, then_branch)?;

                match else_branch {
                    Some(else_branch) => write!(f, " else {:?}", else_branch),
                    None => Ok(()),
                }
            },
            Stmt::While { condition, body } => write!(f, "while ({:?}) {:?}", condition, body),
            Stmt::Function(function) => write!(f, "function {:?}", function),
            Stmt::Return { value: Some(value), .. } => write!(f, "return {:?};", value),
            Stmt::Return { value: None, .. } => f.write_str("return;"),
            Stmt::Class(class) => write!(f, "{:?}", class),
            Stmt::Import { module, names } => write!(f, "from {} import {};", module.source(), join_names(names)),
        }
    }
}
