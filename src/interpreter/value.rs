use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter};
use std::rc::Rc;
use crate::compiler::ast::FunctionDecl;
use crate::compiler::resolver::Locals;
use crate::interpreter::environment::{Environment, EnvironmentRef};
use crate::util;

#[derive(Clone)]
pub enum Value {
    Null,
    Boolean(bool),
    Number(f64),
    String(Rc<str>),
    Callable(Callable),
    Instance(Rc<Instance>),
}

impl Value {
    /// `null` and `false` are falsy, everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Null | Value::Boolean(false))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Callable(Callable::Class(_)) => "class",
            Value::Callable(_) => "function",
            Value::Instance(_) => "instance",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(left), Value::Boolean(right)) => left == right,
            (Value::Number(left), Value::Number(right)) => left == right,
            (Value::String(left), Value::String(right)) => left == right,
            (Value::Callable(left), Value::Callable(right)) => left.ptr_eq(right),
            (Value::Instance(left), Value::Instance(right)) => Rc::ptr_eq(left, right),
            _ => false,
        }
    }
}

/// Plain form prints strings as-is; the alternate form (`{:#}`) quotes them.
impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Boolean(value) => write!(f, "{}", value),
            Value::Number(value) => f.write_str(&util::format_number(*value)),
            Value::String(value) => if f.alternate() {
                write!(f, "\"{}\"", value)
            } else {
                f.write_str(value)
            },
            Value::Callable(callable) => write!(f, "{}", callable),
            Value::Instance(instance) => write!(f, "<instance {}>", instance.class.name),
        }
    }
}

mod colors {
    pub const NUMBER: &str = "\x1b[33m"; // Yellow
    pub const BOOLEAN: &str = "\x1b[1;32m"; // Bold green
    pub const FUNCTION: &str = "\x1b[1;32m"; // Bold green
    pub const CLASS: &str = "\x1b[1;34m"; // Bold blue
    pub const NULL: &str = "\x1b[1;37m"; // Bold white
    pub const RESET: &str = "\x1b[0m";
}

/// Terminal rendering of a value used by `print` in pretty mode. Same text as
/// the plain form, with ANSI colours around everything except strings.
pub struct Pretty<'a>(&'a Value);

impl Display for Pretty<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Value::Null => write!(f, "{}null{}", colors::NULL, colors::RESET),
            Value::Boolean(value) => write!(f, "{}{}{}", colors::BOOLEAN, value, colors::RESET),
            Value::Number(value) => write!(f, "{}{}{}", colors::NUMBER, util::format_number(*value), colors::RESET),
            Value::String(value) => f.write_str(value),
            Value::Callable(callable @ Callable::Class(_)) => write!(f, "<class {}{}{}>", colors::CLASS, callable.name(), colors::RESET),
            Value::Callable(callable @ Callable::Foreign(_)) => write!(f, "<foreign function {}{}{}>", colors::FUNCTION, callable.name(), colors::RESET),
            Value::Callable(callable) => write!(f, "<function {}{}{}>", colors::FUNCTION, callable.name(), colors::RESET),
            Value::Instance(instance) => write!(f, "<instance {}{}{}>", colors::CLASS, instance.class.name, colors::RESET),
        }
    }
}

impl Value {
    pub fn pretty(&self) -> Pretty<'_> {
        Pretty(self)
    }
}

// Environments may be cyclic, so Debug never descends into them
impl Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#}", self)
    }
}

#[derive(Clone)]
pub enum Callable {
    Declared(Rc<DeclaredFunction>),
    Foreign(Rc<ForeignFunction>),
    Class(Rc<Class>),
}

impl Callable {
    pub fn arity(&self) -> usize {
        match self {
            Callable::Declared(function) => function.arity(),
            Callable::Foreign(function) => function.arity,
            Callable::Class(class) => class.arity(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Callable::Declared(function) => function.declaration.name.source(),
            Callable::Foreign(function) => function.name,
            Callable::Class(class) => &class.name,
        }
    }

    pub fn ptr_eq(&self, other: &Callable) -> bool {
        match (self, other) {
            (Callable::Declared(left), Callable::Declared(right)) => Rc::ptr_eq(left, right),
            (Callable::Foreign(left), Callable::Foreign(right)) => Rc::ptr_eq(left, right),
            (Callable::Class(left), Callable::Class(right)) => Rc::ptr_eq(left, right),
            _ => false,
        }
    }
}

impl Display for Callable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Callable::Declared(function) => write!(f, "<function {}>", function.declaration.name.source()),
            Callable::Foreign(function) => write!(f, "<foreign function {}>", function.name),
            Callable::Class(class) => write!(f, "<class {}>", class.name),
        }
    }
}

/// A function declared in source, closed over its defining environment.
pub struct DeclaredFunction {
    pub declaration: Rc<FunctionDecl>,
    pub closure: EnvironmentRef,
    pub is_initializer: bool,
    /// Scope distances of the module the function was declared in.
    pub locals: Rc<Locals>,
}

impl DeclaredFunction {
    pub fn arity(&self) -> usize {
        self.declaration.params.len()
    }

    /// Returns a copy of this method whose closure binds `this` to `instance`.
    pub fn bind(&self, instance: Rc<Instance>) -> DeclaredFunction {
        let environment = Environment::new_with_parent(Rc::clone(&self.closure));
        environment.borrow_mut().define("this", Value::Instance(instance));

        DeclaredFunction {
            declaration: Rc::clone(&self.declaration),
            closure: environment,
            is_initializer: self.is_initializer,
            locals: Rc::clone(&self.locals),
        }
    }
}

/// A function implemented in Rust. Errors are reported against the call site.
#[derive(Clone, Copy)]
pub struct ForeignFunction {
    pub name: &'static str,
    pub arity: usize,
    pub body: fn(&[Value]) -> Result<Value, String>,
}

pub struct Class {
    pub name: String,
    pub superclass: Option<Rc<Class>>,
    pub methods: HashMap<String, Rc<DeclaredFunction>>,
}

impl Class {
    /// Looks a method up in this class, then along the superclass chain.
    pub fn find_method(&self, name: &str) -> Option<Rc<DeclaredFunction>> {
        match self.methods.get(name) {
            Some(method) => Some(Rc::clone(method)),
            None => self.superclass.as_ref().and_then(|superclass| superclass.find_method(name)),
        }
    }

    pub fn arity(&self) -> usize {
        self.find_method("init").map(|init| init.arity()).unwrap_or(0)
    }
}

pub struct Instance {
    pub class: Rc<Class>,
    fields: RefCell<HashMap<String, Value>>,
}

impl Instance {
    pub fn new(class: Rc<Class>) -> Instance {
        Instance {
            class,
            fields: RefCell::new(HashMap::new()),
        }
    }

    pub fn get_field(&self, name: &str) -> Option<Value> {
        self.fields.borrow().get(name).cloned()
    }

    pub fn set_field(&self, name: &str, value: Value) {
        self.fields.borrow_mut().insert(name.to_owned(), value);
    }
}
