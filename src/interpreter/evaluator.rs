use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};
use indexmap::IndexMap;
use thiserror::Error;
use crate::compiler::ast::{ClassDecl, Expr, ExprId, Literal, Stmt};
use crate::compiler::lexer::{Lexer, Token, TokenType};
use crate::compiler::parser::{ParseError, Parser};
use crate::compiler::resolver::{Locals, ResolveError, Resolver};
use crate::compiler::writer::SourceWriter;
use crate::error::Error;
use crate::util::stack::ensure_sufficient_stack;
use crate::interpreter::environment::{Environment, EnvironmentRef};
use crate::interpreter::value::{Callable, Class, DeclaredFunction, ForeignFunction, Instance, Value};

#[cfg(test)]
mod tests;

pub const DEFAULT_MAX_CALL_DEPTH: usize = 1000;

/// Destination of `print`. Shared with every module evaluator spawned by imports.
pub type SharedOutput = Rc<RefCell<dyn Write>>;

#[derive(Debug, Clone)]
pub struct EvaluatorOptions {
    /// Colour `print` output for a terminal.
    pub pretty: bool,
    /// Directory user modules are loaded from.
    pub module_root: PathBuf,
    pub max_call_depth: usize,
}

impl EvaluatorOptions {
    pub fn new(module_root: PathBuf) -> EvaluatorOptions {
        EvaluatorOptions {
            pretty: false,
            module_root,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ImportFailure {
    #[error("Could not find module '{0}'.")]
    NotFound(String),
    #[error("Module {module} does not export {}.", quote_names(.names))]
    MissingExports {
        module: String,
        names: Vec<String>,
    },
    #[error("Circular import of module '{0}'.")]
    Circular(String),
    #[error("Module '{0}' failed to run.")]
    ModuleFailed(String),
}

fn quote_names(names: &[String]) -> String {
    names.iter().map(|name| format!("\"{}\"", name)).collect::<Vec<String>>().join(", ")
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("Error on line {} col {}: Undefined variable '{}'.", .0.line(), .0.column(), .0.source())]
    UndefinedVariable(Token),
    #[error("Error on line {} col {}: Expected {expected} arguments but got {found}.", .token.line(), .token.column())]
    ArityMismatch {
        token: Token,
        expected: usize,
        found: usize,
    },
    #[error("Error on line {} col {}: Can only call functions and classes.", .0.line(), .0.column())]
    NotCallable(Token),
    #[error("Error on line {} col {}: {message}", .token.line(), .token.column())]
    InvalidPropertyAccess {
        token: Token,
        message: String,
    },
    #[error("Error on line {} col {}: {failure}", .token.line(), .token.column())]
    ImportError {
        token: Token,
        failure: ImportFailure,
    },
    #[error("Error on line {} col {}: Superclass must be a class.", .0.line(), .0.column())]
    InvalidSuperclass(Token),
    #[error("Error on line {} col {}: {message}", .token.line(), .token.column())]
    InvalidOperand {
        token: Token,
        message: String,
    },
    #[error("Error on line {} col {}: Stack overflow.", .0.line(), .0.column())]
    StackOverflow(Token),
}

impl RuntimeError {
    fn invalid_operand(token: &Token, message: &str) -> RuntimeError {
        RuntimeError::InvalidOperand { token: token.clone(), message: message.to_owned() }
    }

    fn invalid_property_access(token: &Token, message: &str) -> RuntimeError {
        RuntimeError::InvalidPropertyAccess { token: token.clone(), message: message.to_owned() }
    }
}

/// Outcome of executing a statement. A `return` travels up as
/// [`ControlFlow::Return`] until the enclosing call consumes it.
#[derive(Debug, Clone)]
pub enum ControlFlow {
    Normal(Value),
    Return(Value),
}

type ExecResult = Result<ControlFlow, RuntimeError>;
type EvalResult = Result<Value, RuntimeError>;

pub struct Evaluator {
    options: Rc<EvaluatorOptions>,
    output: SharedOutput,

    globals: EnvironmentRef,
    environment: EnvironmentRef,
    locals: Rc<Locals>,
    exports: IndexMap<String, Value>,

    /// Files of the modules currently being loaded, outermost first.
    pub(crate) import_chain: Vec<PathBuf>,
    call_depth: usize,

    failed_statement: Option<usize>,
    parse_errors: Vec<ParseError>,
}

impl Evaluator {
    pub fn new(options: Rc<EvaluatorOptions>, output: SharedOutput) -> Evaluator {
        let globals = Environment::new_global();

        globals.borrow_mut().define("clock", Value::Callable(Callable::Foreign(Rc::new(CLOCK))));

        Evaluator {
            options, output,
            environment: Rc::clone(&globals),
            globals,
            locals: Rc::new(HashMap::new()),
            exports: IndexMap::new(),
            import_chain: Vec::new(),
            call_depth: 0,
            failed_statement: None,
            parse_errors: Vec::new(),
        }
    }

    /// Evaluator for a module file, aware of the modules already being loaded.
    pub fn with_import_chain(options: Rc<EvaluatorOptions>, output: SharedOutput, import_chain: Vec<PathBuf>) -> Evaluator {
        let mut evaluator = Evaluator::new(options, output);
        evaluator.import_chain = import_chain;
        evaluator
    }

    pub fn options(&self) -> &Rc<EvaluatorOptions> {
        &self.options
    }

    pub fn output(&self) -> &SharedOutput {
        &self.output
    }

    pub fn exports(&self) -> &IndexMap<String, Value> {
        &self.exports
    }

    pub fn into_exports(self) -> IndexMap<String, Value> {
        self.exports
    }

    /// Registers a global that only the name-based fallback lookup can see.
    pub fn define_global(&mut self, name: &str, value: Value) {
        self.globals.borrow_mut().define(name, value);
    }

    /// Index of the top-level statement the last runtime error came from.
    pub fn failed_statement(&self) -> Option<usize> {
        self.failed_statement
    }

    pub fn parse_errors(&self) -> &[ParseError] {
        &self.parse_errors
    }

    pub fn had_error(&self) -> bool {
        !self.parse_errors.is_empty()
    }

    /// Runs a whole source file, writing every diagnostic to stderr. Parse
    /// errors are reported and the statements that did parse still run.
    pub fn run_source(&mut self, source: &str) -> Result<Value, Error> {
        let tokens = match Lexer::new(source).tokenize() {
            Ok(tokens) => tokens,
            Err(err) => {
                eprintln!("{}", err);
                return Err(err.into());
            },
        };

        let mut parser = Parser::new(tokens);
        let program = parser.parse();

        for error in parser.errors() {
            eprintln!("{}", error);
        }

        self.parse_errors.extend(parser.into_errors());

        match self.interpret(&program) {
            Ok(value) => Ok(value),
            Err(Error::Runtime(err)) => {
                eprintln!("{}", err);

                if let Some(stmt) = self.failed_statement.and_then(|index| program.get(index)) {
                    let mut writer = SourceWriter::new(String::from("    "), self.options.pretty);
                    eprintln!("{}", writer.write_to_string(stmt));
                }

                Err(Error::Runtime(err))
            },
            Err(err) => {
                eprintln!("{}", err);
                Err(err)
            },
        }
    }

    /// Resolves and executes a parsed program. Yields the value of the last
    /// statement if it is an expression statement, else `null`.
    pub fn interpret(&mut self, program: &[Stmt]) -> Result<Value, Error> {
        let (locals, diagnostics) = Resolver::new().resolve(program);
        let (fatal, warnings): (Vec<ResolveError>, Vec<ResolveError>) = diagnostics.into_iter().partition(ResolveError::is_fatal);

        for warning in &warnings {
            eprintln!("{}", warning);
        }

        if !fatal.is_empty() {
            return Err(Error::Resolve(fatal));
        }

        self.locals = Rc::new(locals);
        self.failed_statement = None;

        let mut last = Value::Null;

        for (index, stmt) in program.iter().enumerate() {
            match self.execute(stmt) {
                Ok(ControlFlow::Normal(value)) | Ok(ControlFlow::Return(value)) => last = value,
                Err(err) => {
                    self.failed_statement = Some(index);
                    return Err(err.into());
                },
            }
        }

        match program.last() {
            Some(Stmt::Expression(_)) => Ok(last),
            _ => Ok(Value::Null),
        }
    }

    // Statements

    fn execute(&mut self, stmt: &Stmt) -> ExecResult {
        ensure_sufficient_stack(|| self.execute_statement(stmt))
    }

    fn execute_statement(&mut self, stmt: &Stmt) -> ExecResult {
        match stmt {
            Stmt::Expression(expr) => Ok(ControlFlow::Normal(self.evaluate(expr)?)),
            Stmt::Print(expr) => {
                let value = self.evaluate(expr)?;
                let result = if self.options.pretty {
                    writeln!(self.output.borrow_mut(), "{}", value.pretty())
                } else {
                    writeln!(self.output.borrow_mut(), "{}", value)
                };

                if let Err(err) = result {
                    tracing::error!("Failed to write output: {}", err);
                }

                Ok(ControlFlow::Normal(Value::Null))
            },
            Stmt::Var { name, initializer } => {
                let value = match initializer {
                    Some(initializer) => self.evaluate(initializer)?,
                    None => Value::Null,
                };

                self.environment.borrow_mut().define(name.source(), value);
                Ok(ControlFlow::Normal(Value::Null))
            },
            Stmt::Block(statements) => {
                let environment = Environment::new_with_parent(Rc::clone(&self.environment));
                self.execute_block(statements, environment)
            },
            Stmt::If { condition, then_branch, else_branch } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.execute(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.execute(else_branch)
                } else {
                    Ok(ControlFlow::Normal(Value::Null))
                }
            },
            Stmt::While { condition, body } => {
                while self.evaluate(condition)?.is_truthy() {
                    if let ControlFlow::Return(value) = self.execute(body)? {
                        return Ok(ControlFlow::Return(value));
                    }
                }

                Ok(ControlFlow::Normal(Value::Null))
            },
            Stmt::Function(declaration) => {
                let function = DeclaredFunction {
                    declaration: Rc::clone(declaration),
                    closure: Rc::clone(&self.environment),
                    is_initializer: false,
                    locals: Rc::clone(&self.locals),
                };

                self.environment.borrow_mut().define(declaration.name.source(), Value::Callable(Callable::Declared(Rc::new(function))));
                Ok(ControlFlow::Normal(Value::Null))
            },
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(value) => self.evaluate(value)?,
                    None => Value::Null,
                };

                Ok(ControlFlow::Return(value))
            },
            Stmt::Class(class) => {
                self.declare_class(class)?;
                Ok(ControlFlow::Normal(Value::Null))
            },
            Stmt::Import { module, names } => {
                self.import(module, names)?;
                Ok(ControlFlow::Normal(Value::Null))
            },
        }
    }

    /// Executes `statements` in `environment`, restoring the previous
    /// environment afterwards even if a statement fails.
    pub(crate) fn execute_block(&mut self, statements: &[Stmt], environment: EnvironmentRef) -> ExecResult {
        let previous = std::mem::replace(&mut self.environment, environment);
        let mut result = Ok(ControlFlow::Normal(Value::Null));

        for stmt in statements {
            result = self.execute(stmt);

            match result {
                Ok(ControlFlow::Normal(_)) => {},
                _ => break,
            }
        }

        self.environment = previous;

        match result {
            Ok(ControlFlow::Normal(_)) => Ok(ControlFlow::Normal(Value::Null)),
            other => other,
        }
    }

    fn declare_class(&mut self, class: &ClassDecl) -> Result<(), RuntimeError> {
        let superclass = match &class.superclass {
            Some(expr) => match self.evaluate(expr)? {
                Value::Callable(Callable::Class(superclass)) => Some(superclass),
                _ => return Err(RuntimeError::InvalidSuperclass(expr.token().cloned().unwrap_or_else(|| class.name.clone()))),
            },
            None => None,
        };

        self.environment.borrow_mut().define(class.name.source(), Value::Null);

        let method_environment = match &superclass {
            Some(superclass) => {
                let environment = Environment::new_with_parent(Rc::clone(&self.environment));
                environment.borrow_mut().define("super", Value::Callable(Callable::Class(Rc::clone(superclass))));
                environment
            },
            None => Rc::clone(&self.environment),
        };

        let methods = class.methods.iter().map(|method| {
            let function = DeclaredFunction {
                declaration: Rc::clone(method),
                closure: Rc::clone(&method_environment),
                is_initializer: method.name.source() == "init",
                locals: Rc::clone(&self.locals),
            };

            (method.name.source().to_owned(), Rc::new(function))
        }).collect();

        let class_value = Class {
            name: class.name.source().to_owned(),
            superclass,
            methods,
        };

        self.environment.borrow_mut().define(class.name.source(), Value::Callable(Callable::Class(Rc::new(class_value))));
        Ok(())
    }

    fn import(&mut self, module: &Token, names: &[Token]) -> Result<(), RuntimeError> {
        let exports = self.load_module(module)?;

        let missing: Vec<String> = names.iter()
            .filter(|name| !exports.contains_key(name.source()))
            .map(|name| name.source().to_owned())
            .collect();

        if !missing.is_empty() {
            return Err(RuntimeError::ImportError {
                token: module.clone(),
                failure: ImportFailure::MissingExports { module: module.source().to_owned(), names: missing },
            });
        }

        for name in names {
            if let Some(value) = exports.get(name.source()) {
                tracing::debug!("Importing {} from module {}", name.source(), module.source());
                self.environment.borrow_mut().define(name.source(), value.clone());
            }
        }

        Ok(())
    }

    // Expressions

    fn evaluate(&mut self, expr: &Expr) -> EvalResult {
        ensure_sufficient_stack(|| self.evaluate_expression(expr))
    }

    fn evaluate_expression(&mut self, expr: &Expr) -> EvalResult {
        match expr {
            Expr::Literal(literal) => Ok(match literal {
                Literal::Number(value) => Value::Number(*value),
                Literal::String(value) => Value::String(Rc::clone(value)),
                Literal::Boolean(value) => Value::Boolean(*value),
                Literal::Null => Value::Null,
            }),
            Expr::Grouping(expr) => self.evaluate(expr),
            Expr::Unary { operator, right } => {
                let right = self.evaluate(right)?;

                match operator.token_type() {
                    TokenType::Minus => match right {
                        Value::Number(value) => Ok(Value::Number(-value)),
                        _ => Err(RuntimeError::invalid_operand(operator, "Operand must be a number.")),
                    },
                    TokenType::Not => Ok(Value::Boolean(!right.is_truthy())),
                    _ => Err(RuntimeError::invalid_operand(operator, "Unknown unary operator.")),
                }
            },
            Expr::Binary { left, operator, right } => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;

                Self::evaluate_binary(operator, left, right)
            },
            Expr::Logical { left, operator, right } => {
                let left = self.evaluate(left)?;

                let short_circuit = match operator.token_type() {
                    TokenType::Or => left.is_truthy(),
                    _ => !left.is_truthy(),
                };

                if short_circuit {
                    Ok(left)
                } else {
                    self.evaluate(right)
                }
            },
            Expr::Variable { id, name } => self.look_up_variable(*id, name),
            Expr::Assign { id, name, value } => {
                let value = self.evaluate(value)?;

                let assigned = match self.locals.get(id) {
                    Some(distance) => Environment::assign_at(&self.environment, *distance, name.source(), value.clone()),
                    None => Environment::root(&self.environment).borrow_mut().assign(name.source(), value.clone()),
                };

                if assigned {
                    Ok(value)
                } else {
                    Err(RuntimeError::UndefinedVariable(name.clone()))
                }
            },
            Expr::Call { callee, paren, args } => {
                let callee = self.evaluate(callee)?;
                let args = args.iter().map(|arg| self.evaluate(arg)).collect::<Result<Vec<Value>, RuntimeError>>()?;

                self.call(callee, paren, args)
            },
            Expr::Get { object, name } => match self.evaluate(object)? {
                Value::Instance(instance) => Ok(Self::get_property(&instance, name.source())),
                _ => Err(RuntimeError::invalid_property_access(name, "Only instances have properties.")),
            },
            Expr::Set { object, name, value } => {
                let instance = match self.evaluate(object)? {
                    Value::Instance(instance) => instance,
                    _ => return Err(RuntimeError::invalid_property_access(name, "Only instances have fields.")),
                };

                let value = self.evaluate(value)?;
                instance.set_field(name.source(), value.clone());
                Ok(value)
            },
            Expr::This { id, keyword } => self.look_up_variable(*id, keyword),
            Expr::Super { id, keyword, method } => self.evaluate_super(*id, keyword, method),
            Expr::Export { id, name } => {
                let value = self.look_up_variable(*id, name)?;
                self.exports.insert(name.source().to_owned(), value.clone());

                Ok(value)
            },
        }
    }

    fn evaluate_binary(operator: &Token, left: Value, right: Value) -> EvalResult {
        match operator.token_type() {
            TokenType::Equal => return Ok(Value::Boolean(left == right)),
            TokenType::NotEqual => return Ok(Value::Boolean(left != right)),
            TokenType::Plus => return match (left, right) {
                (Value::Number(left), Value::Number(right)) => Ok(Value::Number(left + right)),
                (Value::String(left), Value::String(right)) => Ok(Value::String(Rc::from(format!("{}{}", left, right)))),
                _ => Err(RuntimeError::invalid_operand(operator, "Operands must be two numbers or two strings.")),
            },
            _ => {},
        }

        let (left, right) = match (left, right) {
            (Value::Number(left), Value::Number(right)) => (left, right),
            _ => return Err(RuntimeError::invalid_operand(operator, "Operands must be numbers.")),
        };

        match operator.token_type() {
            TokenType::Minus => Ok(Value::Number(left - right)),
            TokenType::Multiply => Ok(Value::Number(left * right)),
            TokenType::Divide => Ok(Value::Number(left / right)),
            TokenType::Greater => Ok(Value::Boolean(left > right)),
            TokenType::GreaterEqual => Ok(Value::Boolean(left >= right)),
            TokenType::Less => Ok(Value::Boolean(left < right)),
            TokenType::LessEqual => Ok(Value::Boolean(left <= right)),
            _ => Err(RuntimeError::invalid_operand(operator, "Unknown binary operator.")),
        }
    }

    /// Resolved names are read at their recorded distance; everything else
    /// falls back to the global scope of the module that owns the
    /// current environment chain.
    fn look_up_variable(&self, id: ExprId, name: &Token) -> EvalResult {
        let value = match self.locals.get(&id) {
            Some(distance) => Environment::get_at(&self.environment, *distance, name.source()),
            None => Environment::root(&self.environment).borrow().get(name.source()),
        };

        value.ok_or_else(|| RuntimeError::UndefinedVariable(name.clone()))
    }

    /// Methods win over fields; unknown properties read as `null`.
    fn get_property(instance: &Rc<Instance>, name: &str) -> Value {
        if let Some(method) = instance.class.find_method(name) {
            return Value::Callable(Callable::Declared(Rc::new(method.bind(Rc::clone(instance)))));
        }

        instance.get_field(name).unwrap_or(Value::Null)
    }

    /// `super` is found at its resolved distance and the matching `this`
    /// one frame closer, so lookup starts above the class that declared
    /// the running method.
    fn evaluate_super(&self, id: ExprId, keyword: &Token, method: &Token) -> EvalResult {
        let distance = *self.locals.get(&id).ok_or_else(|| RuntimeError::UndefinedVariable(keyword.clone()))?;

        let superclass = match Environment::get_at(&self.environment, distance, "super") {
            Some(Value::Callable(Callable::Class(superclass))) => superclass,
            _ => return Err(RuntimeError::UndefinedVariable(keyword.clone())),
        };

        let instance = match distance.checked_sub(1).and_then(|distance| Environment::get_at(&self.environment, distance, "this")) {
            Some(Value::Instance(instance)) => instance,
            _ => return Err(RuntimeError::UndefinedVariable(Token::synthetic(TokenType::This, "this"))),
        };

        match superclass.find_method(method.source()) {
            Some(function) => Ok(Value::Callable(Callable::Declared(Rc::new(function.bind(instance))))),
            None => Err(RuntimeError::invalid_property_access(method,
                &format!("Undefined superclass method '{}'.", method.source()))),
        }
    }

    // Calls

    fn call(&mut self, callee: Value, paren: &Token, args: Vec<Value>) -> EvalResult {
        let callable = match callee {
            Value::Callable(callable) => callable,
            _ => return Err(RuntimeError::NotCallable(paren.clone())),
        };

        if args.len() != callable.arity() {
            return Err(RuntimeError::ArityMismatch { token: paren.clone(), expected: callable.arity(), found: args.len() });
        }

        match callable {
            Callable::Declared(function) => self.call_function(&function, args, paren),
            Callable::Foreign(function) => (function.body)(&args)
                .map_err(|message| RuntimeError::InvalidOperand { token: paren.clone(), message }),
            Callable::Class(class) => {
                let instance = Rc::new(Instance::new(Rc::clone(&class)));

                if let Some(initializer) = class.find_method("init") {
                    self.call_function(&initializer.bind(Rc::clone(&instance)), args, paren)?;
                }

                Ok(Value::Instance(instance))
            },
        }
    }

    fn call_function(&mut self, function: &DeclaredFunction, args: Vec<Value>, paren: &Token) -> EvalResult {
        if self.call_depth >= self.options.max_call_depth {
            return Err(RuntimeError::StackOverflow(paren.clone()));
        }

        let _span = tracing::trace_span!("call", function = function.declaration.name.source()).entered();

        let environment = Environment::new_with_parent(Rc::clone(&function.closure));

        for (param, arg) in function.declaration.params.iter().zip(args) {
            environment.borrow_mut().define(param.source(), arg);
        }

        let previous_locals = std::mem::replace(&mut self.locals, Rc::clone(&function.locals));
        self.call_depth += 1;

        let result = self.execute_block(&function.declaration.body, environment);

        self.call_depth -= 1;
        self.locals = previous_locals;

        let flow = result?;

        if function.is_initializer {
            return Ok(function.closure.borrow().get("this").unwrap_or(Value::Null));
        }

        match flow {
            ControlFlow::Return(value) => Ok(value),
            ControlFlow::Normal(_) => Ok(Value::Null),
        }
    }
}

const CLOCK: ForeignFunction = ForeignFunction {
    name: "clock",
    arity: 0,
    body: clock,
};

pub(crate) fn clock(_: &[Value]) -> Result<Value, String> {
    SystemTime::now().duration_since(UNIX_EPOCH)
        .map(|duration| Value::Number(duration.as_secs_f64()))
        .map_err(|err| err.to_string())
}
