use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use indexmap::IndexMap;
use lazy_static::lazy_static;
use crate::compiler::lexer::Token;
use crate::interpreter::evaluator::{self, Evaluator, ImportFailure, RuntimeError};
use crate::interpreter::value::{Callable, ForeignFunction, Value};

pub const SOURCE_EXTENSION: &str = "sparkle";

#[derive(Clone, Copy)]
enum BuiltinExport {
    Function(ForeignFunction),
    Constant(f64),
}

lazy_static! {
    static ref BUILTIN_MODULES: HashMap<&'static str, Vec<(&'static str, BuiltinExport)>> = HashMap::from([
        ("time", vec![
            ("clock", BuiltinExport::Function(ForeignFunction { name: "clock", arity: 0, body: evaluator::clock })),
        ]),
        ("math", vec![
            ("sqrt", BuiltinExport::Function(ForeignFunction { name: "sqrt", arity: 1, body: sqrt })),
            ("floor", BuiltinExport::Function(ForeignFunction { name: "floor", arity: 1, body: floor })),
            ("abs", BuiltinExport::Function(ForeignFunction { name: "abs", arity: 1, body: abs })),
            ("pi", BuiltinExport::Constant(std::f64::consts::PI)),
        ]),
    ]);
}

fn number_argument(name: &str, args: &[Value]) -> Result<f64, String> {
    match args.first() {
        Some(Value::Number(value)) => Ok(*value),
        Some(other) => Err(format!("{} expects a number, got {}.", name, other.type_name())),
        None => Err(format!("{} expects a number.", name)),
    }
}

fn sqrt(args: &[Value]) -> Result<Value, String> {
    number_argument("sqrt", args).map(|value| Value::Number(value.sqrt()))
}

fn floor(args: &[Value]) -> Result<Value, String> {
    number_argument("floor", args).map(|value| Value::Number(value.floor()))
}

fn abs(args: &[Value]) -> Result<Value, String> {
    number_argument("abs", args).map(|value| Value::Number(value.abs()))
}

/// Path a user module named `name` is loaded from.
pub fn module_path(module_root: &Path, name: &str) -> PathBuf {
    module_root.join(name).with_extension(SOURCE_EXTENSION)
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

impl Evaluator {
    /// Runs the module `name` to completion and returns everything it exported.
    /// Built-in modules take precedence over files; files are run again on
    /// every import.
    #[tracing::instrument(skip_all, fields(module = name.source()))]
    pub(crate) fn load_module(&mut self, name: &Token) -> Result<IndexMap<String, Value>, RuntimeError> {
        let import_error = |failure: ImportFailure| RuntimeError::ImportError { token: name.clone(), failure };

        if let Some(exports) = BUILTIN_MODULES.get(name.source()) {
            tracing::debug!("Loading built-in module");

            return Ok(exports.iter().map(|(export_name, export)| {
                let value = match export {
                    BuiltinExport::Function(function) => Value::Callable(Callable::Foreign(Rc::new(*function))),
                    BuiltinExport::Constant(value) => Value::Number(*value),
                };

                (export_name.to_string(), value)
            }).collect());
        }

        let path = module_path(&self.options().module_root, name.source());

        if !path.is_file() {
            return Err(import_error(ImportFailure::NotFound(name.source().to_owned())));
        }

        let path = canonical(&path);

        if self.import_chain.contains(&path) {
            return Err(import_error(ImportFailure::Circular(name.source().to_owned())));
        }

        tracing::debug!("Loading module from {}", path.display());

        let source = std::fs::read_to_string(&path)
            .map_err(|err| {
                tracing::debug!("Could not read module: {}", err);
                import_error(ImportFailure::NotFound(name.source().to_owned()))
            })?;

        let mut import_chain = self.import_chain.clone();
        import_chain.push(path);

        let mut module = Evaluator::with_import_chain(Rc::clone(self.options()), Rc::clone(self.output()), import_chain);

        match module.run_source(&source) {
            Ok(_) => {
                tracing::debug!("Module exported {} names", module.exports().len());
                Ok(module.into_exports())
            },
            Err(err) => {
                tracing::debug!("Module failed: {}", err);
                Err(import_error(ImportFailure::ModuleFailed(name.source().to_owned())))
            },
        }
    }

    /// Marks `path` as the file this evaluator is running, so importing it
    /// again from inside is reported as a cycle.
    pub fn set_main_module(&mut self, path: &Path) {
        self.import_chain = vec![canonical(path)];
    }
}
