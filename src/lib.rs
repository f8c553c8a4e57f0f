pub mod util;
pub mod compiler;
pub mod interpreter;
pub mod error;

use std::cell::RefCell;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use clap::Parser as ClapParser;
use crate::compiler::ast::Stmt;
use crate::compiler::lexer::Lexer;
use crate::compiler::parser::Parser;
use crate::error::Error;
use crate::interpreter::evaluator::{Evaluator, EvaluatorOptions, SharedOutput};
use crate::interpreter::module::SOURCE_EXTENSION;
use crate::interpreter::value::Value;

#[derive(ClapParser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Config {
    #[clap(value_parser = parse_input, help = "Main input file")]
    pub input: PathBuf,
    #[clap(long, help = "Directory modules are imported from [default: directory of the input file]")]
    pub module_root: Option<PathBuf>,

    #[clap(long, help = "Print values without colours")]
    pub no_pretty_print: bool,
    #[clap(short, long, help = "Print verbose log output")]
    pub verbose: bool,
}

fn parse_input(value: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(value);

    if path.extension().and_then(|extension| extension.to_str()) != Some(SOURCE_EXTENSION) {
        return Err(format!("expected a .{} file", SOURCE_EXTENSION));
    }

    if !path.is_file() {
        return Err(format!("{} does not exist", path.display()));
    }

    Ok(path)
}

impl Config {
    pub fn evaluator_options(&self) -> EvaluatorOptions {
        let module_root = self.module_root.clone().unwrap_or_else(|| self.input.parent()
            .map(Path::to_path_buf)
            .unwrap_or_default());

        let mut options = EvaluatorOptions::new(module_root);
        options.pretty = !self.no_pretty_print && std::io::stdout().is_terminal();
        options
    }
}

/// Runs the configured input file, printing to stdout. Diagnostics have
/// already been written to stderr when this returns an error.
pub fn run(config: Config) -> Result<(), Error> {
    let source = std::fs::read_to_string(&config.input).map_err(|err| {
        eprintln!("Could not read {}: {}", config.input.display(), err);
        err
    })?;

    let output: SharedOutput = Rc::new(RefCell::new(std::io::stdout()));

    let mut evaluator = Evaluator::new(Rc::new(config.evaluator_options()), output);
    evaluator.set_main_module(&config.input);
    evaluator.run_source(&source)?;

    if evaluator.had_error() {
        return Err(Error::Parse(evaluator.parse_errors().to_vec()));
    }

    Ok(())
}

/// Runs `source` as a main module and returns the value of its last
/// expression statement.
pub fn run_source(source: &str, options: Rc<EvaluatorOptions>, output: SharedOutput) -> Result<Value, Error> {
    Evaluator::new(options, output).run_source(source)
}

/// Lexes and parses without running anything. Fails on the first lexer
/// error or with every parse error.
pub fn parse_source(source: &str) -> Result<Vec<Stmt>, Error> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser::new(tokens);
    let program = parser.parse();

    if parser.had_error() {
        return Err(Error::Parse(parser.into_errors()));
    }

    Ok(program)
}
