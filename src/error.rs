use std::fmt::Display;
use thiserror::Error;
use crate::compiler::lexer::LexerError;
use crate::compiler::parser::ParseError;
use crate::compiler::resolver::ResolveError;
use crate::interpreter::evaluator::RuntimeError;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Lexer(#[from] LexerError),
    #[error("{}", join_lines(.0))]
    Parse(Vec<ParseError>),
    #[error("{}", join_lines(.0))]
    Resolve(Vec<ResolveError>),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn join_lines<T: Display>(errors: &[T]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<String>>().join("\n")
}
