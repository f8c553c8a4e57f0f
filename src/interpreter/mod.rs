pub mod environment;
pub mod value;
pub mod evaluator;
pub mod module;
