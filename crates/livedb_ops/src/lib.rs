#![doc = include_str!("../README.md")]

pub mod engine;
pub mod errors;
pub mod eval;
pub mod join;
pub mod reduce;
pub mod stage;

pub use engine::{evaluate, Engine};
pub use errors::{EvalError, QueryError};
pub use eval::FieldPolicy;
