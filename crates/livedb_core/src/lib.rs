#![doc = include_str!("../README.md")]

pub mod analysis;
pub mod errors;
pub mod frontend;
pub mod graph;
pub mod plan;
pub mod viz;

pub use errors::BuildError;
pub use frontend::{Operand, QueryScope, RefProxy, SelectItem};
pub use graph::DependencyGraph;
pub use plan::{Direction, JoinKind, Plan, Query};
