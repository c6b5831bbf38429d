#![doc = include_str!("../README.md")]

mod errors;
mod live;
mod options;

pub use errors::LiveError;
pub use live::{materialize, materialize_with, LiveHandle};
pub use options::{LiveOptions, Status};

pub use livedb_core::{
    fields, frontend::SelectItem, viz::DisplayConfig, BuildError, DependencyGraph, Direction, JoinKind, Operand,
    Plan, Query, QueryScope, RefProxy,
};
pub use livedb_ops::{EvalError, FieldPolicy};
pub use livedb_store::{
    row, BaseCollection, Change, ChangeKind, CollectionHandle, MemCollection, Row, RowKey, Scalar, Subscription,
    Write,
};

pub use livedb_core;
pub use livedb_ops;
pub use livedb_store;
