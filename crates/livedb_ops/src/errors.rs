use thiserror::Error;

/// Errors raised while evaluating a query against its inputs.
/// - [`EvalError::FieldNotFound`] and [`EvalError::TypeMismatch`] are only
///   raised under [`crate::eval::FieldPolicy::Strict`].
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum EvalError {
    #[error("field `{path}` not found on the row bound to `{alias}`")]
    FieldNotFound { alias: String, path: String },

    #[error("`{func}` cannot be applied to ({found})")]
    TypeMismatch { func: &'static str, found: String },

    #[error("retracted a value never inserted into `{aggregate}` for group {group}")]
    AggregateStateCorruption { aggregate: String, group: String },

    #[error("no source bound to `{0}` while evaluating")]
    UnboundAlias(String),

    #[error("aggregate `{0}` evaluated outside of a group")]
    MissingAggregate(String),
}

/// Failure to build or evaluate a query.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum QueryError {
    #[error(transparent)]
    Build(#[from] livedb_core::BuildError),

    #[error(transparent)]
    Eval(#[from] EvalError),
}
