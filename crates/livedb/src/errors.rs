use livedb_core::BuildError;
use livedb_ops::EvalError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum LiveError {
    /// The query could not be compiled.
    #[error("invalid query: {0}")]
    Build(#[from] BuildError),

    /// Processing a change batch failed, the live query stops processing
    /// further batches.
    #[error("live query {id} failed: {source}")]
    Eval {
        id: String,
        #[source]
        source: EvalError,
    },

    #[error("live query {0} has been disposed")]
    Disposed(String),
}

impl LiveError {
    pub(crate) fn eval(id: &str, source: EvalError) -> Self {
        LiveError::Eval {
            id: id.to_owned(),
            source,
        }
    }
}
