#![doc = include_str!("../README.md")]

mod change;
mod collection;
mod key;
mod mem;
mod value;

pub use change::{Change, ChangeKind};
pub use collection::{BaseCollection, CollectionHandle, CollectionId, Listener, Subscription};
pub use key::RowKey;
pub use mem::{MemCollection, Write};
pub use value::{Row, Scalar};

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("key {key} already present in {collection}")]
    DuplicateKey { collection: String, key: RowKey },

    #[error("key {key} not present in {collection}")]
    MissingKey { collection: String, key: RowKey },

    #[error("collection {0} has no key field")]
    NoKeyField(String),

    #[error("row for {collection} has no value for key field {field}")]
    MissingKeyField { collection: String, field: String },
}
