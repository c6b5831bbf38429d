use crate::{key::RowKey, value::Row};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn symbol(self) -> char {
        match self {
            ChangeKind::Insert => '+',
            ChangeKind::Update => '~',
            ChangeKind::Delete => '-',
        }
    }
}

/// A single row level change. For deletes, `value` holds the removed row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub kind: ChangeKind,
    pub key: RowKey,
    pub value: Row,
}

impl Change {
    pub fn insert(key: impl Into<RowKey>, value: Row) -> Self {
        Self {
            kind: ChangeKind::Insert,
            key: key.into(),
            value,
        }
    }

    pub fn update(key: impl Into<RowKey>, value: Row) -> Self {
        Self {
            kind: ChangeKind::Update,
            key: key.into(),
            value,
        }
    }

    pub fn delete(key: impl Into<RowKey>, value: Row) -> Self {
        Self {
            kind: ChangeKind::Delete,
            key: key.into(),
            value,
        }
    }

    /// Inserts and updates both leave a row present at the key.
    pub fn is_upsert(&self) -> bool {
        !matches!(self.kind, ChangeKind::Delete)
    }
}
