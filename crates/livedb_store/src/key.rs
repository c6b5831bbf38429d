use crate::value::{Row, Scalar};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Identifies a row within a collection, or a row of a query result.
/// - Base collection rows usually have a single part.
/// - Query outputs use composite keys (the keys of each joined source, the
///   values of a group, or the values of a distinct row).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowKey(Vec<Scalar>);

impl RowKey {
    pub fn new(parts: Vec<Scalar>) -> Self {
        Self(parts)
    }

    /// A key composed of other keys. Single part keys are embedded directly,
    /// multi part keys are nested as a record of their parts.
    pub fn composite(parts: impl IntoIterator<Item = Option<RowKey>>) -> Self {
        Self(
            parts
                .into_iter()
                .map(|part| part.map_or(Scalar::Null, RowKey::into_scalar))
                .collect(),
        )
    }

    pub fn parts(&self) -> &[Scalar] {
        &self.0
    }

    /// The key as a single value, used when it is embedded into a composite key.
    pub fn into_scalar(self) -> Scalar {
        let mut parts = self.0;
        if parts.len() == 1 {
            parts.remove(0)
        } else {
            Scalar::Record(
                parts
                    .into_iter()
                    .enumerate()
                    .map(|(i, p)| (i.to_string(), p))
                    .collect::<Row>(),
            )
        }
    }
}

impl From<Scalar> for RowKey {
    fn from(value: Scalar) -> Self {
        Self(vec![value])
    }
}
impl From<&str> for RowKey {
    fn from(value: &str) -> Self {
        Scalar::from(value).into()
    }
}
impl From<String> for RowKey {
    fn from(value: String) -> Self {
        Scalar::from(value).into()
    }
}
impl From<i64> for RowKey {
    fn from(value: i64) -> Self {
        Scalar::from(value).into()
    }
}
impl From<i32> for RowKey {
    fn from(value: i32) -> Self {
        Scalar::from(value).into()
    }
}

impl Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "|")?;
            }
            write!(f, "{part}")?;
        }
        Ok(())
    }
}
