use livedb_ops::FieldPolicy;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Configuration of a live query, see [`crate::materialize_with`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveOptions {
    /// Used in logs and errors, generated if absent.
    pub id: Option<String>,
    /// Preload while materializing, rather than on the first subscription.
    pub start_preloaded: bool,
    /// How fields missing from rows (and type errors) are evaluated.
    pub field_policy: FieldPolicy,
    /// Hold output changes until the first subscriber attaches.
    pub buffer_until_subscribed: bool,
}

impl Default for LiveOptions {
    fn default() -> Self {
        Self {
            id: None,
            start_preloaded: false,
            field_policy: FieldPolicy::Undefined,
            buffer_until_subscribed: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Subscribed to its collections, but not yet evaluated.
    Idle,
    Ready,
    /// A batch failed to process, no further batches are processed.
    Errored,
    Disposed,
}

impl Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Idle => "idle",
            Status::Ready => "ready",
            Status::Errored => "errored",
            Status::Disposed => "disposed",
        })
    }
}
