//! # Base Collections
//! The source of rows for a live query. A collection exposes its current
//! contents and pushes every committed write to its listeners as a single
//! batch of [`Change`]s.
//!
//! Listeners are called synchronously and may re-enter the collection (for
//! example, to write again, or to unsubscribe).

use crate::{change::Change, key::RowKey, value::Row};
use std::{
    fmt::{self, Display},
    rc::Rc,
    sync::atomic::{AtomicU64, Ordering},
};

/// Identity of a collection, unique within the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CollectionId(u64);

impl CollectionId {
    pub fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub type Listener = Rc<dyn Fn(&[Change])>;

pub trait BaseCollection {
    fn id(&self) -> CollectionId;

    fn name(&self) -> &str;

    fn get(&self, key: &RowKey) -> Option<Row>;

    /// The current contents, ordered by key.
    fn entries(&self) -> Vec<(RowKey, Row)>;

    /// Register a listener for all future change batches. The listener is
    /// removed when the returned [`Subscription`] is dropped or unsubscribed.
    fn subscribe(&self, listener: Listener) -> Subscription;
}

pub type CollectionHandle = Rc<dyn BaseCollection>;

/// An active registration with a collection.
#[must_use = "dropping a subscription unsubscribes it"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel()
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}
