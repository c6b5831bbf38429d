#![allow(dead_code)]
//! ## Valid Tests for live queries
//! - Each scenario is added in a submodule from here, to be executed by the
//!   [live.rs](./../live.rs) integration test.
//!
//! NOTE: *Cargo compiles each `.rs` file in the top level of the `tests/`
//!       directory as a separate crate. subdirectories with modules are not
//!       compiled as tests, but are available for the test crates to use.

pub mod compile;
pub mod lifecycle;
pub mod scenarios;

use livedb::{Change, ChangeKind, LiveHandle, Row, Subscription};
use std::{cell::RefCell, rc::Rc};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Records every batch delivered to a subscriber.
#[derive(Clone, Default)]
pub struct Recorder {
    batches: Rc<RefCell<Vec<Vec<Change>>>>,
}

impl Recorder {
    pub fn attach(&self, live: &LiveHandle) -> Subscription {
        let batches = self.batches.clone();
        live.subscribe_changes(move |changes| batches.borrow_mut().push(changes.to_vec()))
            .unwrap()
    }

    pub fn batches(&self) -> Vec<Vec<Change>> {
        self.batches.borrow().clone()
    }

    pub fn changes(&self) -> Vec<Change> {
        self.batches.borrow().iter().flatten().cloned().collect()
    }

    pub fn clear(&self) {
        self.batches.borrow_mut().clear();
    }

    /// The rows visible after applying every recorded change.
    pub fn replayed(&self) -> Vec<Row> {
        let mut rows = std::collections::BTreeMap::new();
        for change in self.changes() {
            match change.kind {
                ChangeKind::Delete => {
                    rows.remove(&change.key);
                }
                ChangeKind::Insert | ChangeKind::Update => {
                    rows.insert(change.key, change.value);
                }
            }
        }
        rows.into_values().collect()
    }
}
