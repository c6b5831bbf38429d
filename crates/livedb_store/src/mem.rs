//! # In Memory Collection
//! A keyed [`BaseCollection`] backed by a [`BTreeMap`]. Each write operation
//! (or each [`MemCollection::apply`] transaction) is emitted to listeners as
//! one batch.

use crate::{
    change::Change,
    collection::{BaseCollection, CollectionId, Listener, Subscription},
    key::RowKey,
    value::Row,
    StoreError,
};
use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
    rc::{Rc, Weak},
};

/// A single write for use in a transaction.
#[derive(Clone, Debug)]
pub enum Write {
    Insert(RowKey, Row),
    Update(RowKey, Row),
    Delete(RowKey),
}

struct Inner {
    id: CollectionId,
    name: String,
    key_field: Option<String>,
    rows: RefCell<BTreeMap<RowKey, Row>>,
    listeners: RefCell<BTreeMap<u64, Listener>>,
    next_listener: Cell<u64>,
}

/// Cloning produces another handle to the same collection.
#[derive(Clone)]
pub struct MemCollection {
    inner: Rc<Inner>,
}

impl MemCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self::build(name.into(), None)
    }

    /// Rows inserted with [`MemCollection::insert_row`] are keyed by `field`.
    pub fn keyed_by(name: impl Into<String>, field: impl Into<String>) -> Self {
        Self::build(name.into(), Some(field.into()))
    }

    fn build(name: String, key_field: Option<String>) -> Self {
        Self {
            inner: Rc::new(Inner {
                id: CollectionId::fresh(),
                name,
                key_field,
                rows: RefCell::new(BTreeMap::new()),
                listeners: RefCell::new(BTreeMap::new()),
                next_listener: Cell::new(0),
            }),
        }
    }

    pub fn insert(&self, key: impl Into<RowKey>, row: Row) -> Result<(), StoreError> {
        self.apply([Write::Insert(key.into(), row)])
    }

    /// Insert using the configured key field of the row.
    pub fn insert_row(&self, row: Row) -> Result<RowKey, StoreError> {
        let key = self.key_of(&row)?;
        self.insert(key.clone(), row)?;
        Ok(key)
    }

    pub fn update(&self, key: impl Into<RowKey>, row: Row) -> Result<(), StoreError> {
        self.apply([Write::Update(key.into(), row)])
    }

    pub fn delete(&self, key: impl Into<RowKey>) -> Result<(), StoreError> {
        self.apply([Write::Delete(key.into())])
    }

    /// Apply all writes atomically, emitting a single batch.
    /// - Writes are validated in order against the state left by earlier writes
    ///   in the same transaction, and nothing is applied if any write fails.
    pub fn apply(&self, writes: impl IntoIterator<Item = Write>) -> Result<(), StoreError> {
        let changes = {
            let mut rows = self.inner.rows.borrow_mut();
            let mut staged: BTreeMap<RowKey, Option<Row>> = BTreeMap::new();
            let mut changes = Vec::new();
            for write in writes {
                match write {
                    Write::Insert(key, row) => {
                        let present = staged.get(&key).map_or_else(|| rows.contains_key(&key), Option::is_some);
                        if present {
                            return Err(StoreError::DuplicateKey {
                                collection: self.inner.name.clone(),
                                key,
                            });
                        }
                        staged.insert(key.clone(), Some(row.clone()));
                        changes.push(Change::insert(key, row));
                    }
                    Write::Update(key, row) => {
                        let present = staged.get(&key).map_or_else(|| rows.contains_key(&key), Option::is_some);
                        if !present {
                            return Err(StoreError::MissingKey {
                                collection: self.inner.name.clone(),
                                key,
                            });
                        }
                        staged.insert(key.clone(), Some(row.clone()));
                        changes.push(Change::update(key, row));
                    }
                    Write::Delete(key) => {
                        let previous = match staged.get(&key) {
                            Some(entry) => entry.clone(),
                            None => rows.get(&key).cloned(),
                        };
                        let Some(previous) = previous else {
                            return Err(StoreError::MissingKey {
                                collection: self.inner.name.clone(),
                                key,
                            });
                        };
                        staged.insert(key.clone(), None);
                        changes.push(Change::delete(key, previous));
                    }
                }
            }
            for (key, entry) in staged {
                match entry {
                    Some(row) => rows.insert(key, row),
                    None => rows.remove(&key),
                };
            }
            changes
        };
        if !changes.is_empty() {
            self.emit(&changes);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.rows.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.rows.borrow().is_empty()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    fn key_of(&self, row: &Row) -> Result<RowKey, StoreError> {
        let field = self
            .inner
            .key_field
            .as_ref()
            .ok_or_else(|| StoreError::NoKeyField(self.inner.name.clone()))?;
        match row.get(field) {
            Some(value) if !value.is_nullish() => Ok(RowKey::from(value.clone())),
            _ => Err(StoreError::MissingKeyField {
                collection: self.inner.name.clone(),
                field: field.clone(),
            }),
        }
    }

    fn emit(&self, changes: &[Change]) {
        // listeners may subscribe, unsubscribe or write while being called
        let listeners: Vec<Listener> = self.inner.listeners.borrow().values().cloned().collect();
        log::trace!(
            "{} emitting [{}] to {} listeners",
            self.inner.name,
            changes.iter().map(|c| c.kind.symbol()).collect::<String>(),
            listeners.len()
        );
        for listener in listeners {
            listener(changes);
        }
    }
}

impl BaseCollection for MemCollection {
    fn id(&self) -> CollectionId {
        self.inner.id
    }

    fn name(&self) -> &str {
        &self.inner.name
    }

    fn get(&self, key: &RowKey) -> Option<Row> {
        self.inner.rows.borrow().get(key).cloned()
    }

    fn entries(&self) -> Vec<(RowKey, Row)> {
        self.inner
            .rows
            .borrow()
            .iter()
            .map(|(k, r)| (k.clone(), r.clone()))
            .collect()
    }

    fn subscribe(&self, listener: Listener) -> Subscription {
        let id = self.inner.next_listener.get();
        self.inner.next_listener.set(id + 1);
        self.inner.listeners.borrow_mut().insert(id, listener);
        let weak: Weak<Inner> = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.listeners.borrow_mut().remove(&id);
            }
        })
    }
}

impl Write {
    pub fn key(&self) -> &RowKey {
        match self {
            Write::Insert(k, _) | Write::Update(k, _) | Write::Delete(k) => k,
        }
    }
}
