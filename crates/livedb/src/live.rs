//! # Live Queries
//! A [`LiveHandle`] binds a query [`Engine`] to change subscriptions on every
//! collection the query reads, and forwards the resulting output changes to
//! its own subscribers.
//!
//! ## Batch Processing
//! Incoming batches are queued, and the queue is drained by whichever call
//! delivered the first batch. A batch delivered while draining (for example,
//! by a subscriber writing to a collection) waits behind the current one, so
//! batches never interleave.
//!
//! The engine is only borrowed while applying a batch, never while calling
//! subscribers, so subscribers may write to collections, subscribe, or
//! dispose the live query.

use crate::{
    errors::LiveError,
    options::{LiveOptions, Status},
};
use livedb_core::{
    viz::{self, DisplayConfig},
    Plan, Query,
};
use livedb_ops::Engine;
use livedb_store::{Change, CollectionId, Row, RowKey, Subscription};
use std::{
    cell::{Cell, RefCell},
    collections::{BTreeMap, VecDeque},
    rc::{Rc, Weak},
    sync::atomic::{AtomicU64, Ordering},
};

type ChangeListener = Rc<dyn Fn(&[Change])>;
type ErrorListener = Rc<dyn Fn(&LiveError)>;

struct LiveInner {
    id: String,
    options: LiveOptions,
    engine: RefCell<Engine>,
    status: Cell<Status>,
    /// Subscriptions to the query's collections, one per collection.
    leaves: RefCell<Vec<Subscription>>,
    queue: RefCell<VecDeque<(CollectionId, Vec<Change>)>>,
    draining: Cell<bool>,
    listeners: RefCell<BTreeMap<u64, ChangeListener>>,
    error_listeners: RefCell<Vec<ErrorListener>>,
    next_listener: Cell<u64>,
    /// Set once the first subscriber attaches, after which nothing is buffered.
    subscribed: Cell<bool>,
    buffer: RefCell<Vec<Change>>,
    error: RefCell<Option<LiveError>>,
}

/// A handle to a live query. Clones refer to the same live query.
///
/// The live query stays subscribed to its collections until
/// [`LiveHandle::dispose`] is called, or every handle is dropped.
#[derive(Clone)]
pub struct LiveHandle {
    inner: Rc<LiveInner>,
}

/// Compile and subscribe a live query with the default [`LiveOptions`].
pub fn materialize(plan: &Rc<Plan>, query: Query) -> Result<LiveHandle, LiveError> {
    materialize_with(plan, query, LiveOptions::default())
}

pub fn materialize_with(plan: &Rc<Plan>, query: Query, options: LiveOptions) -> Result<LiveHandle, LiveError> {
    static NEXT_ID: AtomicU64 = AtomicU64::new(0);
    let id = options
        .id
        .clone()
        .unwrap_or_else(|| format!("live{}", NEXT_ID.fetch_add(1, Ordering::Relaxed)));

    let engine = Engine::new(plan.clone(), query, options.field_policy)?;
    let collections = engine.collections();
    let inner = Rc::new(LiveInner {
        id,
        options,
        engine: RefCell::new(engine),
        status: Cell::new(Status::Idle),
        leaves: RefCell::new(Vec::new()),
        queue: RefCell::new(VecDeque::new()),
        draining: Cell::new(false),
        listeners: RefCell::new(BTreeMap::new()),
        error_listeners: RefCell::new(Vec::new()),
        next_listener: Cell::new(0),
        subscribed: Cell::new(false),
        buffer: RefCell::new(Vec::new()),
        error: RefCell::new(None),
    });

    let subscriptions = collections
        .iter()
        .map(|collection| {
            let weak: Weak<LiveInner> = Rc::downgrade(&inner);
            let id = collection.id();
            collection.subscribe(Rc::new(move |batch: &[Change]| {
                if let Some(inner) = weak.upgrade() {
                    inner.receive(id, batch);
                }
            }))
        })
        .collect();
    *inner.leaves.borrow_mut() = subscriptions;
    log::debug!(
        "materialized live query {} over {} collections",
        inner.id,
        collections.len()
    );

    let handle = LiveHandle { inner };
    if handle.inner.options.start_preloaded {
        handle.preload()?;
    }
    Ok(handle)
}

impl LiveHandle {
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn status(&self) -> Status {
        self.inner.status.get()
    }

    /// The error that stopped the live query, if any.
    pub fn error(&self) -> Option<LiveError> {
        self.inner.error.borrow().clone()
    }

    /// Evaluate the query against the current contents of its collections.
    /// Output produced before the first subscriber attaches is buffered for
    /// it. Preloading an already preloaded query does nothing.
    pub fn preload(&self) -> Result<(), LiveError> {
        self.inner.preload()
    }

    /// Receive every subsequent batch of output changes. The first
    /// subscriber receives all output since preloading (preloading now if
    /// needed), later subscribers receive the current rows as inserts.
    pub fn subscribe_changes(&self, listener: impl Fn(&[Change]) + 'static) -> Result<Subscription, LiveError> {
        let inner = &self.inner;
        inner.check_live()?;

        let key = inner.next_listener.get();
        inner.next_listener.set(key + 1);
        let listener: ChangeListener = Rc::new(listener);
        inner.listeners.borrow_mut().insert(key, listener.clone());
        let first = !inner.subscribed.replace(true);

        if inner.status.get() == Status::Idle {
            if let Err(err) = inner.preload() {
                inner.listeners.borrow_mut().remove(&key);
                return Err(err);
            }
        } else {
            let initial = if first && inner.options.buffer_until_subscribed {
                std::mem::take(&mut *inner.buffer.borrow_mut())
            } else {
                self.snapshot_changes()
            };
            if !initial.is_empty() {
                listener(&initial[..]);
            }
        }

        let weak = Rc::downgrade(inner);
        Ok(Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.listeners.borrow_mut().remove(&key);
            }
        }))
    }

    /// Called when a batch fails to process. The live query is errored
    /// afterwards.
    pub fn on_error(&self, listener: impl Fn(&LiveError) + 'static) {
        self.inner.error_listeners.borrow_mut().push(Rc::new(listener));
    }

    /// Unsubscribe from all collections. No further output is emitted, and
    /// batches still queued are dropped.
    pub fn dispose(&self) {
        let inner = &self.inner;
        if inner.status.replace(Status::Disposed) == Status::Disposed {
            return;
        }
        let leaves = std::mem::take(&mut *inner.leaves.borrow_mut());
        let dropped = inner.queue.borrow().len();
        inner.queue.borrow_mut().clear();
        inner.listeners.borrow_mut().clear();
        inner.error_listeners.borrow_mut().clear();
        inner.buffer.borrow_mut().clear();
        log::debug!(
            "disposing live query {}, unsubscribing from {} collections and dropping {dropped} queued batches",
            inner.id,
            leaves.len()
        );
        for leaf in leaves {
            leaf.unsubscribe();
        }
    }

    /// The current output rows, in output order. Empty until preloaded.
    pub fn snapshot(&self) -> Vec<(RowKey, Row)> {
        match self.inner.engine.try_borrow() {
            Ok(engine) => engine.snapshot(),
            Err(_) => Vec::new(),
        }
    }

    pub fn rows(&self) -> Vec<Row> {
        self.snapshot().into_iter().map(|(_, row)| row).collect()
    }

    /// Render the query's dependency graph as graphviz dot.
    pub fn render_graph(&self, config: &DisplayConfig) -> std::io::Result<String> {
        let engine = self.inner.engine.borrow();
        viz::render_string(engine.plan(), engine.graph(), config)
    }

    fn snapshot_changes(&self) -> Vec<Change> {
        self.snapshot()
            .into_iter()
            .map(|(key, row)| Change::insert(key, row))
            .collect()
    }
}

impl LiveInner {
    fn check_live(&self) -> Result<(), LiveError> {
        match self.status.get() {
            Status::Disposed => Err(LiveError::Disposed(self.id.clone())),
            Status::Errored => Err(self
                .error
                .borrow()
                .clone()
                .unwrap_or_else(|| LiveError::Disposed(self.id.clone()))),
            Status::Idle | Status::Ready => Ok(()),
        }
    }

    fn preload(&self) -> Result<(), LiveError> {
        self.check_live()?;
        if self.status.get() == Status::Ready {
            return Ok(());
        }
        let initialized = self.engine.borrow_mut().initialize();
        match initialized {
            Ok(()) => {
                self.status.set(Status::Ready);
                let initial: Vec<Change> = self
                    .engine
                    .borrow()
                    .snapshot()
                    .into_iter()
                    .map(|(key, row)| Change::insert(key, row))
                    .collect();
                log::debug!("preloaded live query {} with {} rows", self.id, initial.len());
                self.emit(initial);
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn receive(&self, collection: CollectionId, batch: &[Change]) {
        match self.status.get() {
            Status::Ready => (),
            Status::Idle => {
                log::trace!("live query {} not preloaded, ignoring batch from {collection}", self.id);
                return;
            }
            Status::Errored | Status::Disposed => {
                log::warn!(
                    "live query {} is {}, dropping batch of {} changes from {collection}",
                    self.id,
                    self.status.get(),
                    batch.len()
                );
                return;
            }
        }
        self.queue.borrow_mut().push_back((collection, batch.to_vec()));
        if !self.draining.replace(true) {
            self.drain();
            self.draining.set(false);
        }
    }

    fn drain(&self) {
        loop {
            if self.status.get() != Status::Ready {
                self.queue.borrow_mut().clear();
                return;
            }
            let Some((collection, batch)) = self.queue.borrow_mut().pop_front() else {
                return;
            };
            let applied = self.engine.borrow_mut().apply(collection, &batch);
            match applied {
                Ok(changes) => self.emit(changes),
                Err(e) => {
                    self.fail(e);
                }
            }
        }
    }

    fn emit(&self, changes: Vec<Change>) {
        if changes.is_empty() || self.status.get() == Status::Disposed {
            return;
        }
        if !self.subscribed.get() {
            if self.options.buffer_until_subscribed {
                self.buffer.borrow_mut().extend(changes);
            }
            return;
        }
        let listeners: Vec<ChangeListener> = self.listeners.borrow().values().cloned().collect();
        for listener in listeners {
            // a subscriber may dispose the query
            if self.status.get() == Status::Disposed {
                return;
            }
            listener(&changes[..]);
        }
    }

    fn fail(&self, source: livedb_ops::EvalError) -> LiveError {
        let err = LiveError::eval(&self.id, source);
        log::error!("{err}");
        self.status.set(Status::Errored);
        *self.error.borrow_mut() = Some(err.clone());
        let listeners: Vec<ErrorListener> = self.error_listeners.borrow().clone();
        for listener in listeners {
            listener(&err);
        }
        err
    }
}
