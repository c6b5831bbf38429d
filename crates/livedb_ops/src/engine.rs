//! # Query Engine
//! Maintains the result of one compiled query.
//! - Each collection source has a leaf: a local copy of the collection's
//!   rows that pass the conditions pushed down to that source.
//! - Each body that is not correlated has a [`Stage`]. Correlated bodies are
//!   evaluated on demand, for each row of the enclosing body.
//!
//! For each change batch the dirtied selections are updated in dependency
//! order, each consuming the changes produced by the stages it reads from.

use crate::{
    errors::{EvalError, QueryError},
    eval::{Env, Evaluator, FieldPolicy, Frame, Inputs, Rows},
    stage::{Mode, Stage},
};
use livedb_core::{
    analysis::{
        correlation::{has_nested_evaluation, inner_joins_only, is_correlated},
        pushdown::pushable_conditions,
    },
    graph::{DependencyNode, NodeKey},
    plan::{ExprRef, Idx, Key, QueryBody, Source, SourceKind},
    BuildError, DependencyGraph, Plan, Query,
};
use livedb_store::{Change, CollectionHandle, CollectionId, Row, RowKey, Scalar};
use rustc_hash::FxHashMap;
use std::{
    borrow::Cow,
    collections::{BTreeMap, BTreeSet},
    rc::Rc,
};

struct Leaf {
    node: NodeKey,
    body: Key<QueryBody>,
    position: usize,
    handle: CollectionHandle,
    filters: Vec<ExprRef>,
    rows: Rows,
}

pub struct Engine {
    lp: Rc<Plan>,
    graph: DependencyGraph,
    query: Query,
    policy: FieldPolicy,
    leaves: FxHashMap<Idx<Source>, Leaf>,
    stages: FxHashMap<Idx<QueryBody>, Stage>,
}

impl Engine {
    pub fn new(lp: Rc<Plan>, query: Query, policy: FieldPolicy) -> Result<Self, BuildError> {
        let graph = DependencyGraph::build(&lp, query)?;
        let mut leaves = FxHashMap::default();
        let mut stages = FxHashMap::default();

        for (_, body) in graph.selections() {
            for (position, source) in lp.get_body(body).sources.iter().enumerate() {
                if let SourceKind::Collection(collection) = lp.get_source(*source).kind {
                    leaves.insert(
                        Idx::new(*source),
                        Leaf {
                            node: graph.node_for_source(*source).unwrap(),
                            body,
                            position,
                            handle: lp.get_collection(collection).handle.clone(),
                            filters: pushable_conditions(&lp, body, *source),
                            rows: Rows::new(),
                        },
                    );
                }
            }
            if !is_correlated(&lp, body) {
                let mode = if inner_joins_only(&lp, body) && !has_nested_evaluation(&lp, body) {
                    Mode::Incremental
                } else {
                    Mode::Recompute
                };
                log::debug!("body {} maintained in {mode:?} mode", body.arr_idx());
                stages.insert(Idx::new(body), Stage::new(&lp, &graph, body, mode));
            }
        }

        log::debug!(
            "compiled query to {} nodes, {} leaves and {} stages",
            graph.len(),
            leaves.len(),
            stages.len()
        );
        Ok(Self {
            lp,
            graph,
            query,
            policy,
            leaves,
            stages,
        })
    }

    pub fn plan(&self) -> &Plan {
        &self.lp
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// The distinct collections read by the query.
    pub fn collections(&self) -> Vec<CollectionHandle> {
        let mut seen = BTreeSet::new();
        let mut sources: Vec<_> = self.leaves.iter().collect();
        sources.sort_by_key(|(idx, _)| **idx);
        sources
            .into_iter()
            .filter(|(_, leaf)| seen.insert(leaf.handle.id()))
            .map(|(_, leaf)| leaf.handle.clone())
            .collect()
    }

    /// Load every leaf from its collection's current contents, and evaluate
    /// the query from scratch.
    pub fn initialize(&mut self) -> Result<(), EvalError> {
        let mut loaded = Vec::with_capacity(self.leaves.len());
        for (idx, leaf) in &self.leaves {
            let mut rows = Rows::new();
            for (key, row) in leaf.handle.entries() {
                if self.passes(leaf, &row)? {
                    rows.insert(key, row);
                }
            }
            loaded.push((*idx, rows));
        }
        for (idx, rows) in loaded {
            if let Some(leaf) = self.leaves.get_mut(&idx) {
                leaf.rows = rows;
            }
        }

        for (_, body) in self.graph.selections() {
            let Some(mode) = self.stages.get(&Idx::new(body)).map(Stage::mode) else {
                continue;
            };
            let mut stage = Stage::new(&self.lp, &self.graph, body, mode);
            stage.recompute(&Evaluator::new(&self.lp, &*self, self.policy), None)?;
            self.stages.insert(Idx::new(body), stage);
        }
        Ok(())
    }

    /// Apply a batch of changes from one collection, returning the changes to
    /// the query's output.
    pub fn apply(&mut self, collection: CollectionId, batch: &[Change]) -> Result<Vec<Change>, EvalError> {
        // decide each change against the leaf's filters before mutating
        let mut decided: Vec<(Idx<Source>, RowKey, Option<Row>)> = Vec::new();
        for (idx, leaf) in self.leaves.iter().filter(|(_, l)| l.handle.id() == collection) {
            for change in batch {
                let kept = if change.is_upsert() && self.passes(leaf, &change.value)? {
                    Some(change.value.clone())
                } else {
                    None
                };
                decided.push((*idx, change.key.clone(), kept));
            }
        }

        let mut changed: FxHashMap<Idx<Source>, BTreeSet<RowKey>> = FxHashMap::default();
        for (idx, key, kept) in decided {
            let Some(leaf) = self.leaves.get_mut(&idx) else {
                continue;
            };
            let modified = match kept {
                Some(row) => leaf.rows.insert(key.clone(), row.clone()).as_ref() != Some(&row),
                None => leaf.rows.remove(&key).is_some(),
            };
            if modified {
                changed.entry(idx).or_default().insert(key);
            }
        }
        if changed.is_empty() {
            return Ok(Vec::new());
        }

        let changed_nodes: Vec<NodeKey> = changed.keys().map(|idx| self.leaves[idx].node).collect();
        let dirty = self.graph.dirtied_by(&changed_nodes);
        log::debug!(
            "batch of {} changes from collection {collection} dirtied {} of {} nodes",
            batch.len(),
            dirty.len(),
            self.graph.len()
        );

        let mut outputs: FxHashMap<Idx<QueryBody>, BTreeSet<RowKey>> = FxHashMap::default();
        let mut root_changes = Vec::new();
        for node in dirty {
            let &DependencyNode::Selection { body } = &self.graph.get(node).node else {
                continue;
            };
            let Some(mut stage) = self.stages.remove(&Idx::new(body)) else {
                continue;
            };
            let result = self.update_stage(&mut stage, &changed, &outputs);
            self.stages.insert(Idx::new(body), stage);
            let changes = result?;
            if body == self.query.body {
                root_changes = changes;
            } else if !changes.is_empty() {
                outputs.insert(Idx::new(body), changes.into_iter().map(|c| c.key).collect());
            }
        }
        Ok(root_changes)
    }

    fn update_stage(
        &self,
        stage: &mut Stage,
        changed: &FxHashMap<Idx<Source>, BTreeSet<RowKey>>,
        outputs: &FxHashMap<Idx<QueryBody>, BTreeSet<RowKey>>,
    ) -> Result<Vec<Change>, EvalError> {
        let ev = Evaluator::new(&self.lp, self, self.policy);
        match stage.mode() {
            Mode::Recompute => stage.recompute(&ev, None),
            Mode::Incremental => {
                let positions: Vec<(usize, BTreeSet<RowKey>)> = self
                    .lp
                    .get_body(stage.body())
                    .sources
                    .iter()
                    .enumerate()
                    .filter_map(|(pos, source)| {
                        let keys = match self.lp.get_source(*source).kind {
                            SourceKind::Collection(_) => changed.get(&Idx::new(*source)),
                            SourceKind::Query(sub) => outputs.get(&Idx::new(sub)),
                        };
                        keys.map(|k| (pos, k.clone()))
                    })
                    .collect();
                if positions.is_empty() {
                    Ok(Vec::new())
                } else {
                    stage.update(&ev, &positions)
                }
            }
        }
    }

    fn passes(&self, leaf: &Leaf, row: &Row) -> Result<bool, EvalError> {
        if leaf.filters.is_empty() {
            return Ok(true);
        }
        let mut env: Env = vec![Scalar::Undefined; leaf.position];
        env.push(Scalar::Record(row.clone()));
        let frame = Frame::new(leaf.body, &env, None);
        let ev = Evaluator::new(&self.lp, self, self.policy);
        for filter in &leaf.filters {
            if !ev.truthy(*filter, &frame)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// The query's current output, in output order.
    pub fn snapshot(&self) -> Vec<(RowKey, Row)> {
        self.stages
            .get(&Idx::new(self.query.body))
            .map(Stage::ordered_rows)
            .unwrap_or_default()
    }

    /// Evaluate a correlated body for one row of its enclosing body.
    fn evaluate_within(&self, body: Key<QueryBody>, outer: &Frame<'_>) -> Result<Stage, EvalError> {
        let mut stage = Stage::new(&self.lp, &self.graph, body, Mode::Recompute);
        stage.recompute(&Evaluator::new(&self.lp, self, self.policy), Some(outer))?;
        Ok(stage)
    }
}

impl Inputs for Engine {
    fn rows<'s>(&'s self, source: Key<Source>, outer: Option<&Frame<'_>>) -> Result<Cow<'s, Rows>, EvalError> {
        match self.lp.get_source(source).kind {
            SourceKind::Collection(_) => Ok(self
                .leaves
                .get(&Idx::new(source))
                .map_or_else(|| Cow::Owned(Rows::new()), |leaf| Cow::Borrowed(&leaf.rows))),
            SourceKind::Query(sub) => match (self.stages.get(&Idx::new(sub)), outer) {
                (Some(stage), _) => Ok(Cow::Borrowed(stage.visible())),
                (None, Some(outer)) => Ok(Cow::Owned(self.evaluate_within(sub, outer)?.into_visible())),
                (None, None) => Err(EvalError::UnboundAlias(self.lp.get_source(source).alias.clone())),
            },
        }
    }

    fn subquery(&self, body: Key<QueryBody>, outer: &Frame<'_>) -> Result<Vec<Row>, EvalError> {
        let rows = match self.stages.get(&Idx::new(body)) {
            Some(stage) => stage.ordered_rows(),
            None => self.evaluate_within(body, outer)?.ordered_rows(),
        };
        Ok(rows.into_iter().map(|(_, row)| row).collect())
    }
}

/// Evaluate a query once against the current contents of its collections.
pub fn evaluate(lp: Rc<Plan>, query: Query, policy: FieldPolicy) -> Result<Vec<(RowKey, Row)>, QueryError> {
    let mut engine = Engine::new(lp, query, policy)?;
    engine.initialize()?;
    Ok(engine.snapshot())
}

/// The current output rows of the query, keyed (used to compare maintained
/// results against evaluation from scratch).
pub fn keyed(rows: Vec<(RowKey, Row)>) -> BTreeMap<RowKey, Row> {
    rows.into_iter().collect()
}
