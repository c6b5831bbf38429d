//! # Query Body Stages
//! A [`Stage`] holds the maintained state of one query body:
//! ```text
//!  sources ──join──▶ tuples ──group──▶ groups ──project──▶ staged ──window──▶ visible
//! ```
//! - Tuples are keyed by the keys of their source rows, and indexed by the
//!   key bound at each position so the tuples touching a changed row can be
//!   found directly.
//! - Groups hold one [`AggState`] per aggregate, updated by retracting
//!   removed tuples and inserting added ones.
//! - Staged rows are the projected rows before the window (`distinct`,
//!   `orderBy`, `offset`, `limit`) is applied.
//!
//! Every update returns the changes to the visible rows.

use crate::{
    errors::EvalError,
    eval::{AggValues, Env, Evaluator, Frame, Rows},
    join::{JoinOrder, Tuple},
    reduce::AggState,
};
use livedb_core::{
    plan::{Direction, ExprRef, Expression, Idx, Key, OrderTerm, Plan, QueryBody, SelectField, Selection},
    DependencyGraph,
};
use livedb_store::{Change, Row, RowKey, Scalar};
use std::{
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Only the tuples touching changed rows are re-derived.
    Incremental,
    /// All tuples are re-derived and diffed against the previous tuples.
    Recompute,
}

struct Group {
    members: BTreeSet<RowKey>,
    states: Vec<AggState>,
}

struct Staged {
    row: Row,
    sort: Vec<Scalar>,
}

struct Bound {
    env: Env,
    group: Option<RowKey>,
}

pub struct Stage {
    body: Key<QueryBody>,
    mode: Mode,
    joins: JoinOrder,
    aggregates: Vec<ExprRef>,
    grouped: bool,
    windowed: bool,
    /// Expressions contain scalar subqueries, whose values can change
    /// without any tuple of this body changing.
    nested: bool,
    tuples: BTreeMap<RowKey, Bound>,
    /// For each source position, the tuples binding each source row key.
    by_part: Vec<BTreeMap<Scalar, BTreeSet<RowKey>>>,
    groups: BTreeMap<RowKey, Group>,
    staged: BTreeMap<RowKey, Staged>,
    visible: Rows,
    /// Keys of `visible` in output order, for windowed bodies.
    order: Vec<RowKey>,
}

impl Stage {
    pub fn new(lp: &Plan, graph: &DependencyGraph, body: Key<QueryBody>, mode: Mode) -> Self {
        let joins = JoinOrder::new(lp, body);
        let positions = joins.len();
        let grouped = lp.get_body(body).is_grouped(lp);
        let windowed = lp.get_body(body).is_windowed();
        let nested = lp
            .get_body(body)
            .expressions()
            .into_iter()
            .any(|e| lp.contains_subquery(e));
        let mut stage = Self {
            body,
            mode,
            joins,
            aggregates: graph.aggregates_of(body),
            grouped,
            windowed,
            nested,
            tuples: BTreeMap::new(),
            by_part: vec![BTreeMap::new(); positions],
            groups: BTreeMap::new(),
            staged: BTreeMap::new(),
            visible: Rows::new(),
            order: Vec::new(),
        };
        stage.reset(lp);
        stage
    }

    pub fn body(&self) -> Key<QueryBody> {
        self.body
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The current output rows, by key.
    pub fn visible(&self) -> &Rows {
        &self.visible
    }

    pub fn into_visible(self) -> Rows {
        self.visible
    }

    /// The current output rows in output order.
    pub fn ordered_rows(&self) -> Vec<(RowKey, Row)> {
        if self.windowed {
            self.order
                .iter()
                .filter_map(|k| self.visible.get(k).map(|r| (k.clone(), r.clone())))
                .collect()
        } else {
            self.visible.iter().map(|(k, r)| (k.clone(), r.clone())).collect()
        }
    }

    fn reset(&mut self, lp: &Plan) {
        self.tuples.clear();
        self.by_part.iter_mut().for_each(BTreeMap::clear);
        self.groups.clear();
        self.staged.clear();
        self.visible.clear();
        self.order.clear();
        if self.grouped && lp.get_body(self.body).group_by.is_none() {
            self.groups.insert(RowKey::new(Vec::new()), self.empty_group(lp));
        }
    }

    fn empty_group(&self, lp: &Plan) -> Group {
        Group {
            members: BTreeSet::new(),
            states: self
                .aggregates
                .iter()
                .map(|agg| match lp.get_expr(*agg) {
                    Expression::Aggregate { func, args } => AggState::new(*func, args.len()),
                    _ => unreachable!("aggregate nodes are built from aggregate expressions"),
                })
                .collect(),
        }
    }

    /// Derive every tuple from scratch and diff against the current state.
    /// Used to initialize a stage, and to update stages in
    /// [`Mode::Recompute`].
    pub fn recompute(&mut self, ev: &Evaluator<'_>, outer: Option<&Frame<'_>>) -> Result<Vec<Change>, EvalError> {
        let mut touched = BTreeSet::new();
        if self.nested {
            // rebuild, keeping the visible rows to diff against
            let visible = std::mem::take(&mut self.visible);
            let order = std::mem::take(&mut self.order);
            self.reset(ev.lp);
            touched.extend(visible.keys().cloned());
            self.visible = visible;
            self.order = order;
        }
        let derived: BTreeMap<RowKey, Env> = self.joins.enumerate(ev, outer, None)?.into_iter().collect();
        let retract: Vec<RowKey> = self
            .tuples
            .iter()
            .filter(|(k, b)| derived.get(*k) != Some(&b.env))
            .map(|(k, _)| k.clone())
            .collect();
        let insert: Vec<Tuple> = derived
            .into_iter()
            .filter(|(k, env)| self.tuples.get(k).map(|b| &b.env) != Some(env))
            .collect();
        touched.extend(self.apply_delta(ev, outer, retract, insert)?);
        if self.staged.is_empty() {
            // the global group has a row even without any tuples
            touched.extend(self.groups.keys().cloned());
        }
        self.refresh(ev, outer, touched)
    }

    /// Update from changed source rows, given as the changed keys at each
    /// source position.
    /// INV: the stage is [`Mode::Incremental`], so all joins are inner and
    ///      the body is not correlated.
    pub fn update(&mut self, ev: &Evaluator<'_>, changed: &[(usize, BTreeSet<RowKey>)]) -> Result<Vec<Change>, EvalError> {
        debug_assert_eq!(self.mode, Mode::Incremental);
        let sources: Vec<_> = self.joins.sources().collect();

        let mut stale: BTreeSet<RowKey> = BTreeSet::new();
        let mut derived: BTreeMap<RowKey, Env> = BTreeMap::new();
        for (pos, keys) in changed.iter().filter(|(_, keys)| !keys.is_empty()) {
            for key in keys {
                if let Some(tuples) = self.by_part[*pos].get(&key.clone().into_scalar()) {
                    stale.extend(tuples.iter().cloned());
                }
            }
            let current = ev.inputs.rows(sources[*pos], None)?;
            let fixed: Rows = keys
                .iter()
                .filter_map(|k| current.get(k).map(|r| (k.clone(), r.clone())))
                .collect();
            derived.extend(self.joins.enumerate(ev, None, Some((*pos, &fixed)))?);
        }

        let retract: Vec<RowKey> = stale
            .into_iter()
            .filter(|k| derived.get(k) != self.tuples.get(k).map(|b| &b.env))
            .collect();
        let insert: Vec<Tuple> = derived
            .into_iter()
            .filter(|(k, env)| self.tuples.get(k).map(|b| &b.env) != Some(env))
            .collect();
        log::trace!(
            "stage {}: retracting {} and inserting {} tuples",
            self.body.arr_idx(),
            retract.len(),
            insert.len()
        );
        let touched = self.apply_delta(ev, None, retract, insert)?;
        self.refresh(ev, None, touched)
    }

    /// Remove then add tuples, maintaining the indexes and aggregate states.
    /// Returns the staged keys that need to be re-projected.
    fn apply_delta(
        &mut self,
        ev: &Evaluator<'_>,
        outer: Option<&Frame<'_>>,
        retract: Vec<RowKey>,
        insert: Vec<Tuple>,
    ) -> Result<BTreeSet<RowKey>, EvalError> {
        let mut touched = BTreeSet::new();

        for key in retract {
            let Some(bound) = self.tuples.remove(&key) else {
                continue;
            };
            self.unindex(&key);
            match bound.group {
                Some(group_key) => {
                    let group = self
                        .groups
                        .get_mut(&group_key)
                        .ok_or_else(|| corrupt(ev, self.aggregates.first().copied(), &group_key))?;
                    group.members.remove(&key);
                    let frame = Frame::new(self.body, &bound.env, outer);
                    for (agg, state) in self.aggregates.iter().zip(group.states.iter_mut()) {
                        let value = agg_input(ev, *agg, &frame)?;
                        state
                            .retract(&value)
                            .map_err(|_| corrupt(ev, Some(*agg), &group_key))?;
                    }
                    if group.members.is_empty() && ev.lp.get_body(self.body).group_by.is_some() {
                        self.groups.remove(&group_key);
                    }
                    touched.insert(group_key);
                }
                None => {
                    touched.insert(key);
                }
            }
        }

        for (key, env) in insert {
            self.index(&key);
            let group = if self.grouped {
                let frame = Frame::new(self.body, &env, outer);
                let group_key = self.group_key(ev, &frame)?;
                if !self.groups.contains_key(&group_key) {
                    let empty = self.empty_group(ev.lp);
                    self.groups.insert(group_key.clone(), empty);
                }
                let mut inputs = Vec::with_capacity(self.aggregates.len());
                for agg in &self.aggregates {
                    inputs.push(agg_input(ev, *agg, &frame)?);
                }
                if let Some(group) = self.groups.get_mut(&group_key) {
                    group.members.insert(key.clone());
                    for (state, value) in group.states.iter_mut().zip(&inputs) {
                        state.insert(value);
                    }
                }
                touched.insert(group_key.clone());
                Some(group_key)
            } else {
                touched.insert(key.clone());
                None
            };
            self.tuples.insert(key, Bound { env, group });
        }
        Ok(touched)
    }

    fn index(&mut self, key: &RowKey) {
        for (part, index) in key.parts().iter().zip(self.by_part.iter_mut()) {
            index.entry(part.clone()).or_default().insert(key.clone());
        }
    }

    fn unindex(&mut self, key: &RowKey) {
        for (part, index) in key.parts().iter().zip(self.by_part.iter_mut()) {
            if let Some(tuples) = index.get_mut(part) {
                tuples.remove(key);
                if tuples.is_empty() {
                    index.remove(part);
                }
            }
        }
    }

    fn group_key(&self, ev: &Evaluator<'_>, frame: &Frame<'_>) -> Result<RowKey, EvalError> {
        let exprs = ev.lp.get_body(self.body).group_by.iter().flatten();
        let mut parts = Vec::new();
        for expr in exprs {
            parts.push(ev.eval(*expr, frame)?);
        }
        Ok(RowKey::new(parts))
    }

    /// Re-project the touched staged rows, then update the visible rows.
    fn refresh(
        &mut self,
        ev: &Evaluator<'_>,
        outer: Option<&Frame<'_>>,
        touched: BTreeSet<RowKey>,
    ) -> Result<Vec<Change>, EvalError> {
        let b = ev.lp.get_body(self.body);
        for key in &touched {
            let staged = if self.grouped {
                self.project_group(ev, outer, key)?
            } else {
                match self.tuples.get(key) {
                    Some(bound) => Some(self.project(ev, &Frame::new(self.body, &bound.env, outer))?),
                    None => None,
                }
            };
            match staged {
                Some(s) => self.staged.insert(key.clone(), s),
                None => self.staged.remove(key),
            };
        }

        if self.windowed {
            let window = self.window(b);
            let mut next = Rows::new();
            let mut order = Vec::with_capacity(window.len());
            for (key, row) in window {
                order.push(key.clone());
                next.insert(key, row);
            }
            let changes = diff(&self.visible, &next, next.keys().chain(self.visible.keys()));
            self.visible = next;
            self.order = order;
            Ok(changes)
        } else {
            let mut next = Rows::new();
            for key in &touched {
                if let Some(s) = self.staged.get(key) {
                    next.insert(key.clone(), s.row.clone());
                }
            }
            let changes = diff(&self.visible, &next, touched.iter());
            for key in touched {
                match next.remove(&key) {
                    Some(row) => self.visible.insert(key, row),
                    None => self.visible.remove(&key),
                };
            }
            Ok(changes)
        }
    }

    fn project_group(
        &self,
        ev: &Evaluator<'_>,
        outer: Option<&Frame<'_>>,
        key: &RowKey,
    ) -> Result<Option<Staged>, EvalError> {
        let Some(group) = self.groups.get(key) else {
            return Ok(None);
        };
        let values: AggValues = self
            .aggregates
            .iter()
            .zip(&group.states)
            .map(|(agg, state)| (Idx::new(*agg), state.value()))
            .collect();
        // non-aggregate expressions are evaluated against the first tuple of
        // the group
        let empty = vec![Scalar::Undefined; self.joins.len()];
        let env = group
            .members
            .first()
            .and_then(|k| self.tuples.get(k))
            .map_or(&empty, |b| &b.env);
        let frame = Frame::new(self.body, env, outer).with_aggregates(&values);
        if let Some(having) = ev.lp.get_body(self.body).having {
            if !ev.truthy(having, &frame)? {
                return Ok(None);
            }
        }
        self.project(ev, &frame).map(Some)
    }

    fn project(&self, ev: &Evaluator<'_>, frame: &Frame<'_>) -> Result<Staged, EvalError> {
        let b = ev.lp.get_body(self.body);
        let mut row = Row::new();
        match &b.selection {
            Some(Selection::Fields(fields)) => {
                for field in fields {
                    match field {
                        SelectField::Named { name, expr } => row.insert(name.clone(), ev.eval(*expr, frame)?),
                        SelectField::Spread(expr) => {
                            if let Scalar::Record(r) = ev.eval(*expr, frame)? {
                                row.extend_from(&r);
                            }
                        }
                    }
                }
            }
            Some(Selection::Value(expr)) => match ev.eval(*expr, frame)? {
                Scalar::Record(r) => row = r,
                v => row.insert("value", v),
            },
            None => (),
        }
        let mut sort = Vec::new();
        for OrderTerm { expr, .. } in b.order_by.iter().flatten() {
            sort.push(ev.eval(*expr, frame)?);
        }
        Ok(Staged { row, sort })
    }

    /// The visible rows of a windowed body, in output order.
    fn window(&self, b: &QueryBody) -> Vec<(RowKey, Row)> {
        let mut entries: Vec<(RowKey, &Staged)> = if b.distinct {
            let mut seen = BTreeSet::new();
            self.staged
                .values()
                .filter(|s| seen.insert(&s.row))
                .map(|s| (RowKey::from(Scalar::Record(s.row.clone())), s))
                .collect()
        } else {
            self.staged.iter().map(|(k, s)| (k.clone(), s)).collect()
        };

        let terms = b.order_by.as_deref().unwrap_or_default();
        entries.sort_by(|(ka, sa), (kb, sb)| {
            terms
                .iter()
                .zip(sa.sort.iter().zip(&sb.sort))
                .map(|(term, (x, y))| match term.direction {
                    Direction::Asc => x.cmp(y),
                    Direction::Desc => y.cmp(x),
                })
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
                .then_with(|| ka.cmp(kb))
        });

        entries
            .into_iter()
            .skip(b.offset.unwrap_or(0))
            .take(b.limit.unwrap_or(usize::MAX))
            .map(|(k, s)| (k, s.row.clone()))
            .collect()
    }
}

/// The value an aggregate folds for a tuple. `count()` folds tuples, so has
/// no input value.
fn agg_input(ev: &Evaluator<'_>, agg: ExprRef, frame: &Frame<'_>) -> Result<Scalar, EvalError> {
    match ev.lp.get_expr(agg) {
        Expression::Aggregate { args, .. } => match args.first() {
            Some(arg) => ev.eval(*arg, frame),
            None => Ok(Scalar::Null),
        },
        _ => Ok(Scalar::Null),
    }
}

fn corrupt(ev: &Evaluator<'_>, agg: Option<ExprRef>, group: &RowKey) -> EvalError {
    let err = EvalError::AggregateStateCorruption {
        aggregate: agg.map_or_else(|| "group".to_owned(), |a| ev.lp.describe_expr(a)),
        group: group.to_string(),
    };
    log::error!("{err}");
    err
}

/// Changes taking `old` to `new` over `keys`: deletes first, then inserts and
/// updates, each in key order.
fn diff<'k>(old: &Rows, new: &Rows, keys: impl Iterator<Item = &'k RowKey>) -> Vec<Change> {
    let keys: BTreeSet<&RowKey> = keys.collect();
    let mut deletes = Vec::new();
    let mut upserts = Vec::new();
    for key in keys {
        match (old.get(key), new.get(key)) {
            (Some(before), None) => deletes.push(Change::delete(key.clone(), before.clone())),
            (None, Some(after)) => upserts.push(Change::insert(key.clone(), after.clone())),
            (Some(before), Some(after)) if before != after => upserts.push(Change::update(key.clone(), after.clone())),
            _ => (),
        }
    }
    deletes.extend(upserts);
    deletes
}
