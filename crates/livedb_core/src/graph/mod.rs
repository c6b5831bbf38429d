//! # Dependency Graph
//! A query compiles to a DAG of nodes, one per reachable IR object:
//! - [`DependencyNode::Collection`] for each source bound to a base collection.
//! - [`DependencyNode::Expression`] for literals, references, function calls
//!   and scalar subqueries.
//! - [`DependencyNode::Aggregate`] for aggregates, scoped to the body whose
//!   groups they aggregate over.
//! - [`DependencyNode::Selection`] for each query body.
//!
//! `depends_on` edges point from a node to its inputs, `depended_upon` is the
//! exact reverse. Nodes are shared: the same IR object always compiles to the
//! same node, and an edge is recorded once per use (so a reference used twice
//! in a projection has two `depended_upon` entries to the selection).

mod build;

use crate::plan::{CollectionRef, ExprRef, Idx, Key, Plan, Query, QueryBody, Source};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use typed_generational_arena::StandardArena as GenArena;

pub type NodeKey = Key<GraphNode>;

pub enum DependencyNode {
    Collection {
        source: Key<Source>,
        collection: Key<CollectionRef>,
        /// Conjuncts of the body's join and `where` conditions referencing
        /// the source's alias.
        conditions: Vec<ExprRef>,
    },
    Expression {
        expr: ExprRef,
    },
    Aggregate {
        agg: ExprRef,
        /// The body whose groups are aggregated.
        body: Key<QueryBody>,
    },
    Selection {
        body: Key<QueryBody>,
    },
}

pub struct GraphNode {
    pub node: DependencyNode,
    pub depends_on: Vec<NodeKey>,
    pub depended_upon: Vec<NodeKey>,
}

/// Identity of the IR object a node was built from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum IrId {
    Expr(Idx<crate::plan::Expression>),
    Body(Idx<QueryBody>),
    Source(Idx<Source>),
}

pub struct DependencyGraph {
    nodes: GenArena<GraphNode>,
    index: FxHashMap<IrId, NodeKey>,
    root: NodeKey,
    /// Every node after all of its inputs.
    order: Vec<NodeKey>,
}

impl DependencyGraph {
    /// Compile a query into its dependency graph.
    /// - Fails on invalid aggregate placement, unresolvable references and
    ///   cyclic query definitions.
    pub fn build(lp: &Plan, query: Query) -> Result<Self, crate::errors::BuildError> {
        crate::analysis::validity::validate(lp, query)?;
        build::Builder::new(lp).finish(query)
    }

    pub fn root(&self) -> NodeKey {
        self.root
    }

    pub fn get(&self, key: NodeKey) -> &GraphNode {
        self.nodes.get(key).unwrap()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 0
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeKey, &GraphNode)> {
        self.nodes.iter()
    }

    /// Nodes with no inputs (collections and literals).
    pub fn top_level(&self) -> Vec<NodeKey> {
        self.order
            .iter()
            .copied()
            .filter(|k| self.get(*k).depends_on.is_empty())
            .collect()
    }

    /// Nodes nothing depends on (the root selection).
    pub fn outputs(&self) -> Vec<NodeKey> {
        self.order
            .iter()
            .copied()
            .filter(|k| self.get(*k).depended_upon.is_empty())
            .collect()
    }

    /// All collection nodes, with their collections.
    pub fn collections(&self) -> Vec<(NodeKey, Key<Source>, Key<CollectionRef>)> {
        self.order
            .iter()
            .filter_map(|k| match &self.get(*k).node {
                DependencyNode::Collection {
                    source, collection, ..
                } => Some((*k, *source, *collection)),
                _ => None,
            })
            .collect()
    }

    /// Selection nodes in dependency order (innermost bodies first).
    pub fn selections(&self) -> Vec<(NodeKey, Key<QueryBody>)> {
        self.order
            .iter()
            .filter_map(|k| match &self.get(*k).node {
                DependencyNode::Selection { body } => Some((*k, *body)),
                _ => None,
            })
            .collect()
    }

    /// Aggregate nodes over the groups of `body`, in dependency order.
    pub fn aggregates_of(&self, body: Key<QueryBody>) -> Vec<ExprRef> {
        self.order
            .iter()
            .filter_map(|k| match &self.get(*k).node {
                DependencyNode::Aggregate { agg, body: b } if *b == body => Some(*agg),
                _ => None,
            })
            .collect()
    }

    pub fn topological_order(&self) -> &[NodeKey] {
        &self.order
    }

    pub fn node_for_expr(&self, expr: ExprRef) -> Option<NodeKey> {
        self.index.get(&IrId::Expr(expr.into())).copied()
    }

    pub fn node_for_body(&self, body: Key<QueryBody>) -> Option<NodeKey> {
        self.index.get(&IrId::Body(body.into())).copied()
    }

    pub fn node_for_source(&self, source: Key<Source>) -> Option<NodeKey> {
        self.index.get(&IrId::Source(source.into())).copied()
    }

    /// All nodes reachable from `changed` through `depended_upon` (including
    /// `changed`), in topological order.
    pub fn dirtied_by(&self, changed: &[NodeKey]) -> Vec<NodeKey> {
        let mut dirty = rustc_hash::FxHashSet::default();
        let mut queue: VecDeque<NodeKey> = changed.iter().copied().collect();
        while let Some(k) = queue.pop_front() {
            if dirty.insert(k.arr_idx()) {
                queue.extend(self.get(k).depended_upon.iter().copied());
            }
        }
        self.order
            .iter()
            .copied()
            .filter(|k| dirty.contains(&k.arr_idx()))
            .collect()
    }

    /// Is `to` reachable from `from` through `depends_on` edges.
    pub fn depends_transitively(&self, from: NodeKey, to: NodeKey) -> bool {
        let mut seen = rustc_hash::FxHashSet::default();
        let mut stack: Vec<NodeKey> = self.get(from).depends_on.clone();
        while let Some(k) = stack.pop() {
            if k == to {
                return true;
            }
            if seen.insert(k.arr_idx()) {
                stack.extend(self.get(k).depends_on.iter().copied());
            }
        }
        false
    }
}

/// Kahn's algorithm over `depends_on`.
/// INV: the graph is acyclic (enforced while building).
fn topological_order(nodes: &GenArena<GraphNode>) -> Vec<NodeKey> {
    let mut remaining: FxHashMap<usize, usize> = nodes
        .iter()
        .map(|(k, n)| (k.arr_idx(), n.depends_on.len()))
        .collect();
    let mut ready: VecDeque<NodeKey> = nodes
        .iter()
        .filter(|(_, n)| n.depends_on.is_empty())
        .map(|(k, _)| k)
        .collect();
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(k) = ready.pop_front() {
        order.push(k);
        for dependent in &nodes.get(k).unwrap().depended_upon {
            let count = remaining.entry(dependent.arr_idx()).or_default();
            *count -= 1;
            if *count == 0 {
                ready.push_back(*dependent);
            }
        }
    }
    order
}
