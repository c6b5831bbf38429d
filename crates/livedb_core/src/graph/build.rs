//! Walks the IR from the root body, creating nodes on first visit and linking
//! on every visit.
//! - A body or expression being visited is on the stack, revisiting it before
//!   it completes is a cyclic definition.
//! - References resolve their alias through the stack of enclosing bodies,
//!   innermost first.
//! - A join condition may only refer to its own source, the sources joined
//!   before it, and enclosing bodies.

use super::{topological_order, DependencyGraph, DependencyNode, GraphNode, IrId, NodeKey};
use crate::{
    analysis::{correlation::FreeAliases, pushdown::conditions_referencing},
    errors::BuildError,
    plan::{ExprRef, Expression, Key, Plan, Query, QueryBody, Source, SourceKind},
};
use rustc_hash::{FxHashMap, FxHashSet};
use typed_generational_arena::StandardArena as GenArena;

pub(super) struct Builder<'a> {
    lp: &'a Plan,
    nodes: GenArena<GraphNode>,
    index: FxHashMap<IrId, NodeKey>,
    on_stack: FxHashSet<IrId>,
    scopes: Vec<Key<QueryBody>>,
}

impl<'a> Builder<'a> {
    pub(super) fn new(lp: &'a Plan) -> Self {
        Self {
            lp,
            nodes: GenArena::new(),
            index: FxHashMap::default(),
            on_stack: FxHashSet::default(),
            scopes: Vec::new(),
        }
    }

    pub(super) fn finish(mut self, query: Query) -> Result<DependencyGraph, BuildError> {
        let root = self.visit_body(query.body, None)?;
        let order = topological_order(&self.nodes);
        debug_assert_eq!(order.len(), self.nodes.len());
        if log::log_enabled!(log::Level::Trace) {
            for (_, node) in self.nodes.iter().filter(|(_, n)| n.depends_on.is_empty()) {
                log::trace!("top level dependency: {}", describe(self.lp, &node.node));
            }
        }
        Ok(DependencyGraph {
            nodes: self.nodes,
            index: self.index,
            root,
            order,
        })
    }

    fn link(&mut self, node: NodeKey, dependent: Option<NodeKey>) {
        if let Some(dependent) = dependent {
            self.nodes.get_mut(node).unwrap().depended_upon.push(dependent);
            self.nodes.get_mut(dependent).unwrap().depends_on.push(node);
        }
    }

    /// Either links an existing node for `id`, or returns `None` for the
    /// caller to create one.
    fn existing(&mut self, id: IrId, dependent: Option<NodeKey>) -> Result<Option<NodeKey>, BuildError> {
        match self.index.get(&id).copied() {
            Some(node) => {
                if self.on_stack.contains(&id) {
                    return Err(BuildError::CyclicQueryDefinition(describe(
                        self.lp,
                        &self.nodes.get(node).unwrap().node,
                    )));
                }
                self.link(node, dependent);
                Ok(Some(node))
            }
            None => Ok(None),
        }
    }

    fn create(&mut self, id: IrId, node: DependencyNode, dependent: Option<NodeKey>) -> NodeKey {
        let key = self.nodes.insert(GraphNode {
            node,
            depends_on: Vec::new(),
            depended_upon: Vec::new(),
        });
        self.index.insert(id, key);
        self.link(key, dependent);
        key
    }

    fn visit_body(&mut self, body: Key<QueryBody>, dependent: Option<NodeKey>) -> Result<NodeKey, BuildError> {
        let id = IrId::Body(body.into());
        if let Some(node) = self.existing(id, dependent)? {
            return Ok(node);
        }
        let node = self.create(id, DependencyNode::Selection { body }, dependent);
        self.on_stack.insert(id);
        self.scopes.push(body);

        let b = self.lp.get_body(body);
        for source in &b.sources {
            self.visit_source(*source, body, node)?;
        }
        for expr in b.expressions() {
            self.visit_expr(expr, body, node)?;
        }
        self.check_join_order(body)?;

        self.scopes.pop();
        self.on_stack.remove(&id);
        Ok(node)
    }

    fn visit_source(&mut self, source: Key<Source>, owner: Key<QueryBody>, dependent: NodeKey) -> Result<NodeKey, BuildError> {
        let id = IrId::Source(source.into());
        if let Some(node) = self.existing(id, Some(dependent))? {
            return Ok(node);
        }
        let src = self.lp.get_source(source);
        match src.kind {
            SourceKind::Collection(collection) => {
                let conditions = conditions_referencing(self.lp, owner, &src.alias);
                Ok(self.create(
                    id,
                    DependencyNode::Collection {
                        source,
                        collection,
                        conditions,
                    },
                    Some(dependent),
                ))
            }
            SourceKind::Query(sub) => {
                // the source is the subquery's selection
                self.on_stack.insert(id);
                let node = self.visit_body(sub, Some(dependent))?;
                self.on_stack.remove(&id);
                self.index.insert(id, node);
                Ok(node)
            }
        }
    }

    fn visit_expr(&mut self, expr: ExprRef, owner: Key<QueryBody>, dependent: NodeKey) -> Result<NodeKey, BuildError> {
        let id = IrId::Expr(expr.into());
        if let Some(node) = self.existing(id, Some(dependent))? {
            return Ok(node);
        }
        match self.lp.get_expr(expr) {
            Expression::Literal(_) => Ok(self.create(id, DependencyNode::Expression { expr }, Some(dependent))),
            Expression::Reference { path } => {
                let source = self.resolve(path)?;
                let node = self.create(id, DependencyNode::Expression { expr }, Some(dependent));
                let source_owner = self.owner_of(source);
                self.visit_source(source, source_owner, node)?;
                Ok(node)
            }
            Expression::Call { args, .. } => {
                let node = self.create(id, DependencyNode::Expression { expr }, Some(dependent));
                self.on_stack.insert(id);
                for arg in args {
                    self.visit_expr(*arg, owner, node)?;
                }
                self.on_stack.remove(&id);
                Ok(node)
            }
            Expression::Aggregate { args, .. } => {
                let node = self.create(id, DependencyNode::Aggregate { agg: expr, body: owner }, Some(dependent));
                self.on_stack.insert(id);
                for arg in args {
                    self.visit_expr(*arg, owner, node)?;
                }
                self.on_stack.remove(&id);
                Ok(node)
            }
            Expression::Subquery(body) => {
                let node = self.create(id, DependencyNode::Expression { expr }, Some(dependent));
                self.on_stack.insert(id);
                self.visit_body(*body, Some(node))?;
                self.on_stack.remove(&id);
                Ok(node)
            }
        }
    }

    /// Only called once the body's expressions have been visited, so any
    /// cycle through a condition has already been reported.
    fn check_join_order(&self, body: Key<QueryBody>) -> Result<(), BuildError> {
        let b = self.lp.get_body(body);
        let position = |alias: &str| b.sources.iter().position(|s| self.lp.get_source(*s).alias == alias);
        for (alias, cond) in &b.join_conditions {
            let Some(bound_at) = position(alias) else {
                continue;
            };
            let mut read = Vec::new();
            self.lp.get_expr(*cond).free_aliases(self.lp, &mut read);
            if let Some(later) = read.into_iter().find(|a| position(a).is_some_and(|p| p > bound_at)) {
                return Err(BuildError::JoinReferencesLaterAlias {
                    alias: alias.clone(),
                    later,
                });
            }
        }
        Ok(())
    }

    /// Resolve the alias of a reference path, innermost enclosing body first.
    fn resolve(&self, path: &[String]) -> Result<Key<Source>, BuildError> {
        let alias = &path[0];
        self.scopes
            .iter()
            .rev()
            .find_map(|body| self.lp.source_by_alias(*body, alias))
            .ok_or_else(|| BuildError::UnresolvedAlias {
                path: path.join("."),
            })
    }

    fn owner_of(&self, source: Key<Source>) -> Key<QueryBody> {
        *self
            .scopes
            .iter()
            .rev()
            .find(|b| self.lp.get_body(**b).sources.contains(&source))
            .unwrap()
    }
}

pub(super) fn describe(lp: &Plan, node: &DependencyNode) -> String {
    match node {
        DependencyNode::Collection {
            source, collection, ..
        } => format!(
            "{} as {}",
            lp.get_collection(*collection).name,
            lp.get_source(*source).alias
        ),
        DependencyNode::Expression { expr } | DependencyNode::Aggregate { agg: expr, .. } => {
            lp.describe_expr(*expr)
        }
        DependencyNode::Selection { body } => format!("select#{}", body.arr_idx()),
    }
}
