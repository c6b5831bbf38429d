//! ## Correlation
//! A body is correlated when it references aliases it does not bind itself,
//! which must then be bound by an enclosing query. Correlated bodies cannot
//! be maintained on their own, they are re-evaluated for each row of the
//! enclosing query.
//!
//! INV: only used on plans that have compiled to an acyclic dependency graph.

use crate::plan::{self, Expression, Key, Plan, QueryBody, SourceKind};

pub trait FreeAliases {
    /// Add the aliases referenced, but not bound, within self.
    fn free_aliases(&self, lp: &Plan, out: &mut Vec<String>);
}

impl FreeAliases for Expression {
    fn free_aliases(&self, lp: &Plan, out: &mut Vec<String>) {
        match self {
            Expression::Reference { path } => push_unique(out, &path[0]),
            Expression::Subquery(body) => lp.get_body(*body).free_aliases(lp, out),
            e => {
                for c in e.children() {
                    lp.get_expr(*c).free_aliases(lp, out)
                }
            }
        }
    }
}

impl FreeAliases for QueryBody {
    fn free_aliases(&self, lp: &Plan, out: &mut Vec<String>) {
        let mut inner = Vec::new();
        for expr in self.expressions() {
            lp.get_expr(expr).free_aliases(lp, &mut inner);
        }
        for source in &self.sources {
            if let SourceKind::Query(sub) = lp.get_source(*source).kind {
                lp.get_body(sub).free_aliases(lp, &mut inner);
            }
        }
        for alias in inner {
            let bound = self
                .sources
                .iter()
                .any(|s| lp.get_source(*s).alias == alias);
            if !bound {
                push_unique(out, &alias);
            }
        }
    }
}

fn push_unique(out: &mut Vec<String>, alias: &str) {
    if !out.iter().any(|a| a == alias) {
        out.push(alias.to_owned())
    }
}

pub fn is_correlated(lp: &Plan, body: Key<QueryBody>) -> bool {
    let mut free = Vec::new();
    lp.get_body(body).free_aliases(lp, &mut free);
    !free.is_empty()
}

/// Does the body contain scalar subqueries, or read from correlated
/// subqueries, so that it must be recomputed rather than maintained by deltas.
pub fn has_nested_evaluation(lp: &Plan, body: Key<QueryBody>) -> bool {
    let b = lp.get_body(body);
    b.expressions().into_iter().any(|e| lp.contains_subquery(e))
        || b.sources.iter().any(|s| match lp.get_source(*s).kind {
            SourceKind::Query(sub) => is_correlated(lp, sub),
            SourceKind::Collection(_) => false,
        })
}

/// The body contains only inner joins.
pub fn inner_joins_only(lp: &Plan, body: Key<QueryBody>) -> bool {
    lp.get_body(body)
        .sources
        .iter()
        .all(|s| matches!(lp.get_source(*s).join, None | Some(plan::JoinKind::Inner)))
}
