//! ## Condition Pushdown
//! Conditions that reference only a single source can filter that source's
//! rows as they arrive, before any join is evaluated. This is only sound when
//! the filtered rows could never appear null-extended in the output:
//! - `where` conjuncts, when the body has only inner joins.
//! - A joined source's own join condition conjuncts, for inner and left joins.

use super::correlation::inner_joins_only;
use crate::plan::{ExprRef, JoinKind, Key, Plan, QueryBody, Source};

/// All conjuncts of the body's join conditions and `where` that reference
/// `alias` (possibly among others).
pub fn conditions_referencing(lp: &Plan, body: Key<QueryBody>, alias: &str) -> Vec<ExprRef> {
    let b = lp.get_body(body);
    b.join_conditions
        .iter()
        .map(|(_, e)| *e)
        .chain(b.filter)
        .flat_map(|e| lp.conjuncts(e))
        .filter(|c| {
            let mut refs = Vec::new();
            lp.referenced_aliases(*c, &mut refs);
            refs.iter().any(|a| a == alias)
        })
        .collect()
}

/// Conjuncts that can be applied directly to the rows of `source`.
pub fn pushable_conditions(lp: &Plan, body: Key<QueryBody>, source: Key<Source>) -> Vec<ExprRef> {
    let b = lp.get_body(body);
    let src = lp.get_source(source);
    let only_this = |c: &ExprRef| {
        let mut refs = Vec::new();
        lp.referenced_aliases(*c, &mut refs);
        refs.len() == 1
            && refs[0] == src.alias
            && !lp.contains_aggregate(*c)
            && !lp.contains_subquery(*c)
    };

    let mut pushed = Vec::new();
    if inner_joins_only(lp, body) {
        pushed.extend(b.filter.into_iter().flat_map(|e| lp.conjuncts(e)).filter(only_this));
    }
    if matches!(src.join, Some(JoinKind::Inner | JoinKind::Left)) {
        pushed.extend(
            b.join_condition(&src.alias)
                .into_iter()
                .flat_map(|e| lp.conjuncts(e))
                .filter(only_this),
        );
    }
    pushed
}
