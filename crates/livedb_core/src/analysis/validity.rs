//! ## Query Validity
//! Checks on a built query that do not depend on alias resolution:
//! - Aggregates only in the projection and `having`, never nested.
//! - `having` only with `groupBy`.
//! - Function arities.
//!
//! Every body reachable from the query (through sources and subquery
//! expressions) is checked.

use crate::{
    errors::{BuildError, Clause},
    plan::{ExprRef, Expression, Idx, Key, Plan, Query, QueryBody, SourceKind},
};
use rustc_hash::FxHashSet;

pub fn validate(lp: &Plan, query: Query) -> Result<(), BuildError> {
    let mut seen = FxHashSet::default();
    validate_body(lp, query.body, &mut seen)
}

fn validate_body(lp: &Plan, body: Key<QueryBody>, seen: &mut FxHashSet<Idx<QueryBody>>) -> Result<(), BuildError> {
    if !seen.insert(Idx::new(body)) {
        return Ok(());
    }
    let b = lp.get_body(body);
    if b.having.is_some() && b.group_by.is_none() {
        return Err(BuildError::HavingWithoutGroupBy);
    }

    let mut clauses: Vec<(ExprRef, Clause)> = b
        .selection_exprs()
        .into_iter()
        .map(|e| (e, Clause::Select))
        .collect();
    clauses.extend(b.join_conditions.iter().map(|(_, e)| (*e, Clause::Join)));
    clauses.extend(b.filter.map(|e| (e, Clause::Where)));
    clauses.extend(b.group_by.iter().flatten().map(|e| (*e, Clause::GroupBy)));
    clauses.extend(b.having.map(|e| (e, Clause::Having)));
    clauses.extend(b.order_by.iter().flatten().map(|o| (o.expr, Clause::OrderBy)));

    for (expr, clause) in clauses {
        check_expr(lp, expr, clause, None, seen)?;
    }

    for source in &b.sources {
        if let SourceKind::Query(sub) = lp.get_source(*source).kind {
            validate_body(lp, sub, seen)?;
        }
    }
    Ok(())
}

/// `within` is the enclosing aggregate, if any.
fn check_expr(
    lp: &Plan,
    expr: ExprRef,
    clause: Clause,
    within: Option<ExprRef>,
    seen: &mut FxHashSet<Idx<QueryBody>>,
) -> Result<(), BuildError> {
    match lp.get_expr(expr) {
        Expression::Literal(_) | Expression::Reference { .. } => Ok(()),
        Expression::Subquery(body) => validate_body(lp, *body, seen),
        Expression::Call { func, args } => {
            if !func.arity().accepts(args.len()) {
                return Err(BuildError::InvalidArity {
                    func: func.name(),
                    expected: func.arity().to_string(),
                    found: args.len(),
                });
            }
            args.iter()
                .try_for_each(|a| check_expr(lp, *a, clause, within, seen))
        }
        Expression::Aggregate { func, args } => {
            if within.is_some() {
                return Err(BuildError::NestedAggregate {
                    aggregate: lp.describe_expr(expr),
                });
            }
            if !matches!(clause, Clause::Select | Clause::Having) {
                return Err(BuildError::InvalidAggregatePlacement {
                    aggregate: lp.describe_expr(expr),
                    clause,
                });
            }
            if !func.arity().accepts(args.len()) {
                return Err(BuildError::InvalidArity {
                    func: func.name(),
                    expected: func.arity().to_string(),
                    found: args.len(),
                });
            }
            args.iter()
                .try_for_each(|a| check_expr(lp, *a, clause, Some(expr), seen))
        }
    }
}
