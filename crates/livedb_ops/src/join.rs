//! # Joins
//! Binds the sources of a body in order, producing every tuple of source rows
//! that satisfies the join conditions and the `where` filter.
//!
//! Each tuple is keyed by the keys of its source rows (a null-extended side
//! contributes `null`), and binds each source's row as a record (a
//! null-extended side is bound to [`Scalar::Undefined`]).
//!
//! A query source that references the aliases of the sources before it (a
//! lateral source) is re-evaluated for every partial tuple.

use crate::{
    errors::EvalError,
    eval::{Env, Evaluator, Frame, Rows},
};
use livedb_core::{
    analysis::correlation::is_correlated,
    plan::{ExprRef, JoinKind, Key, Plan, QueryBody, Source, SourceKind},
};
use livedb_store::{RowKey, Scalar};
use std::{borrow::Cow, collections::BTreeSet};

pub type Tuple = (RowKey, Env);

struct JoinStep {
    source: Key<Source>,
    join: Option<JoinKind>,
    condition: Option<ExprRef>,
    lateral: bool,
}

pub struct JoinOrder {
    body: Key<QueryBody>,
    steps: Vec<JoinStep>,
    filter: Option<ExprRef>,
}

struct Partial {
    keys: Vec<Option<RowKey>>,
    env: Env,
}

impl JoinOrder {
    pub fn new(lp: &Plan, body: Key<QueryBody>) -> Self {
        let b = lp.get_body(body);
        let steps = b
            .sources
            .iter()
            .map(|s| {
                let src = lp.get_source(*s);
                JoinStep {
                    source: *s,
                    join: src.join,
                    condition: b.join_condition(&src.alias),
                    lateral: matches!(src.kind, SourceKind::Query(sub) if is_correlated(lp, sub)),
                }
            })
            .collect();
        Self {
            body,
            steps,
            filter: b.filter,
        }
    }

    pub fn sources(&self) -> impl Iterator<Item = Key<Source>> + '_ {
        self.steps.iter().map(|s| s.source)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// All tuples of the body. If `fixed` is provided, the source at that
    /// position only binds the given rows (used to derive the tuples touching
    /// changed rows).
    pub fn enumerate(
        &self,
        ev: &Evaluator<'_>,
        outer: Option<&Frame<'_>>,
        fixed: Option<(usize, &Rows)>,
    ) -> Result<Vec<Tuple>, EvalError> {
        let mut partials = vec![Partial {
            keys: Vec::new(),
            env: Vec::new(),
        }];

        for (pos, step) in self.steps.iter().enumerate() {
            let shared = match fixed {
                Some((p, rows)) if p == pos => Some(Cow::Borrowed(rows)),
                _ if step.lateral => None,
                _ => Some(ev.inputs.rows(step.source, outer)?),
            };
            let mut matched_right = BTreeSet::new();
            let mut next = Vec::new();

            for partial in partials {
                let rows = match &shared {
                    Some(rows) => Cow::Borrowed(rows.as_ref()),
                    None => {
                        let frame = Frame::new(self.body, &partial.env, outer);
                        ev.inputs.rows(step.source, Some(&frame))?
                    }
                };
                let mut matched = false;
                for (key, row) in rows.iter() {
                    let mut env = partial.env.clone();
                    env.push(Scalar::Record(row.clone()));
                    if let Some(cond) = step.condition {
                        if !ev.truthy(cond, &Frame::new(self.body, &env, outer))? {
                            continue;
                        }
                    }
                    matched = true;
                    if step.join.is_some_and(JoinKind::keeps_right) {
                        matched_right.insert(key.clone());
                    }
                    let mut keys = partial.keys.clone();
                    keys.push(Some(key.clone()));
                    next.push(Partial { keys, env });
                }
                if !matched && step.join.is_some_and(JoinKind::keeps_left) {
                    let mut keys = partial.keys;
                    keys.push(None);
                    let mut env = partial.env;
                    env.push(Scalar::Undefined);
                    next.push(Partial { keys, env });
                }
            }

            if let (Some(rows), true) = (&shared, step.join.is_some_and(JoinKind::keeps_right)) {
                for (key, row) in rows.iter().filter(|(k, _)| !matched_right.contains(*k)) {
                    let mut keys = vec![None; pos];
                    keys.push(Some(key.clone()));
                    let mut env = vec![Scalar::Undefined; pos];
                    env.push(Scalar::Record(row.clone()));
                    next.push(Partial { keys, env });
                }
            }
            partials = next;
        }

        let mut tuples = Vec::with_capacity(partials.len());
        for Partial { keys, env } in partials {
            if let Some(filter) = self.filter {
                if !ev.truthy(filter, &Frame::new(self.body, &env, outer))? {
                    continue;
                }
            }
            tuples.push((RowKey::composite(keys), env));
        }
        Ok(tuples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::{FieldPolicy, Inputs};
    use livedb_core::{fields, plan::Key, JoinKind};
    use livedb_store::{row, MemCollection, Row};
    use rustc_hash::FxHashMap;

    struct Fixed(FxHashMap<String, Rows>, Plan);

    impl Inputs for Fixed {
        fn rows<'s>(&'s self, source: Key<Source>, _: Option<&Frame<'_>>) -> Result<Cow<'s, Rows>, EvalError> {
            let name = match self.1.get_source(source).kind {
                SourceKind::Collection(c) => &self.1.get_collection(c).name,
                SourceKind::Query(_) => unreachable!(),
            };
            Ok(Cow::Borrowed(&self.0[name]))
        }

        fn subquery(&self, _: Key<QueryBody>, _: &Frame<'_>) -> Result<Vec<Row>, EvalError> {
            Ok(Vec::new())
        }
    }

    fn rows(entries: impl IntoIterator<Item = (&'static str, Row)>) -> Rows {
        entries.into_iter().map(|(k, r)| (RowKey::from(k), r)).collect()
    }

    fn joined(kind: JoinKind) -> Vec<Tuple> {
        let mut lp = Plan::new();
        let people = lp.collection(MemCollection::new("Person"));
        let ages = lp.collection(MemCollection::new("PersonAge"));
        let query = lp
            .query(|q| {
                let p = q.from(people);
                q.join_with(ages, kind, |q, a| q.eq(a.get("person"), p.get("id")));
                q.select(fields! { id: p.get("id") });
            })
            .unwrap();
        let order = JoinOrder::new(&lp, query.body);
        let mut data = FxHashMap::default();
        data.insert(
            "Person".to_owned(),
            rows([("1", row! { "id" => "1" }), ("2", row! { "id" => "2" })]),
        );
        data.insert(
            "PersonAge".to_owned(),
            rows([
                ("a", row! { "person" => "1", "age" => 30 }),
                ("b", row! { "person" => "3", "age" => 50 }),
            ]),
        );
        let inputs = Fixed(data, lp);
        let ev = Evaluator::new(&inputs.1, &inputs, FieldPolicy::Undefined);
        order.enumerate(&ev, None, None).unwrap()
    }

    fn keys(tuples: &[Tuple]) -> Vec<Vec<Scalar>> {
        tuples.iter().map(|(k, _)| k.parts().to_vec()).collect()
    }

    #[test]
    fn inner_join_keeps_matches() {
        let tuples = joined(JoinKind::Inner);
        assert_eq!(keys(&tuples), vec![vec![Scalar::from("1"), Scalar::from("a")]]);
    }

    #[test]
    fn outer_joins_null_extend() {
        let left = joined(JoinKind::Left);
        assert_eq!(
            keys(&left),
            vec![
                vec![Scalar::from("1"), Scalar::from("a")],
                vec![Scalar::from("2"), Scalar::Null],
            ]
        );
        assert_eq!(left[1].1[1], Scalar::Undefined);

        let right = joined(JoinKind::Right);
        assert_eq!(
            keys(&right),
            vec![
                vec![Scalar::from("1"), Scalar::from("a")],
                vec![Scalar::Null, Scalar::from("b")],
            ]
        );

        assert_eq!(joined(JoinKind::Full).len(), 3);
    }
}
