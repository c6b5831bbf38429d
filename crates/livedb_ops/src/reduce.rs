//! # Incremental Aggregates
//! Each aggregate of a group keeps a running state that supports both
//! inserting and retracting a single input value, so that a change to one
//! tuple never requires rescanning the group.
//!
//! | aggregate  | state                         | empty group |
//! |------------|-------------------------------|-------------|
//! | `count()`  | tuple count                   | `0`         |
//! | `count(x)` | count of non-null `x`         | `0`         |
//! | `sum(x)`   | integer total, float multiset | `null`      |
//! | `avg(x)`   | as sum, with a count          | `null`      |
//! | `min/max`  | multiset of values            | `null`      |
//!
//! Non-numeric values are ignored by `sum` and `avg`, nullish values by all
//! aggregates.

use livedb_core::plan::AggFunc;
use livedb_store::Scalar;
use std::collections::BTreeMap;

/// A retraction of a value that the state does not contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotInserted;

/// Integers are totalled exactly. Floats are kept as a multiset and summed
/// in ascending order, so a total never depends on the order in which its
/// values were inserted and retracted.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Total {
    ints: i128,
    floats: BTreeMap<Scalar, usize>,
    n_floats: usize,
    n: usize,
}

impl Total {
    fn insert(&mut self, v: &Scalar) {
        match v {
            Scalar::Int(i) => self.ints += *i as i128,
            Scalar::Float(_) => {
                *self.floats.entry(v.clone()).or_default() += 1;
                self.n_floats += 1;
            }
            _ => return,
        }
        self.n += 1;
    }

    fn retract(&mut self, v: &Scalar) -> Result<(), NotInserted> {
        match v {
            Scalar::Int(_) if self.n == self.n_floats => return Err(NotInserted),
            Scalar::Int(i) => self.ints -= *i as i128,
            Scalar::Float(_) => {
                let count = self.floats.get_mut(v).ok_or(NotInserted)?;
                *count -= 1;
                if *count == 0 {
                    self.floats.remove(v);
                }
                self.n_floats -= 1;
            }
            _ => return Ok(()),
        }
        self.n -= 1;
        Ok(())
    }

    fn float_total(&self) -> f64 {
        self.floats
            .iter()
            .fold(self.ints as f64, |acc, (v, n)| match v {
                Scalar::Float(f) => (0..*n).fold(acc, |acc, _| acc + f),
                _ => acc,
            })
    }

    fn sum(&self) -> Scalar {
        if self.n == 0 {
            Scalar::Null
        } else if self.n_floats == 0 {
            i64::try_from(self.ints).map_or(Scalar::Float(self.ints as f64), Scalar::Int)
        } else {
            Scalar::Float(self.float_total())
        }
    }

    fn avg(&self) -> Scalar {
        if self.n == 0 {
            Scalar::Null
        } else {
            Scalar::Float(self.float_total() / self.n as f64)
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum AggState {
    Count { all: bool, n: usize },
    Sum(Total),
    Avg(Total),
    Extreme { values: BTreeMap<Scalar, usize>, max: bool },
}

impl AggState {
    /// The empty state for `func`. `args` is the number of arguments, as
    /// `count()` counts tuples rather than values.
    pub fn new(func: AggFunc, args: usize) -> Self {
        match func {
            AggFunc::Count => AggState::Count { all: args == 0, n: 0 },
            AggFunc::Sum => AggState::Sum(Total::default()),
            AggFunc::Avg => AggState::Avg(Total::default()),
            AggFunc::Min => AggState::Extreme {
                values: BTreeMap::new(),
                max: false,
            },
            AggFunc::Max => AggState::Extreme {
                values: BTreeMap::new(),
                max: true,
            },
        }
    }

    pub fn insert(&mut self, v: &Scalar) {
        match self {
            AggState::Count { all, n } => {
                if *all || !v.is_nullish() {
                    *n += 1
                }
            }
            AggState::Sum(total) | AggState::Avg(total) => total.insert(v),
            AggState::Extreme { values, .. } => {
                if !v.is_nullish() {
                    *values.entry(v.clone()).or_default() += 1;
                }
            }
        }
    }

    pub fn retract(&mut self, v: &Scalar) -> Result<(), NotInserted> {
        match self {
            AggState::Count { all, n } => {
                if *all || !v.is_nullish() {
                    *n = n.checked_sub(1).ok_or(NotInserted)?;
                }
                Ok(())
            }
            AggState::Sum(total) | AggState::Avg(total) => total.retract(v),
            AggState::Extreme { values, .. } => {
                if v.is_nullish() {
                    return Ok(());
                }
                let count = values.get_mut(v).ok_or(NotInserted)?;
                *count -= 1;
                if *count == 0 {
                    values.remove(v);
                }
                Ok(())
            }
        }
    }

    pub fn value(&self) -> Scalar {
        match self {
            AggState::Count { n, .. } => Scalar::Int(*n as i64),
            AggState::Sum(total) => total.sum(),
            AggState::Avg(total) => total.avg(),
            AggState::Extreme { values, max: true } => {
                values.keys().next_back().cloned().unwrap_or(Scalar::Null)
            }
            AggState::Extreme { values, max: false } => {
                values.keys().next().cloned().unwrap_or(Scalar::Null)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fold(func: AggFunc, values: &[Scalar]) -> AggState {
        let mut state = AggState::new(func, 1);
        for v in values {
            state.insert(v);
        }
        state
    }

    #[test]
    fn retraction_restores_count_and_sum() {
        let values = [Scalar::Int(1), Scalar::Int(2), Scalar::Int(3)];
        let mut count = fold(AggFunc::Count, &values);
        let mut sum = fold(AggFunc::Sum, &values);
        count.retract(&Scalar::Int(2)).unwrap();
        sum.retract(&Scalar::Int(2)).unwrap();
        assert_eq!(count.value(), Scalar::Int(2));
        assert_eq!(sum.value(), Scalar::Int(4));
    }

    #[test]
    fn empty_groups() {
        assert_eq!(AggState::new(AggFunc::Count, 0).value(), Scalar::Int(0));
        assert_eq!(AggState::new(AggFunc::Sum, 1).value(), Scalar::Null);
        assert_eq!(AggState::new(AggFunc::Avg, 1).value(), Scalar::Null);
        assert_eq!(AggState::new(AggFunc::Max, 1).value(), Scalar::Null);
    }

    #[test]
    fn nullish_and_non_numeric_values_are_skipped() {
        let values = [Scalar::Int(4), Scalar::Null, Scalar::Undefined, Scalar::from("x"), Scalar::Float(1.5)];
        assert_eq!(fold(AggFunc::Count, &values).value(), Scalar::Int(3));
        assert_eq!(fold(AggFunc::Sum, &values).value(), Scalar::Float(5.5));
        assert_eq!(fold(AggFunc::Avg, &values).value(), Scalar::Float(2.75));
        assert_eq!(fold(AggFunc::Min, &values).value(), Scalar::Float(1.5));
        assert_eq!(fold(AggFunc::Max, &values).value(), Scalar::from("x"));

        let mut tuples = AggState::new(AggFunc::Count, 0);
        tuples.insert(&Scalar::Undefined);
        assert_eq!(tuples.value(), Scalar::Int(1));
    }

    #[test]
    fn extremes_survive_retracting_duplicates() {
        let mut max = fold(AggFunc::Max, &[Scalar::Int(5), Scalar::Int(5), Scalar::Int(1)]);
        max.retract(&Scalar::Int(5)).unwrap();
        assert_eq!(max.value(), Scalar::Int(5));
        max.retract(&Scalar::Int(5)).unwrap();
        assert_eq!(max.value(), Scalar::Int(1));
    }

    #[test]
    fn retracting_unknown_values_is_detected() {
        let mut count = AggState::new(AggFunc::Count, 0);
        assert_eq!(count.retract(&Scalar::Null), Err(NotInserted));
        let mut min = fold(AggFunc::Min, &[Scalar::Int(1)]);
        assert_eq!(min.retract(&Scalar::Int(2)), Err(NotInserted));
        let mut sum = fold(AggFunc::Sum, &[Scalar::Int(1)]);
        assert_eq!(sum.retract(&Scalar::Float(1.0)), Err(NotInserted));
    }

    #[test]
    fn float_totals_do_not_drift_on_retraction() {
        let mut sum = fold(AggFunc::Sum, &[Scalar::Float(0.1), Scalar::Float(0.2)]);
        let mut avg = fold(AggFunc::Avg, &[Scalar::Float(0.1), Scalar::Float(0.2)]);
        sum.retract(&Scalar::Float(0.1)).unwrap();
        avg.retract(&Scalar::Float(0.1)).unwrap();
        assert_eq!(sum.value(), Scalar::Float(0.2));
        assert_eq!(avg.value(), Scalar::Float(0.2));

        let mut total = fold(AggFunc::Sum, &[Scalar::Float(0.3), Scalar::Int(1), Scalar::Float(0.1)]);
        total.insert(&Scalar::Float(0.2));
        total.retract(&Scalar::Int(1)).unwrap();
        assert_eq!(
            total.value(),
            fold(AggFunc::Sum, &[Scalar::Float(0.2), Scalar::Float(0.1), Scalar::Float(0.3)]).value()
        );
    }

    proptest! {
        #[test]
        fn retraction_matches_refolding(
            values in prop::collection::vec(
                prop_oneof![
                    (-50i64..50).prop_map(Scalar::Int),
                    (-50i64..50).prop_map(|i| Scalar::Float(i as f64 / 10.0)),
                ],
                0..40,
            ),
            removed in prop::collection::vec(any::<prop::sample::Index>(), 0..20),
        ) {
            let mut remaining = values.clone();
            let mut removals = Vec::new();
            for idx in removed {
                if remaining.is_empty() {
                    break;
                }
                removals.push(remaining.remove(idx.index(remaining.len())));
            }
            for func in AggFunc::ALL {
                let mut state = fold(*func, &values);
                for v in &removals {
                    prop_assert!(state.retract(v).is_ok());
                }
                prop_assert_eq!(state.value(), fold(*func, &remaining).value());
            }
        }
    }
}
