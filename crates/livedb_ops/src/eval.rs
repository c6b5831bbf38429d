//! # Expression Evaluation
//! Expressions are evaluated against a [`Frame`]: the source rows bound for
//! one tuple of a body, the frames of enclosing bodies (for correlated
//! references), and, when projecting a group, the group's aggregate values.
//!
//! ## Missing Values
//! Fields absent from a row evaluate according to the [`FieldPolicy`]. With
//! [`FieldPolicy::Undefined`] they (and type errors in functions) become
//! [`Scalar::Undefined`], which is falsy and dropped from output rows.

use crate::errors::EvalError;
use itertools::Itertools;
use livedb_core::plan::{ExprRef, Expression, Idx, Key, Plan, QueryBody, ScalarFunc, Source};
use livedb_store::{Row, RowKey, Scalar};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::{borrow::Cow, collections::BTreeMap};

pub type Rows = BTreeMap<RowKey, Row>;

/// Values bound to each source of a body, by position. Unbound and null
/// extended sources are [`Scalar::Undefined`].
pub type Env = Vec<Scalar>;

pub type AggValues = FxHashMap<Idx<Expression>, Scalar>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldPolicy {
    #[default]
    Undefined,
    Strict,
}

#[derive(Clone, Copy)]
pub struct Frame<'f> {
    pub body: Key<QueryBody>,
    pub env: &'f [Scalar],
    pub outer: Option<&'f Frame<'f>>,
    pub aggregates: Option<&'f AggValues>,
}

impl<'f> Frame<'f> {
    pub fn new(body: Key<QueryBody>, env: &'f [Scalar], outer: Option<&'f Frame<'f>>) -> Self {
        Self {
            body,
            env,
            outer,
            aggregates: None,
        }
    }

    pub fn with_aggregates(self, aggregates: &'f AggValues) -> Self {
        Self {
            aggregates: Some(aggregates),
            ..self
        }
    }
}

/// Access to the current rows of sources and results of nested bodies.
pub trait Inputs {
    /// The rows of a source. For correlated query sources, evaluated within
    /// `outer`.
    fn rows<'s>(&'s self, source: Key<Source>, outer: Option<&Frame<'_>>) -> Result<Cow<'s, Rows>, EvalError>;

    /// The output rows of a body, in output order.
    fn subquery(&self, body: Key<QueryBody>, outer: &Frame<'_>) -> Result<Vec<Row>, EvalError>;
}

pub struct Evaluator<'a> {
    pub lp: &'a Plan,
    pub inputs: &'a dyn Inputs,
    pub policy: FieldPolicy,
}

impl<'a> Evaluator<'a> {
    pub fn new(lp: &'a Plan, inputs: &'a dyn Inputs, policy: FieldPolicy) -> Self {
        Self { lp, inputs, policy }
    }

    pub fn truthy(&self, expr: ExprRef, frame: &Frame<'_>) -> Result<bool, EvalError> {
        Ok(self.eval(expr, frame)?.truthy())
    }

    pub fn eval(&self, expr: ExprRef, frame: &Frame<'_>) -> Result<Scalar, EvalError> {
        match self.lp.get_expr(expr) {
            Expression::Literal(v) => Ok(v.clone()),
            Expression::Reference { path } => self.lookup(path, frame),
            Expression::Aggregate { .. } => frame
                .aggregates
                .and_then(|aggs| aggs.get(&Idx::new(expr)))
                .cloned()
                .ok_or_else(|| EvalError::MissingAggregate(self.lp.describe_expr(expr))),
            Expression::Subquery(body) => {
                let rows = self.inputs.subquery(*body, frame)?;
                Ok(match rows.into_iter().next() {
                    None => Scalar::Null,
                    Some(row) if row.len() == 1 => row.into_iter().next().map_or(Scalar::Null, |(_, v)| v),
                    Some(row) => Scalar::Record(row),
                })
            }
            Expression::Call { func, args } => self.call(*func, args, frame),
        }
    }

    fn lookup(&self, path: &[String], frame: &Frame<'_>) -> Result<Scalar, EvalError> {
        let alias = &path[0];
        let mut current = Some(frame);
        let bound = loop {
            let Some(f) = current else {
                return Err(EvalError::UnboundAlias(alias.clone()));
            };
            let body = self.lp.get_body(f.body);
            if let Some(pos) = body
                .sources
                .iter()
                .position(|s| self.lp.get_source(*s).alias == *alias)
            {
                break f.env.get(pos).cloned().unwrap_or(Scalar::Undefined);
            }
            current = f.outer;
        };

        let mut value = bound;
        for (depth, field) in path[1..].iter().enumerate() {
            value = match value {
                Scalar::Record(mut row) => match row.remove(field) {
                    Some(v) => v,
                    None => return self.missing(path, depth + 2),
                },
                // null extended sources and null fields have no fields
                Scalar::Undefined | Scalar::Null => return Ok(Scalar::Undefined),
                _ => return self.missing(path, depth + 2),
            };
        }
        Ok(value)
    }

    fn missing(&self, path: &[String], upto: usize) -> Result<Scalar, EvalError> {
        let err = EvalError::FieldNotFound {
            alias: path[0].clone(),
            path: path[..upto].join("."),
        };
        match self.policy {
            FieldPolicy::Undefined => {
                log::trace!("{err}, using undefined");
                Ok(Scalar::Undefined)
            }
            FieldPolicy::Strict => Err(err),
        }
    }

    fn mismatch(&self, func: ScalarFunc, found: &[&Scalar]) -> Result<Scalar, EvalError> {
        let err = EvalError::TypeMismatch {
            func: func.name(),
            found: found.iter().map(|v| v.type_name()).join(", "),
        };
        match self.policy {
            FieldPolicy::Undefined => {
                log::trace!("{err}, using undefined");
                Ok(Scalar::Undefined)
            }
            FieldPolicy::Strict => Err(err),
        }
    }

    fn call(&self, func: ScalarFunc, args: &[ExprRef], frame: &Frame<'_>) -> Result<Scalar, EvalError> {
        match func {
            ScalarFunc::And => {
                for a in args {
                    if !self.truthy(*a, frame)? {
                        return Ok(Scalar::Bool(false));
                    }
                }
                Ok(Scalar::Bool(true))
            }
            ScalarFunc::Or => {
                for a in args {
                    if self.truthy(*a, frame)? {
                        return Ok(Scalar::Bool(true));
                    }
                }
                Ok(Scalar::Bool(false))
            }
            ScalarFunc::Coalesce => {
                for a in args {
                    let v = self.eval(*a, frame)?;
                    if !v.is_nullish() {
                        return Ok(v);
                    }
                }
                Ok(Scalar::Null)
            }
            ScalarFunc::Concat => {
                let mut out = String::new();
                for a in args {
                    match self.eval(*a, frame)? {
                        Scalar::Undefined | Scalar::Null => (),
                        v => out.push_str(&v.to_string()),
                    }
                }
                Ok(Scalar::Str(out))
            }
            _ => {
                let values = args
                    .iter()
                    .map(|a| self.eval(*a, frame))
                    .collect::<Result<Vec<_>, _>>()?;
                self.apply(func, &values)
            }
        }
    }

    /// Strict functions of fixed arity.
    /// INV: arity was checked when the query was built.
    fn apply(&self, func: ScalarFunc, values: &[Scalar]) -> Result<Scalar, EvalError> {
        use ScalarFunc::*;
        match (func, values) {
            (Eq, [a, b]) => Ok(Scalar::Bool(a.loose_eq(b))),
            (Neq, [a, b]) => Ok(Scalar::Bool(!a.loose_eq(b))),
            (Lt | Lte | Gt | Gte, [a, b]) => {
                if a.is_nullish() || b.is_nullish() {
                    return Ok(Scalar::Bool(false));
                }
                let comparable = (a.is_number() && b.is_number())
                    || matches!((a, b), (Scalar::Str(_), Scalar::Str(_)) | (Scalar::Bool(_), Scalar::Bool(_)));
                if !comparable {
                    return self.mismatch(func, &[a, b]);
                }
                let ord = match (a.as_f64(), b.as_f64()) {
                    (Some(x), Some(y)) => x.total_cmp(&y),
                    _ => a.cmp(b),
                };
                Ok(Scalar::Bool(match func {
                    Lt => ord.is_lt(),
                    Lte => ord.is_le(),
                    Gt => ord.is_gt(),
                    _ => ord.is_ge(),
                }))
            }
            (Not, [a]) => Ok(Scalar::Bool(!a.truthy())),
            (IsNull, [a]) => Ok(Scalar::Bool(a.is_nullish())),
            (Length, [a]) => match a {
                Scalar::Str(s) => Ok(Scalar::Int(s.chars().count() as i64)),
                Scalar::Record(r) => Ok(Scalar::Int(r.len() as i64)),
                a if a.is_nullish() => Ok(Scalar::Undefined),
                a => self.mismatch(func, &[a]),
            },
            (Upper | Lower, [a]) => match a {
                Scalar::Str(s) if func == Upper => Ok(Scalar::Str(s.to_uppercase())),
                Scalar::Str(s) => Ok(Scalar::Str(s.to_lowercase())),
                a if a.is_nullish() => Ok(Scalar::Undefined),
                a => self.mismatch(func, &[a]),
            },
            (Add | Sub | Mul | Div, [a, b]) => {
                if a.is_nullish() || b.is_nullish() {
                    return Ok(Scalar::Null);
                }
                match arithmetic(func, a, b) {
                    Some(v) => Ok(v),
                    None => self.mismatch(func, &[a, b]),
                }
            }
            (func, values) => self.mismatch(func, &values.iter().collect::<Vec<_>>()),
        }
    }
}

/// Integer arithmetic where exact, falling back to floats. Division by zero
/// is null.
fn arithmetic(func: ScalarFunc, a: &Scalar, b: &Scalar) -> Option<Scalar> {
    use ScalarFunc::*;
    if let (Scalar::Int(x), Scalar::Int(y)) = (a, b) {
        let exact = match func {
            Add => x.checked_add(*y),
            Sub => x.checked_sub(*y),
            Mul => x.checked_mul(*y),
            Div if *y == 0 => return Some(Scalar::Null),
            Div if x.checked_rem(*y) == Some(0) => x.checked_div(*y),
            _ => None,
        };
        if let Some(v) = exact {
            return Some(Scalar::Int(v));
        }
    }
    let (x, y) = (a.as_f64()?, b.as_f64()?);
    Some(match func {
        Add => Scalar::Float(x + y),
        Sub => Scalar::Float(x - y),
        Mul => Scalar::Float(x * y),
        _ if y == 0.0 => Scalar::Null,
        _ => Scalar::Float(x / y),
    })
}
