//! # Row Values
//! Every field in a row is a [`Scalar`]. Scalars are totally ordered and
//! hashable so that they can be used directly as parts of group, distinct and
//! tuple keys.
//!
//! ## Ordering
//! Variants are ranked `Undefined < Null < Bool < number < Str < Record`.
//! Integers and floats compare numerically with each other, an integer sorting
//! before a float of the same numeric value (so `Int(1) != Float(1.0)`, but
//! they are adjacent).
//!
//! Group and distinct keys use this equality, so `Int(1)` and `Float(1.0)`
//! form separate groups. Comparisons in expressions (`eq`, join conditions)
//! use [`Scalar::loose_eq`], under which they are equal.

use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    collections::BTreeMap,
    fmt::{self, Display},
    hash::{Hash, Hasher},
};

/// A single field value.
/// - [`Scalar::Undefined`] is a missing value (a field absent from a row, or
///   the fields of a null-extended join side). It is never stored in output
///   rows.
/// - [`Scalar::Null`] is an explicit null.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Scalar {
    Undefined,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Record(Row),
}

impl Scalar {
    fn rank(&self) -> u8 {
        match self {
            Scalar::Undefined => 0,
            Scalar::Null => 1,
            Scalar::Bool(_) => 2,
            Scalar::Int(_) | Scalar::Float(_) => 3,
            Scalar::Str(_) => 4,
            Scalar::Record(_) => 5,
        }
    }

    /// Truthiness as used by `where`, `having` and join conditions.
    pub fn truthy(&self) -> bool {
        match self {
            Scalar::Undefined | Scalar::Null => false,
            Scalar::Bool(b) => *b,
            Scalar::Int(i) => *i != 0,
            Scalar::Float(f) => *f != 0.0 && !f.is_nan(),
            Scalar::Str(s) => !s.is_empty(),
            Scalar::Record(_) => true,
        }
    }

    /// Either [`Scalar::Null`] or [`Scalar::Undefined`].
    pub fn is_nullish(&self) -> bool {
        matches!(self, Scalar::Undefined | Scalar::Null)
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Scalar::Int(_) | Scalar::Float(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(i) => Some(*i as f64),
            Scalar::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Row> {
        match self {
            Scalar::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Equality across numeric representations (`1 == 1.0`), otherwise the
    /// same as `==`.
    pub fn loose_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Scalar::Int(a), Scalar::Float(b)) | (Scalar::Float(b), Scalar::Int(a)) => {
                (*a as f64) == *b
            }
            _ => self == other,
        }
    }

    /// The name of the variant, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Scalar::Undefined => "undefined",
            Scalar::Null => "null",
            Scalar::Bool(_) => "bool",
            Scalar::Int(_) => "int",
            Scalar::Float(_) => "float",
            Scalar::Str(_) => "string",
            Scalar::Record(_) => "record",
        }
    }
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for Scalar {}

impl PartialOrd for Scalar {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scalar {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Scalar::Bool(a), Scalar::Bool(b)) => a.cmp(b),
            (Scalar::Int(a), Scalar::Int(b)) => a.cmp(b),
            (Scalar::Float(a), Scalar::Float(b)) => a.total_cmp(b),
            (Scalar::Int(a), Scalar::Float(b)) => (*a as f64).total_cmp(b).then(Ordering::Less),
            (Scalar::Float(a), Scalar::Int(b)) => a.total_cmp(&(*b as f64)).then(Ordering::Greater),
            (Scalar::Str(a), Scalar::Str(b)) => a.cmp(b),
            (Scalar::Record(a), Scalar::Record(b)) => a.cmp(b),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

impl Hash for Scalar {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Scalar::Undefined | Scalar::Null => (),
            Scalar::Bool(b) => b.hash(state),
            Scalar::Int(i) => i.hash(state),
            Scalar::Float(f) => f.to_bits().hash(state),
            Scalar::Str(s) => s.hash(state),
            Scalar::Record(r) => r.hash(state),
        }
    }
}

impl Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Undefined => write!(f, "undefined"),
            Scalar::Null => write!(f, "null"),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Float(x) => write!(f, "{x}"),
            Scalar::Str(s) => write!(f, "{s}"),
            Scalar::Record(r) => write!(f, "{r}"),
        }
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}
impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Scalar::Int(i)
    }
}
impl From<i32> for Scalar {
    fn from(i: i32) -> Self {
        Scalar::Int(i.into())
    }
}
impl From<f64> for Scalar {
    fn from(f: f64) -> Self {
        Scalar::Float(f)
    }
}
impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Str(s.to_owned())
    }
}
impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Str(s)
    }
}
impl From<Row> for Scalar {
    fn from(r: Row) -> Self {
        Scalar::Record(r)
    }
}
impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(v: Option<T>) -> Self {
        v.map_or(Scalar::Null, Into::into)
    }
}

impl From<serde_json::Value> for Scalar {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Scalar::Null,
            Value::Bool(b) => Scalar::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Scalar::Int(i),
                None => Scalar::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Scalar::Str(s),
            Value::Array(items) => Scalar::Record(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| (i.to_string(), Scalar::from(v)))
                    .collect(),
            ),
            Value::Object(fields) => Scalar::Record(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, Scalar::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&Scalar> for serde_json::Value {
    fn from(value: &Scalar) -> Self {
        use serde_json::Value;
        match value {
            Scalar::Undefined | Scalar::Null => Value::Null,
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::Int(i) => Value::from(*i),
            Scalar::Float(f) => serde_json::Number::from_f64(*f).map_or(Value::Null, Value::Number),
            Scalar::Str(s) => Value::String(s.clone()),
            Scalar::Record(r) => r.into(),
        }
    }
}

/// A record of named fields, ordered by field name.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    fields: BTreeMap<String, Scalar>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Missing fields are [`None`], not [`Scalar::Undefined`].
    pub fn get(&self, field: &str) -> Option<&Scalar> {
        self.fields.get(field)
    }

    /// Sets a field, dropping it if the value is [`Scalar::Undefined`].
    pub fn insert(&mut self, field: impl Into<String>, value: Scalar) {
        let field = field.into();
        if matches!(value, Scalar::Undefined) {
            self.fields.remove(&field);
        } else {
            self.fields.insert(field, value);
        }
    }

    pub fn remove(&mut self, field: &str) -> Option<Scalar> {
        self.fields.remove(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Scalar)> {
        self.fields.iter()
    }

    pub fn values(&self) -> impl Iterator<Item = &Scalar> {
        self.fields.values()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Copies every field of `other` into this row, overwriting duplicates.
    pub fn extend_from(&mut self, other: &Row) {
        for (k, v) in other.iter() {
            self.insert(k.clone(), v.clone());
        }
    }

    /// Parse a row from a JSON object.
    pub fn from_json(value: serde_json::Value) -> Option<Self> {
        match Scalar::from(value) {
            Scalar::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        self.into()
    }
}

impl<K: Into<String>> FromIterator<(K, Scalar)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, Scalar)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (k, v) in iter {
            row.insert(k, v);
        }
        row
    }
}

impl IntoIterator for Row {
    type Item = (String, Scalar);
    type IntoIter = std::collections::btree_map::IntoIter<String, Scalar>;
    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl From<&Row> for serde_json::Value {
    fn from(row: &Row) -> Self {
        serde_json::Value::Object(
            row.iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::from(v)))
                .collect(),
        )
    }
}

impl Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match v {
                Scalar::Str(s) => write!(f, "{k}: {s:?}")?,
                v => write!(f, "{k}: {v}")?,
            }
        }
        write!(f, "}}")
    }
}

/// Build a [`Row`] from `field => value` pairs.
/// ```
/// # use livedb_store::{row, Scalar};
/// let r = row! { "id" => "1", "age" => 40 };
/// assert_eq!(r.get("age"), Some(&Scalar::Int(40)));
/// ```
#[macro_export]
macro_rules! row {
    ( $( $field:expr => $value:expr ),* $(,)? ) => {
        <$crate::Row as ::std::iter::FromIterator<(::std::string::String, $crate::Scalar)>>::from_iter([
            $( (::std::string::String::from($field), $crate::Scalar::from($value)) ),*
        ])
    };
}
