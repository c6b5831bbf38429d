//! # Reference Proxies
//! A [`RefProxy`] stands for a source alias (the whole row) or a field path
//! below it. Proxies are values that record a path; they only become
//! [`Expression::Reference`](crate::plan::Expression::Reference) objects when
//! used as an operand, and the same path through the same query always
//! becomes the same expression.

use crate::plan::{ExprRef, Key, Query, QueryBody};
use livedb_store::Scalar;

#[derive(Clone, Debug, PartialEq)]
pub struct RefProxy {
    pub(crate) body: Key<QueryBody>,
    pub(crate) path: Vec<String>,
}

impl RefProxy {
    pub(crate) fn root(body: Key<QueryBody>, alias: String) -> Self {
        Self {
            body,
            path: vec![alias],
        }
    }

    /// A proxy for `field` below this one.
    pub fn get(&self, field: &str) -> RefProxy {
        let mut path = self.path.clone();
        path.push(field.to_owned());
        RefProxy {
            body: self.body,
            path,
        }
    }

    /// Follow a dotted path, `a.get_path("x.y")` is `a.get("x").get("y")`.
    pub fn get_path(&self, dotted: &str) -> RefProxy {
        dotted.split('.').fold(self.clone(), |p, f| p.get(f))
    }

    pub fn alias(&self) -> &str {
        &self.path[0]
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Refers to a whole source row, rather than a field.
    pub fn is_root(&self) -> bool {
        self.path.len() == 1
    }
}

/// Anything usable as an argument to an expression.
#[derive(Clone, Debug)]
pub enum Operand {
    Expr(ExprRef),
    Ref(RefProxy),
    Value(Scalar),
    Query(Query),
}

impl From<ExprRef> for Operand {
    fn from(e: ExprRef) -> Self {
        Operand::Expr(e)
    }
}
impl From<RefProxy> for Operand {
    fn from(p: RefProxy) -> Self {
        Operand::Ref(p)
    }
}
impl From<&RefProxy> for Operand {
    fn from(p: &RefProxy) -> Self {
        Operand::Ref(p.clone())
    }
}
impl From<Query> for Operand {
    fn from(q: Query) -> Self {
        Operand::Query(q)
    }
}
impl From<Scalar> for Operand {
    fn from(v: Scalar) -> Self {
        Operand::Value(v)
    }
}

macro_rules! literal_operands {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Operand {
                fn from(v: $t) -> Self {
                    Operand::Value(Scalar::from(v))
                }
            }
        )*
    };
}

literal_operands!(bool, i32, i64, f64, &str, String);

/// An entry in a `select`.
#[derive(Clone, Debug)]
pub enum SelectItem {
    Field(String, Operand),
    Spread(Operand),
}

impl SelectItem {
    pub fn field(name: impl Into<String>, value: impl Into<Operand>) -> Self {
        SelectItem::Field(name.into(), value.into())
    }
}

impl<N: Into<String>, O: Into<Operand>> From<(N, O)> for SelectItem {
    fn from((name, value): (N, O)) -> Self {
        SelectItem::field(name, value)
    }
}

/// Build a list of named [`SelectItem`]s.
/// ```ignore
/// q.select(fields! { id: p.get("id"), name: p.get("name") });
/// ```
#[macro_export]
macro_rules! fields {
    ( $( $name:ident : $value:expr ),* $(,)? ) => {
        vec![ $( $crate::frontend::SelectItem::field(stringify!($name), $value) ),* ]
    };
}
