use super::{Key, Plan, QueryBody};
use itertools::Itertools;
use livedb_store::Scalar;
use std::fmt::{self, Display};

pub type ExprRef = Key<Expression>;

/// A node of the expression tree.
/// - Every variant is a distinct IR object, identity is by [`Key`].
/// - [`Expression::Reference`] paths start with a source alias, followed by
///   zero or more field names (a path of length 1 is the whole row).
pub enum Expression {
    Literal(Scalar),
    Reference { path: Vec<String> },
    Call { func: ScalarFunc, args: Vec<ExprRef> },
    Aggregate { func: AggFunc, args: Vec<ExprRef> },
    /// A query evaluated as a value: the single column of its first row, or
    /// the first row as a record, or null when there are no rows.
    Subquery(Key<QueryBody>),
}

impl Expression {
    /// Direct child expressions (not descending into subqueries).
    pub fn children(&self) -> &[ExprRef] {
        match self {
            Expression::Call { args, .. } | Expression::Aggregate { args, .. } => args,
            Expression::Literal(_) | Expression::Reference { .. } | Expression::Subquery(_) => &[],
        }
    }

    pub fn alias(&self) -> Option<&str> {
        match self {
            Expression::Reference { path } => path.first().map(String::as_str),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arity {
    Exactly(usize),
    AtLeast(usize),
    Between(usize, usize),
}

impl Arity {
    pub fn accepts(self, n: usize) -> bool {
        match self {
            Arity::Exactly(m) => n == m,
            Arity::AtLeast(m) => n >= m,
            Arity::Between(lo, hi) => lo <= n && n <= hi,
        }
    }
}

impl Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exactly(n) => write!(f, "{n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Between(lo, hi) => write!(f, "{lo} to {hi}"),
        }
    }
}

macro_rules! named_funcs {
    ($ty:ident { $($variant:ident = $name:literal : $arity:expr),+ $(,)? }) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum $ty {
            $($variant),+
        }

        impl $ty {
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            pub fn name(self) -> &'static str {
                match self {
                    $($ty::$variant => $name),+
                }
            }

            pub fn arity(self) -> Arity {
                match self {
                    $($ty::$variant => $arity),+
                }
            }

            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some($ty::$variant),)+
                    _ => None,
                }
            }
        }

        impl Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

named_funcs!(ScalarFunc {
    Eq = "eq": Arity::Exactly(2),
    Neq = "neq": Arity::Exactly(2),
    Lt = "lt": Arity::Exactly(2),
    Lte = "lte": Arity::Exactly(2),
    Gt = "gt": Arity::Exactly(2),
    Gte = "gte": Arity::Exactly(2),
    And = "and": Arity::AtLeast(1),
    Or = "or": Arity::AtLeast(1),
    Not = "not": Arity::Exactly(1),
    Length = "length": Arity::Exactly(1),
    Upper = "upper": Arity::Exactly(1),
    Lower = "lower": Arity::Exactly(1),
    Add = "add": Arity::Exactly(2),
    Sub = "sub": Arity::Exactly(2),
    Mul = "mul": Arity::Exactly(2),
    Div = "div": Arity::Exactly(2),
    Concat = "concat": Arity::AtLeast(1),
    Coalesce = "coalesce": Arity::AtLeast(1),
    IsNull = "isNull": Arity::Exactly(1),
});

named_funcs!(AggFunc {
    Count = "count": Arity::Between(0, 1),
    Sum = "sum": Arity::Exactly(1),
    Min = "min": Arity::Exactly(1),
    Max = "max": Arity::Exactly(1),
    Avg = "avg": Arity::Exactly(1),
});

impl Plan {
    /// Does the expression contain an aggregate, not looking inside subqueries
    /// (which aggregate over their own groups).
    pub fn contains_aggregate(&self, expr: ExprRef) -> bool {
        self.contains(expr, &|e| matches!(e, Expression::Aggregate { .. }))
    }

    pub fn contains_subquery(&self, expr: ExprRef) -> bool {
        self.contains(expr, &|e| matches!(e, Expression::Subquery(_)))
    }

    fn contains(&self, expr: ExprRef, pred: &impl Fn(&Expression) -> bool) -> bool {
        let e = self.get_expr(expr);
        pred(e) || e.children().iter().any(|c| self.contains(*c, pred))
    }

    /// Splits a conjunction (nested `and` calls) into its parts.
    pub fn conjuncts(&self, expr: ExprRef) -> Vec<ExprRef> {
        match self.get_expr(expr) {
            Expression::Call {
                func: ScalarFunc::And,
                args,
            } => args.iter().flat_map(|a| self.conjuncts(*a)).collect(),
            _ => vec![expr],
        }
    }

    /// The aliases referenced by an expression, not looking inside subqueries.
    pub fn referenced_aliases(&self, expr: ExprRef, out: &mut Vec<String>) {
        match self.get_expr(expr) {
            Expression::Reference { path } => {
                if let Some(alias) = path.first() {
                    if !out.contains(alias) {
                        out.push(alias.clone())
                    }
                }
            }
            e => {
                for c in e.children() {
                    self.referenced_aliases(*c, out)
                }
            }
        }
    }

    /// Short description of an expression for logs and graph labels.
    pub fn describe_expr(&self, expr: ExprRef) -> String {
        match self.get_expr(expr) {
            Expression::Literal(Scalar::Str(s)) => format!("{s:?}"),
            Expression::Literal(v) => v.to_string(),
            Expression::Reference { path } => path.join("."),
            Expression::Call { func, args } => format!(
                "{func}({})",
                args.iter().map(|a| self.describe_expr(*a)).join(", ")
            ),
            Expression::Aggregate { func, args } => format!(
                "{func}({})",
                args.iter().map(|a| self.describe_expr(*a)).join(", ")
            ),
            Expression::Subquery(body) => format!("subquery#{}", body.arr_idx()),
        }
    }
}
