use super::{ExprRef, Key, Plan};
use livedb_store::{BaseCollection, CollectionHandle};
use std::fmt::{self, Display};

/// A handle to a built query (its outermost body).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Query {
    pub body: Key<QueryBody>,
}

/// A base collection registered with the plan.
pub struct CollectionRef {
    pub name: String,
    pub handle: CollectionHandle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
    Right,
    Full,
}

impl JoinKind {
    /// Unmatched rows of the already bound sources are kept (null extended).
    pub fn keeps_left(self) -> bool {
        matches!(self, JoinKind::Left | JoinKind::Full)
    }

    /// Unmatched rows of the joined source are kept (null extended).
    pub fn keeps_right(self) -> bool {
        matches!(self, JoinKind::Right | JoinKind::Full)
    }
}

impl Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JoinKind::Inner => "inner",
            JoinKind::Left => "left",
            JoinKind::Right => "right",
            JoinKind::Full => "full",
        })
    }
}

#[derive(Clone, Copy, Debug)]
pub enum SourceKind {
    Collection(Key<CollectionRef>),
    Query(Key<QueryBody>),
}

/// A source bound to an alias within a query body.
/// - The first source of a body has no join kind.
pub struct Source {
    pub alias: String,
    pub kind: SourceKind,
    pub join: Option<JoinKind>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

#[derive(Clone, Copy, Debug)]
pub struct OrderTerm {
    pub expr: ExprRef,
    pub direction: Direction,
}

#[derive(Clone, Debug)]
pub enum SelectField {
    Named { name: String, expr: ExprRef },
    /// Every field of a record valued expression (e.g. a whole source row).
    Spread(ExprRef),
}

#[derive(Clone, Debug)]
pub enum Selection {
    Fields(Vec<SelectField>),
    /// A bare value: a record becomes the output row, anything else is output
    /// as the field `value`.
    Value(ExprRef),
}

/// A single `select` with its sources, conditions and result options.
/// - INV: `join_conditions` only contains aliases of joined (not the first)
///   sources of the body.
#[derive(Default)]
pub struct QueryBody {
    pub sources: Vec<Key<Source>>,
    pub join_conditions: Vec<(String, ExprRef)>,
    pub filter: Option<ExprRef>,
    pub selection: Option<Selection>,
    pub group_by: Option<Vec<ExprRef>>,
    pub having: Option<ExprRef>,
    pub order_by: Option<Vec<OrderTerm>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub distinct: bool,
    /// Aliases selected as a whole (spread) into the output.
    pub spread_aliases: Vec<String>,
}

impl QueryBody {
    pub fn join_condition(&self, alias: &str) -> Option<ExprRef> {
        self.join_conditions
            .iter()
            .find(|(a, _)| a == alias)
            .map(|(_, e)| *e)
    }

    pub fn selection_exprs(&self) -> Vec<ExprRef> {
        match &self.selection {
            Some(Selection::Fields(fields)) => fields
                .iter()
                .map(|f| match f {
                    SelectField::Named { expr, .. } | SelectField::Spread(expr) => *expr,
                })
                .collect(),
            Some(Selection::Value(expr)) => vec![*expr],
            None => Vec::new(),
        }
    }

    /// All expressions directly owned by the body (not those of its sources).
    pub fn expressions(&self) -> Vec<ExprRef> {
        let mut exprs = self.selection_exprs();
        exprs.extend(self.join_conditions.iter().map(|(_, e)| *e));
        exprs.extend(self.filter);
        exprs.extend(self.group_by.iter().flatten().copied());
        exprs.extend(self.having);
        exprs.extend(self.order_by.iter().flatten().map(|o| o.expr));
        exprs
    }

    /// Needs grouping: explicitly grouped, or aggregates in the projection or
    /// `having` (an implicit single global group).
    pub fn is_grouped(&self, plan: &Plan) -> bool {
        self.group_by.is_some()
            || self
                .selection_exprs()
                .into_iter()
                .chain(self.having)
                .any(|e| plan.contains_aggregate(e))
    }

    pub fn is_windowed(&self) -> bool {
        self.distinct || self.order_by.is_some() || self.limit.is_some() || self.offset.is_some()
    }
}

impl Plan {
    /// Register a base collection that queries can read from.
    pub fn collection(&mut self, collection: impl BaseCollection + 'static) -> Key<CollectionRef> {
        self.register(std::rc::Rc::new(collection))
    }

    pub fn register(&mut self, handle: CollectionHandle) -> Key<CollectionRef> {
        self.collections.insert(CollectionRef {
            name: handle.name().to_owned(),
            handle,
        })
    }

    /// Find a source bound in `body` by its alias.
    pub fn source_by_alias(&self, body: Key<QueryBody>, alias: &str) -> Option<Key<Source>> {
        self.get_body(body)
            .sources
            .iter()
            .copied()
            .find(|s| self.get_source(*s).alias == alias)
    }
}
