use thiserror::Error;

/// The clause of a query body an expression was placed in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Clause {
    Select,
    Where,
    Join,
    GroupBy,
    Having,
    OrderBy,
}

impl std::fmt::Display for Clause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Clause::Select => "select",
            Clause::Where => "where",
            Clause::Join => "join condition",
            Clause::GroupBy => "groupBy",
            Clause::Having => "having",
            Clause::OrderBy => "orderBy",
        })
    }
}

/// Errors from building and compiling a query. All are reported before any
/// live subscription is made.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum BuildError {
    #[error("aggregate {aggregate} is not allowed in {clause}")]
    InvalidAggregatePlacement { aggregate: String, clause: Clause },

    #[error("aggregate {aggregate} is nested inside another aggregate")]
    NestedAggregate { aggregate: String },

    #[error("reference to {path} does not resolve to any source in scope")]
    UnresolvedAlias { path: String },

    /// Join conditions are evaluated as their source is joined, before
    /// later sources are bound.
    #[error("join condition of {alias} refers to {later}, which is joined after it")]
    JoinReferencesLaterAlias { alias: String, later: String },

    #[error("query refers to itself through {0}")]
    CyclicQueryDefinition(String),

    #[error("alias {0} is bound twice in the same query")]
    DuplicateAlias(String),

    #[error("alias {0} is not bound in this query")]
    UnknownAlias(String),

    #[error("having used without groupBy")]
    HavingWithoutGroupBy,

    #[error("query has no select")]
    MissingSelection,

    #[error("select used twice in the same query")]
    SelectionRedefined,

    #[error("from used twice in the same query")]
    FromRedefined,

    #[error("join used before from")]
    JoinWithoutFrom,

    #[error("unknown function {0}")]
    UnknownFunction(String),

    #[error("{func} takes {expected} arguments, but was given {found}")]
    InvalidArity {
        func: &'static str,
        expected: String,
        found: usize,
    },
}
