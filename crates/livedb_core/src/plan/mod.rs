//! # livedb Query Plan
//! The intermediate representation produced by the query builder.
//! - Expressions, query bodies, sources and collections are stored in arenas
//!   and referenced by [`Key`].
//! - Object identity is key identity: two uses of the same [`Key`] are the same
//!   IR object, and compile to the same dependency graph node.
//!
//! A plan is only appended to. Keys are never invalidated, so the plan can be
//! shared immutably (e.g. behind an [`std::rc::Rc`]) once queries are built.

use rustc_hash::FxHashMap;
use typed_generational_arena::{Index, NonzeroGeneration, StandardArena as GenArena};

mod access;
mod expr;
mod queries;

pub use access::*;
pub use expr::*;
pub use queries::*;

pub struct Plan {
    pub exprs: GenArena<Expression>,
    pub bodies: GenArena<QueryBody>,
    pub sources: GenArena<Source>,
    pub collections: GenArena<CollectionRef>,

    /// Reference expressions, by the body whose proxy created them and path.
    references: FxHashMap<(usize, Vec<String>), Key<Expression>>,
    /// Scalar subquery expressions, by the body they evaluate.
    subqueries: FxHashMap<usize, Key<Expression>>,
    aliases: usize,
}

impl Plan {
    pub fn new() -> Self {
        Plan {
            exprs: GenArena::new(),
            bodies: GenArena::new(),
            sources: GenArena::new(),
            collections: GenArena::new(),
            references: FxHashMap::default(),
            subqueries: FxHashMap::default(),
            aliases: 0,
        }
    }

    /// A new alias, `source1`, `source2`, ...
    pub(crate) fn fresh_alias(&mut self) -> String {
        self.aliases += 1;
        format!("source{}", self.aliases)
    }

    /// The unique reference expression for `path` created through a proxy of
    /// `body`.
    pub(crate) fn reference(&mut self, body: Key<QueryBody>, path: &[String]) -> Key<Expression> {
        let cache_key = (body.arr_idx(), path.to_vec());
        if let Some(existing) = self.references.get(&cache_key) {
            return *existing;
        }
        let key = self.exprs.insert(Expression::Reference {
            path: path.to_vec(),
        });
        self.references.insert(cache_key, key);
        key
    }

    /// The unique scalar subquery expression evaluating `body`.
    pub(crate) fn subquery_expr(&mut self, body: Key<QueryBody>) -> Key<Expression> {
        if let Some(existing) = self.subqueries.get(&body.arr_idx()) {
            return *existing;
        }
        let key = self.exprs.insert(Expression::Subquery(body));
        self.subqueries.insert(body.arr_idx(), key);
        key
    }
}

impl Default for Plan {
    fn default() -> Self {
        Self::new()
    }
}
