//! Helpers for accessing [`Plan`] values through keys, and hashable keys for
//! use in analysis maps.

use super::*;

/// All components are indexed through a [Key]
/// - No shared mutability, need to have the plan also to use
/// - Keys are generational, so no aliasing of old and new keys is possible.
pub type Key<T> = Index<T, usize, NonzeroGeneration<usize>>;

/// A key that implements [`std::hash::Hash`] and [`Ord`] (unlike
/// [`typed_generational_arena::Index`], as the generation is not hashable).
/// - As plans are append only, the array index alone identifies a component.
pub struct Idx<T> {
    key: Key<T>,
}

impl<T> Idx<T> {
    pub fn new(key: Key<T>) -> Self {
        Self { key }
    }

    pub fn key(&self) -> Key<T> {
        self.key
    }
}

impl<T> From<Key<T>> for Idx<T> {
    fn from(key: Key<T>) -> Self {
        Self::new(key)
    }
}

impl<T> Clone for Idx<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Idx<T> {}
impl<T> PartialEq for Idx<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key.arr_idx() == other.key.arr_idx()
    }
}
impl<T> Eq for Idx<T> {}
impl<T> PartialOrd for Idx<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl<T> Ord for Idx<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key.arr_idx().cmp(&other.key.arr_idx())
    }
}
impl<T> std::hash::Hash for Idx<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key.arr_idx().hash(state)
    }
}
impl<T> std::fmt::Debug for Idx<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Idx({})", self.key.arr_idx())
    }
}
impl<T> std::ops::Deref for Idx<T> {
    type Target = Key<T>;
    fn deref(&self) -> &Self::Target {
        &self.key
    }
}

/// A wrapper type for implementing traits on components that need to use the
/// plan for context.
/// - for example rendering a dependency graph needs the plan to label nodes
pub struct With<'a, A> {
    pub plan: &'a Plan,
    pub extended: A,
}

impl Plan {
    pub fn get_expr(&self, key: Key<Expression>) -> &Expression {
        self.exprs.get(key).unwrap()
    }

    pub fn get_body(&self, key: Key<QueryBody>) -> &QueryBody {
        self.bodies.get(key).unwrap()
    }

    pub(crate) fn get_mut_body(&mut self, key: Key<QueryBody>) -> &mut QueryBody {
        self.bodies.get_mut(key).unwrap()
    }

    pub fn get_source(&self, key: Key<Source>) -> &Source {
        self.sources.get(key).unwrap()
    }

    pub fn get_collection(&self, key: Key<CollectionRef>) -> &CollectionRef {
        self.collections.get(key).unwrap()
    }
}
