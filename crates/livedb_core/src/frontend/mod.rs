//! # Query Builder Frontend
//! Queries are described in rust through a [`QueryScope`]:
//! ```ignore
//! let adults = plan.query(|q| {
//!     let p = q.from(people);
//!     let a = q.join(ages, |q, a| q.eq(a.get("person"), p.get("id")));
//!     let old = q.gt(a.get("age"), 35);
//!     q.filter(old);
//!     q.select(fields! { id: p.get("id"), name: p.get("name") });
//! })?;
//! ```
//! Expressions are created eagerly in the plan, references lazily through
//! [`RefProxy`] handles.

mod builder;
mod proxy;

pub use builder::{QueryScope, SelectOptions, SourceArg};
pub use proxy::{Operand, RefProxy, SelectItem};
