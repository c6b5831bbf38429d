pub mod identity_sharing;
pub mod invalid_aggregate;
pub mod join_order;
pub mod unresolved_alias;
