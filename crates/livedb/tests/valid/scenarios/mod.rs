pub mod aggregate_retraction;
pub mod correlated_subquery;
pub mod group_update;
pub mod join_filter;
pub mod window;
