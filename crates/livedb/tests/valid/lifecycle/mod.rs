pub mod disposal;
pub mod field_errors;
pub mod late_subscriber;
pub mod no_miss;
pub mod reentrant_writes;
