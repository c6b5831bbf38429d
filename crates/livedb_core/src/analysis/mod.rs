//! Analyses to label info on immutable plans.

pub mod correlation;
pub mod pushdown;
pub mod validity;
