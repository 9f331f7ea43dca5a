//! Validation service wire format.

pub mod models;
