//! Activation token: model, construction, and encrypted persistence.

pub mod factory;
pub mod model;
pub mod store;
