//! Access policy over the current license.

pub mod access;
