//! Product key layer: binary payload, text codec, checksum, and parser.

pub mod base58;
pub mod checksum;
pub mod codec;
pub mod parser;
pub mod payload;
