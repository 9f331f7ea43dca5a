//! Cryptographic primitives: hashing, key signatures, token seals, and
//! at-rest protection.

pub mod digest;
pub mod protect;
pub mod seal;
pub mod signature;
