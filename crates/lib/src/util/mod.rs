//! Shared utilities.
//!
//! Common utilities used across the crate including hashing, path handling
//! and test helpers.

pub mod hash;
pub mod paths;

#[cfg(test)]
pub mod testutil;
