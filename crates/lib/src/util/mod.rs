//! Shared utilities.
//!
//! Hashing helpers and test fixtures.

pub mod hash;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;
