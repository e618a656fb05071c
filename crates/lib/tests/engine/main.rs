//! Integration tests for the packaging engine.

mod common;

mod cache_tests;
mod determinism_tests;
mod scenarios_tests;
