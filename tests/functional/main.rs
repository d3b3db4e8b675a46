// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Functional tests for the validation engine.
//!
//! These tests drive the full engine (driver, rule validator, context
//! store, pattern matcher) against literal policies and resources,
//! WITHOUT requiring a cluster or any external data source.
//!
//! ```bash
//! # Run all functional tests
//! cargo test --test functional
//!
//! # Run specific test
//! cargo test --test functional test_pattern_failure_reports_path
//! ```
//!
//! ## Test Categories
//!
//! - **Pattern tests**: pattern/anyPattern rules and old/new idempotence
//! - **Deny tests**: deny conditions and message substitution
//! - **Foreach tests**: per-element iteration, short-circuit, nesting
//! - **Driver tests**: counters, timings, store round-trips, filters

#[path = "../common/mod.rs"]
mod common;

mod deny_tests;
mod foreach_tests;
mod pattern_tests;
