// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Functional tests for the PipelineConfig sync control loop.
//!
//! These tests exercise the informer, work queue and reconciler against
//! in-memory fakes WITHOUT requiring a Kubernetes cluster or a Jenkins
//! instance.
//!
//! ```bash
//! # Run all functional tests
//! cargo test --test functional
//!
//! # Run specific test
//! cargo test --test functional test_conversion_error_records_condition
//! ```
//!
//! ## Test Categories
//!
//! - **Reconciler tests**: condition gates, deletion cleanup, error paths
//! - **Queue tests**: deduplication, dirty re-queueing, backoff
//! - **Informer tests**: list/watch state machine, relist, resync
//! - **Dependency tests**: plugin presence and version checks

mod dependency_tests;
mod informer_tests;
mod reconciler_tests;

pub use fixtures::*;
