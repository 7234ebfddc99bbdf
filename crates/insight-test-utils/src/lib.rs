//! Shared test utilities for insight integration tests.
//!
//! This crate provides:
//! - [`TracingMemoryBackend`]: In-memory storage with operation recording and failure injection
//! - [`MemoryApplicationCatalog`] / [`MemoryDeploymentCatalog`]: In-memory catalogues
//! - [`TestContext`]: A traced backend wired into an `InsightStore`
//! - Factory functions for creating test data
//!
//! # Example
//!
//! ```rust,ignore
//! use insight_test_utils::{TestContext, deployment_data};
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let ctx = TestContext::with_chunk_max_count(3);
//!     ctx.store
//!         .put_completed_deployments(&ctx.project, &[deployment_data("d1", 100)])
//!         .await
//!         .unwrap();
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
// Test utilities use expect/unwrap for cleaner test code - panics are acceptable in tests
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]

pub mod catalog;
pub mod fixtures;
pub mod storage;

pub use catalog::*;
pub use fixtures::*;
pub use storage::*;

/// Initialize test logging (call once per test module).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("insight=debug".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}
