//! # insight-store
//!
//! Storage layer for delivery insights.
//!
//! The store keeps three kinds of documents in a flat blob store:
//!
//! - **Application snapshots**: one document per project, overwritten whole
//! - **Milestone**: the global watermark of deployment collection
//! - **Deployment blocks**: completed deployments partitioned by UTC year
//!   into size-bounded chunks, summarised by a per-block metadata document
//!
//! Completed chunks are immutable and served through an in-memory LRU.
//!
//! ## Example
//!
//! ```rust
//! # tokio_test::block_on(async {
//! use std::sync::Arc;
//! use insight_core::prelude::*;
//! use insight_store::InsightStore;
//!
//! let store = InsightStore::new(Arc::new(MemoryBackend::new()), StoreConfig::default())?;
//! let project = ProjectId::new("p1")?;
//! let listed = store.list_completed_deployments(&project, 0, 3600).await?;
//! assert!(listed.is_empty());
//! # Ok::<(), insight_core::Error>(())
//! # }).unwrap();
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod cache;
pub mod deployments;
pub mod metrics;
pub mod store;

pub use cache::{CacheStats, ChunkCache};
pub use deployments::PutReport;
pub use store::InsightStore;
