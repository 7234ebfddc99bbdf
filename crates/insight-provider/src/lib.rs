//! # insight-provider
//!
//! Read side of delivery insights.
//!
//! - [`InsightProvider::get_application_counts`]: applications of a project
//!   grouped by kind and active status, from the latest snapshot
//! - [`InsightProvider::get_deployment_frequency_data_points`]: completed
//!   deployments per day or month
//! - [`InsightProvider::get_deployment_change_failure_rate_data_points`]:
//!   share of failed deployments per day or month
//!
//! Series are dense: every bucket between the rounded-down query bounds is
//! present, with `0` where nothing matched.
//!
//! ## Example
//!
//! ```rust
//! # tokio_test::block_on(async {
//! use std::sync::Arc;
//! use insight_core::prelude::*;
//! use insight_provider::{DeploymentQuery, InsightProvider, Resolution};
//! use insight_store::InsightStore;
//!
//! let store = InsightStore::new(Arc::new(MemoryBackend::new()), StoreConfig::default())?;
//! let provider = InsightProvider::new(Arc::new(store));
//! let query = DeploymentQuery::new(ProjectId::new("p1")?, 0, 2 * 86_400, Resolution::Daily);
//! let points = provider.get_deployment_frequency_data_points(&query).await?;
//! assert_eq!(points.len(), 3);
//! assert!(points.iter().all(|p| p.value == 0.0));
//! # Ok::<(), insight_core::Error>(())
//! # }).unwrap();
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod bucket;
pub mod provider;

pub use bucket::{DataPoint, Resolution, fill_up};
pub use provider::{
    ApplicationCount, ApplicationCountLabelKey, ApplicationCounts, DeploymentQuery,
    InsightMetric, InsightProvider,
};
