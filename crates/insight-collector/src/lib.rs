//! # insight-collector
//!
//! Scheduled collectors feeding the insight store.
//!
//! - [`ApplicationCollector`]: rebuilds every project's application snapshot
//! - [`DeploymentCollector`]: moves deployments completed since the milestone
//!   into the block/chunk store and advances the milestone
//! - [`Scheduler`]: fires the enabled collectors on their cron expressions
//!
//! Every run accepts a [`CancellationToken`](tokio_util::sync::CancellationToken);
//! a cancelled run returns `Error::Cancelled` and never advances the milestone.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod application;
pub mod deployment;
pub mod metrics;
mod paging;
pub mod scheduler;

pub use application::{ApplicationCollector, ApplicationRunReport};
pub use deployment::{DeploymentCollector, DeploymentRunReport};
pub use scheduler::{ScheduledJob, Scheduler, SchedulerHandle};
