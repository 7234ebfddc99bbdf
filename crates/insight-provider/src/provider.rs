//! Read queries over persisted insights.
//!
//! The provider is read-only. It never writes to the store and propagates
//! storage errors unchanged.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use insight_core::model::{
    ApplicationActiveStatus, ApplicationKind, DeploymentData, Labels,
};
use insight_core::{Error, ProjectId, Result};
use insight_store::InsightStore;

use crate::bucket::{DataPoint, Resolution, fill_up};

/// Label keys of an application count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ApplicationCountLabelKey {
    /// Application kind.
    Kind,
    /// Application active status.
    ActiveStatus,
}

impl ApplicationCountLabelKey {
    /// Returns the label key string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Kind => "KIND",
            Self::ActiveStatus => "ACTIVE_STATUS",
        }
    }
}

/// Number of applications sharing a kind and status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationCount {
    /// `KIND` and `ACTIVE_STATUS` labels.
    pub labels: Labels,
    /// Number of applications.
    pub count: usize,
}

impl ApplicationCount {
    /// Returns the value of one label.
    #[must_use]
    pub fn label(&self, key: ApplicationCountLabelKey) -> Option<&str> {
        self.labels.get(key.as_str()).map(String::as_str)
    }
}

/// Application counts of one project snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationCounts {
    /// One entry per `(kind, status)` present in the snapshot.
    pub counts: Vec<ApplicationCount>,
    /// `updated_at` of the snapshot.
    pub updated_at: i64,
}

/// Deployment metric served as a data-point series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InsightMetric {
    /// Number of completed deployments per bucket.
    DeploymentFrequency,
    /// Share of failed deployments per bucket.
    ChangeFailureRate,
}

impl FromStr for InsightMetric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "DEPLOYMENT_FREQUENCY" | "FREQUENCY" => Ok(Self::DeploymentFrequency),
            "CHANGE_FAILURE_RATE" => Ok(Self::ChangeFailureRate),
            other => Err(Error::InvalidInput(format!("unknown metric: {other}"))),
        }
    }
}

impl fmt::Display for InsightMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DeploymentFrequency => "DEPLOYMENT_FREQUENCY",
            Self::ChangeFailureRate => "CHANGE_FAILURE_RATE",
        })
    }
}

/// Selection of deployments for a data-point query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentQuery {
    /// Project to query.
    pub project_id: ProjectId,
    /// Restrict to one application; `None` matches every application.
    pub application_id: Option<String>,
    /// Every label must match; empty matches everything.
    pub labels: Labels,
    /// Inclusive lower bound on `completed_at`.
    pub from: i64,
    /// Inclusive upper bound on `completed_at`.
    pub to: i64,
    /// Bucket width.
    pub resolution: Resolution,
}

impl DeploymentQuery {
    /// Creates a query over every application of `project_id`.
    #[must_use]
    pub fn new(project_id: ProjectId, from: i64, to: i64, resolution: Resolution) -> Self {
        Self {
            project_id,
            application_id: None,
            labels: Labels::new(),
            from,
            to,
            resolution,
        }
    }

    /// Restricts the query to one application. An empty id matches all.
    #[must_use]
    pub fn application(mut self, application_id: impl Into<String>) -> Self {
        let id = application_id.into();
        self.application_id = (!id.is_empty()).then_some(id);
        self
    }

    /// Adds a label selector.
    #[must_use]
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    fn matches(&self, deployment: &DeploymentData) -> bool {
        self.application_id
            .as_deref()
            .is_none_or(|app| deployment.app_id == app)
            && deployment.matches_labels(&self.labels)
    }
}

/// Answers read queries over application snapshots and stored deployments.
#[derive(Debug, Clone)]
pub struct InsightProvider {
    store: Arc<InsightStore>,
}

impl InsightProvider {
    /// Creates a provider over `store`.
    #[must_use]
    pub fn new(store: Arc<InsightStore>) -> Self {
        Self { store }
    }

    /// Counts the applications of a project by `(kind, status)`.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the project has no snapshot yet, or any
    /// storage error.
    pub async fn get_application_counts(&self, project: &ProjectId) -> Result<ApplicationCounts> {
        let snapshot = self
            .store
            .get_applications(project)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no application snapshot for {project}")))?;

        let mut grouped: BTreeMap<(ApplicationKind, ApplicationActiveStatus), usize> =
            BTreeMap::new();
        for app in &snapshot.applications {
            *grouped.entry((app.kind, app.status)).or_default() += 1;
        }

        let counts = grouped
            .into_iter()
            .map(|((kind, status), count)| ApplicationCount {
                labels: Labels::from([
                    (
                        ApplicationCountLabelKey::Kind.as_str().to_string(),
                        kind.as_str().to_string(),
                    ),
                    (
                        ApplicationCountLabelKey::ActiveStatus.as_str().to_string(),
                        status.as_str().to_string(),
                    ),
                ]),
                count,
            })
            .collect();

        Ok(ApplicationCounts {
            counts,
            updated_at: snapshot.updated_at,
        })
    }

    /// Serves `metric` for `query`.
    ///
    /// # Errors
    ///
    /// See the metric-specific methods.
    pub async fn get_data_points(
        &self,
        metric: InsightMetric,
        query: &DeploymentQuery,
    ) -> Result<Vec<DataPoint>> {
        match metric {
            InsightMetric::DeploymentFrequency => {
                self.get_deployment_frequency_data_points(query).await
            }
            InsightMetric::ChangeFailureRate => {
                self.get_deployment_change_failure_rate_data_points(query).await
            }
        }
    }

    /// Counts completed deployments per bucket.
    ///
    /// # Errors
    ///
    /// Propagates `InvalidInput`, `RangeTooLarge` and storage errors from the
    /// store.
    pub async fn get_deployment_frequency_data_points(
        &self,
        query: &DeploymentQuery,
    ) -> Result<Vec<DataPoint>> {
        let buckets = self.bucketed(query).await?;
        #[allow(clippy::cast_precision_loss)]
        let points: Vec<DataPoint> = buckets
            .into_iter()
            .map(|(timestamp, tally)| DataPoint {
                timestamp,
                value: tally.total as f64,
            })
            .collect();
        fill_up(&points, query.from, query.to, query.resolution)
    }

    /// Computes `failures / total` per bucket. Empty buckets read as `0`.
    ///
    /// # Errors
    ///
    /// Propagates `InvalidInput`, `RangeTooLarge` and storage errors from the
    /// store.
    pub async fn get_deployment_change_failure_rate_data_points(
        &self,
        query: &DeploymentQuery,
    ) -> Result<Vec<DataPoint>> {
        let buckets = self.bucketed(query).await?;
        #[allow(clippy::cast_precision_loss)]
        let points: Vec<DataPoint> = buckets
            .into_iter()
            .filter(|(_, tally)| tally.total > 0)
            .map(|(timestamp, tally)| DataPoint {
                timestamp,
                value: tally.failures as f64 / tally.total as f64,
            })
            .collect();
        fill_up(&points, query.from, query.to, query.resolution)
    }

    async fn bucketed(&self, query: &DeploymentQuery) -> Result<BTreeMap<i64, Tally>> {
        let deployments = self
            .store
            .list_completed_deployments(&query.project_id, query.from, query.to)
            .await?;

        let mut buckets: BTreeMap<i64, Tally> = BTreeMap::new();
        let mut kept = 0;
        for deployment in deployments.iter().filter(|d| query.matches(d)) {
            let bucket = query.resolution.round_down(deployment.completed_at)?;
            let tally = buckets.entry(bucket).or_default();
            tally.total += 1;
            if deployment.is_failure() {
                tally.failures += 1;
            }
            kept += 1;
        }
        debug!(
            project_id = %query.project_id,
            listed = deployments.len(),
            kept,
            buckets = buckets.len(),
            resolution = %query.resolution,
            "bucketed deployments"
        );
        Ok(buckets)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    total: usize,
    failures: usize,
}
