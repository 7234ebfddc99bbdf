//! Deployment ingest collector.
//!
//! Each run pulls deployments completed between the persisted milestone and
//! now, appends them to the block/chunk store per project and advances the
//! milestone only when every project write succeeded. A failed run leaves the
//! milestone in place, so the next run retries the same window and the
//! store's id-based de-duplication absorbs the overlap.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

use insight_core::catalog::{
    Deployment, DeploymentLister, FilterOperator, FilterValue, ListFilter, ListOptions, ListOrder,
    fields,
};
use insight_core::config::InsightConfig;
use insight_core::model::{DeploymentData, Milestone};
use insight_core::observability::collector_span;
use insight_core::{ProjectId, Result};
use insight_store::InsightStore;

use crate::metrics;
use crate::paging::{cancellable, drain_pages};

/// Job name used in logs and metrics.
pub const DEPLOYMENT_JOB: &str = "deployment_collector";

/// Default catalogue page size.
pub const DEFAULT_DEPLOYMENT_PAGE_SIZE: usize = 50;

/// Default look-back when no milestone exists.
pub const DEFAULT_BOOTSTRAP_SECS: i64 = 60 * 60;

/// Default upper bound on the window one run catches up on.
pub const DEFAULT_CATCH_UP_CLAMP_SECS: i64 = 2 * 24 * 60 * 60;

/// Outcome of one deployment collector run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentRunReport {
    /// Start of the ingested window (unix seconds).
    pub from: i64,
    /// End of the ingested window (unix seconds).
    pub to: i64,
    /// Seconds the stored milestone trailed the clock when the run started.
    pub lag_secs: i64,
    /// Seconds of backlog skipped by the catch-up clamp.
    pub skipped_secs: i64,
    /// Deployments returned by the catalogue.
    pub listed: usize,
    /// Deployments newly stored.
    pub inserted: usize,
    /// Deployments dropped as already stored.
    pub duplicates: usize,
    /// Projects whose deployments could not be fully stored.
    pub projects_failed: Vec<String>,
    /// True if the milestone moved to `to`.
    pub milestone_advanced: bool,
}

impl DeploymentRunReport {
    /// Returns true if any project write failed.
    #[must_use]
    pub fn had_errors(&self) -> bool {
        !self.projects_failed.is_empty()
    }
}

/// Incrementally moves completed deployments into the insight store.
pub struct DeploymentCollector {
    lister: Arc<dyn DeploymentLister>,
    store: Arc<InsightStore>,
    page_size: usize,
    bootstrap_secs: i64,
    catch_up_clamp_secs: i64,
    run_lock: Mutex<()>,
}

impl std::fmt::Debug for DeploymentCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentCollector")
            .field("page_size", &self.page_size)
            .field("bootstrap_secs", &self.bootstrap_secs)
            .field("catch_up_clamp_secs", &self.catch_up_clamp_secs)
            .finish_non_exhaustive()
    }
}

impl DeploymentCollector {
    /// Creates a collector with default paging, bootstrap and clamp.
    #[must_use]
    pub fn new(lister: Arc<dyn DeploymentLister>, store: Arc<InsightStore>) -> Self {
        Self {
            lister,
            store,
            page_size: DEFAULT_DEPLOYMENT_PAGE_SIZE,
            bootstrap_secs: DEFAULT_BOOTSTRAP_SECS,
            catch_up_clamp_secs: DEFAULT_CATCH_UP_CLAMP_SECS,
            run_lock: Mutex::new(()),
        }
    }

    /// Creates a collector using the settings in `config`.
    #[must_use]
    pub fn from_config(
        lister: Arc<dyn DeploymentLister>,
        store: Arc<InsightStore>,
        config: &InsightConfig,
    ) -> Self {
        let mut collector = Self::new(lister, store);
        collector.page_size = config.deployment_page_size.max(1);
        collector.bootstrap_secs = config.milestone_bootstrap_secs;
        collector.catch_up_clamp_secs = config.catch_up_clamp_secs;
        collector
    }

    /// Overrides the catalogue page size.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Runs one pass ending at the current time.
    ///
    /// # Errors
    ///
    /// See [`DeploymentCollector::execute_at`].
    pub async fn execute(&self, cancel: &CancellationToken) -> Result<DeploymentRunReport> {
        self.execute_at(Utc::now(), cancel).await
    }

    /// Runs one pass ending at `now`.
    ///
    /// Overlapping calls are serialised; a second call waits for the first.
    ///
    /// # Errors
    ///
    /// Returns an error, without advancing the milestone, if the milestone
    /// cannot be read, the catalogue listing fails or the run is cancelled.
    /// Project write failures are reported through
    /// [`DeploymentRunReport::had_errors`] and also leave the milestone as is.
    pub async fn execute_at(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<DeploymentRunReport> {
        let _guard = cancellable(cancel, async { Ok(self.run_lock.lock().await) }).await?;
        let started = Instant::now();
        let span = collector_span(DEPLOYMENT_JOB, now.timestamp());

        let result = self.run(now.timestamp(), cancel).instrument(span).await;

        let outcome = metrics::outcome_of(&result, DeploymentRunReport::had_errors);
        metrics::record_run(DEPLOYMENT_JOB, outcome, started.elapsed());
        result
    }

    async fn run(&self, now: i64, cancel: &CancellationToken) -> Result<DeploymentRunReport> {
        let milestone = match cancellable(cancel, self.store.get_milestone()).await? {
            Some(milestone) => milestone.deployment_completed_at_milestone,
            None => {
                let bootstrap = now - self.bootstrap_secs;
                info!(milestone = bootstrap, "no milestone found, bootstrapping");
                bootstrap
            }
        };

        let lag_secs = now - milestone;
        metrics::record_milestone_lag(lag_secs);

        let to = now;
        if to < milestone {
            warn!(
                milestone,
                to,
                "clock is behind the milestone, keeping it and skipping this run"
            );
            return Ok(DeploymentRunReport {
                from: milestone,
                to,
                lag_secs,
                ..DeploymentRunReport::default()
            });
        }

        let mut from = milestone;
        let mut skipped_secs = 0;
        if to - from > self.catch_up_clamp_secs {
            let clamped = to - self.catch_up_clamp_secs;
            skipped_secs = clamped - from;
            warn!(
                milestone,
                from = clamped,
                skipped_secs,
                "catch-up window exceeds the clamp, skipping older deployments"
            );
            from = clamped;
        }

        let deployments = self.list_deployments(from, to, cancel).await.inspect_err(|e| {
            error!(from, to, error = %e, "failed to list completed deployments");
        })?;

        let mut report = DeploymentRunReport {
            from,
            to,
            lag_secs,
            skipped_secs,
            listed: deployments.len(),
            ..DeploymentRunReport::default()
        };

        for (project, batch) in group_by_project(deployments) {
            let Ok(project_id) = ProjectId::new(project.as_str()) else {
                error!(project_id = %project, "catalogue returned an invalid project id");
                report.projects_failed.push(project);
                continue;
            };

            let put = self.store.put_completed_deployments(&project_id, &batch);
            match cancellable(cancel, put).await {
                Ok(put) => {
                    debug!(
                        project_id = %project_id,
                        inserted = put.inserted,
                        duplicates = put.duplicates,
                        chunks_written = put.chunks_written,
                        "stored completed deployments"
                    );
                    report.inserted += put.inserted;
                    report.duplicates += put.duplicates;
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    error!(
                        project_id = %project_id,
                        deployments = batch.len(),
                        error = %e,
                        "failed to store completed deployments"
                    );
                    report.projects_failed.push(project);
                }
            }
        }
        metrics::record_deployments_ingested(report.inserted);

        if report.had_errors() {
            warn!(
                failed = report.projects_failed.len(),
                milestone, "run had errors, milestone not advanced"
            );
            return Ok(report);
        }

        let next = Milestone {
            deployment_completed_at_milestone: to,
        };
        cancellable(cancel, self.store.put_milestone(&next))
            .await
            .inspect_err(|e| error!(error = %e, "failed to persist milestone"))?;
        report.milestone_advanced = true;

        info!(
            from,
            to,
            listed = report.listed,
            inserted = report.inserted,
            duplicates = report.duplicates,
            "deployment collection finished"
        );
        Ok(report)
    }

    async fn list_deployments(
        &self,
        from: i64,
        to: i64,
        cancel: &CancellationToken,
    ) -> Result<Vec<Deployment>> {
        let options = ListOptions {
            filters: vec![
                ListFilter::new(fields::COMPLETED_AT, FilterOperator::Ge, FilterValue::Int(from)),
                ListFilter::new(fields::COMPLETED_AT, FilterOperator::Le, FilterValue::Int(to)),
            ],
            orders: vec![ListOrder::asc(fields::COMPLETED_AT), ListOrder::asc(fields::ID)],
            cursor: String::new(),
            limit: self.page_size,
        };
        let lister = &self.lister;
        drain_pages(options, cancel, move |options| async move {
            lister.list_deployments(&options).await
        })
        .await
    }
}

/// Converts a catalogue deployment into its stored form.
#[must_use]
pub fn to_deployment_data(deployment: &Deployment) -> DeploymentData {
    DeploymentData {
        id: deployment.id.clone(),
        app_id: deployment.application_id.clone(),
        labels: deployment.labels.clone(),
        started_at: deployment.created_at,
        completed_at: deployment.completed_at,
        complete_status: deployment.status,
        rollback_started_at: deployment.rollback_started_at(),
    }
}

fn group_by_project(deployments: Vec<Deployment>) -> BTreeMap<String, Vec<DeploymentData>> {
    let mut projects: BTreeMap<String, Vec<DeploymentData>> = BTreeMap::new();
    for deployment in deployments {
        let data = to_deployment_data(&deployment);
        projects.entry(deployment.project_id).or_default().push(data);
    }
    projects
}
