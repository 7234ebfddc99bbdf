//! Application snapshot collector.
//!
//! Each run lists every non-deleted application from the catalogue, groups
//! them by project and overwrites each project's snapshot as a whole. The
//! catalogue has no incremental primitive for applications, so readers see
//! either the previous snapshot or the new one.
//!
//! Projects that still hold a non-empty snapshot but no longer appear in the
//! catalogue get an empty snapshot, so their counts drop to zero.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

use insight_core::catalog::{
    Application, ApplicationLister, FilterOperator, FilterValue, ListFilter, ListOptions,
    ListOrder, fields,
};
use insight_core::config::InsightConfig;
use insight_core::model::{ApplicationActiveStatus, ApplicationData, ProjectApplicationData};
use insight_core::observability::collector_span;
use insight_core::{ProjectId, Result};
use insight_store::InsightStore;

use crate::metrics;
use crate::paging::{cancellable, drain_pages};

/// Job name used in logs and metrics.
pub const APPLICATION_JOB: &str = "application_collector";

/// Default catalogue page size.
pub const DEFAULT_APPLICATION_PAGE_SIZE: usize = 100;

/// Outcome of one application collector run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationRunReport {
    /// Unix seconds stamped on every snapshot of this run.
    pub updated_at: i64,
    /// Applications returned by the catalogue.
    pub applications: usize,
    /// Projects whose snapshot was written.
    pub projects_written: usize,
    /// Projects absent from the catalogue whose snapshot was emptied.
    pub projects_cleared: usize,
    /// Projects whose snapshot could not be written.
    pub projects_failed: Vec<String>,
    /// True if stored snapshots could not be listed for clearing.
    pub stale_scan_failed: bool,
}

impl ApplicationRunReport {
    /// Returns true if any project snapshot failed to persist.
    #[must_use]
    pub fn had_errors(&self) -> bool {
        !self.projects_failed.is_empty() || self.stale_scan_failed
    }
}

/// Rebuilds per-project application snapshots.
pub struct ApplicationCollector {
    lister: Arc<dyn ApplicationLister>,
    store: Arc<InsightStore>,
    page_size: usize,
    run_lock: Mutex<()>,
}

impl std::fmt::Debug for ApplicationCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationCollector")
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

impl ApplicationCollector {
    /// Creates a collector with the default page size.
    #[must_use]
    pub fn new(lister: Arc<dyn ApplicationLister>, store: Arc<InsightStore>) -> Self {
        Self {
            lister,
            store,
            page_size: DEFAULT_APPLICATION_PAGE_SIZE,
            run_lock: Mutex::new(()),
        }
    }

    /// Creates a collector using the page size from `config`.
    #[must_use]
    pub fn from_config(
        lister: Arc<dyn ApplicationLister>,
        store: Arc<InsightStore>,
        config: &InsightConfig,
    ) -> Self {
        Self::new(lister, store).with_page_size(config.application_page_size)
    }

    /// Overrides the catalogue page size.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Runs one pass stamped with the current time.
    ///
    /// # Errors
    ///
    /// See [`ApplicationCollector::execute_at`].
    pub async fn execute(&self, cancel: &CancellationToken) -> Result<ApplicationRunReport> {
        self.execute_at(Utc::now(), cancel).await
    }

    /// Runs one pass stamped with `now`.
    ///
    /// Overlapping calls are serialised; a second call waits for the first.
    ///
    /// # Errors
    ///
    /// Returns the listing error if the catalogue fails, in which case no
    /// snapshot is written, or `Error::Cancelled`. Failures writing a single
    /// project's snapshot do not abort the run; they are reported through
    /// [`ApplicationRunReport::had_errors`].
    pub async fn execute_at(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<ApplicationRunReport> {
        let _guard = cancellable(cancel, async { Ok(self.run_lock.lock().await) }).await?;
        let started = Instant::now();
        let span = collector_span(APPLICATION_JOB, now.timestamp());

        let result = self.run(now.timestamp(), cancel).instrument(span).await;

        let outcome = metrics::outcome_of(&result, ApplicationRunReport::had_errors);
        metrics::record_run(APPLICATION_JOB, outcome, started.elapsed());
        result
    }

    async fn run(&self, now: i64, cancel: &CancellationToken) -> Result<ApplicationRunReport> {
        let applications = self.list_applications(cancel).await.inspect_err(|e| {
            error!(error = %e, "failed to list applications");
        })?;

        let mut report = ApplicationRunReport {
            updated_at: now,
            applications: applications.len(),
            ..ApplicationRunReport::default()
        };

        let grouped = group_by_project(applications);
        let listed: BTreeSet<String> = grouped.keys().cloned().collect();

        for (project, apps) in grouped {
            let Ok(project_id) = ProjectId::new(project.as_str()) else {
                error!(project_id = %project, "catalogue returned an invalid project id");
                report.projects_failed.push(project);
                continue;
            };
            let snapshot = ProjectApplicationData {
                applications: apps,
                updated_at: now,
            };
            let count = snapshot.applications.len();

            match cancellable(cancel, self.store.put_applications(&project_id, &snapshot)).await {
                Ok(()) => {
                    debug!(
                        project_id = %project_id,
                        applications = count,
                        "wrote application snapshot"
                    );
                    metrics::record_applications_collected(count);
                    report.projects_written += 1;
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    error!(
                        project_id = %project_id,
                        error = %e,
                        "failed to write application snapshot"
                    );
                    report.projects_failed.push(project);
                }
            }
        }

        self.clear_vanished(&listed, now, cancel, &mut report).await?;

        info!(
            applications = report.applications,
            projects = report.projects_written,
            cleared = report.projects_cleared,
            failed = report.projects_failed.len(),
            "application collection finished"
        );
        Ok(report)
    }

    /// Empties the snapshots of projects the catalogue no longer lists.
    async fn clear_vanished(
        &self,
        listed: &BTreeSet<String>,
        now: i64,
        cancel: &CancellationToken,
        report: &mut ApplicationRunReport,
    ) -> Result<()> {
        let stored = match cancellable(cancel, self.store.list_application_projects()).await {
            Ok(stored) => stored,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                error!(error = %e, "failed to list stored application snapshots");
                report.stale_scan_failed = true;
                return Ok(());
            }
        };

        for project_id in stored {
            if listed.contains(project_id.as_str()) {
                continue;
            }
            let cleared = cancellable(cancel, async {
                match self.store.get_applications(&project_id).await? {
                    Some(old) if !old.applications.is_empty() => {
                        let empty = ProjectApplicationData {
                            applications: Vec::new(),
                            updated_at: now,
                        };
                        self.store.put_applications(&project_id, &empty).await?;
                        Ok(Some(old.applications.len()))
                    }
                    _ => Ok(None),
                }
            })
            .await;

            match cleared {
                Ok(Some(dropped)) => {
                    warn!(
                        project_id = %project_id,
                        dropped,
                        "project has no applications left, snapshot emptied"
                    );
                    report.projects_cleared += 1;
                }
                Ok(None) => {}
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    error!(
                        project_id = %project_id,
                        error = %e,
                        "failed to empty application snapshot"
                    );
                    report.projects_failed.push(project_id.as_str().to_string());
                }
            }
        }
        Ok(())
    }

    async fn list_applications(&self, cancel: &CancellationToken) -> Result<Vec<Application>> {
        let options = ListOptions {
            filters: vec![ListFilter::new(
                fields::DELETED,
                FilterOperator::Eq,
                FilterValue::Bool(false),
            )],
            orders: vec![ListOrder::asc(fields::CREATED_AT), ListOrder::asc(fields::ID)],
            cursor: String::new(),
            limit: self.page_size,
        };
        let lister = &self.lister;
        drain_pages(options, cancel, move |options| async move {
            lister.list_applications(&options).await
        })
        .await
    }
}

/// Groups applications by project, keeping catalogue order within each project.
fn group_by_project(applications: Vec<Application>) -> BTreeMap<String, Vec<ApplicationData>> {
    let mut projects: BTreeMap<String, Vec<ApplicationData>> = BTreeMap::new();
    for app in applications {
        let data = ApplicationData {
            status: ApplicationActiveStatus::from_flags(app.disabled, app.deleted),
            id: app.id,
            labels: app.labels,
            kind: app.kind,
        };
        projects.entry(app.project_id).or_default().push(data);
    }
    projects
}
