//! Cron scheduler for the collectors.
//!
//! Each installed entry runs on its own task: it sleeps until the next UTC
//! fire time of its cron expression, runs the job, and repeats. Firings of
//! one entry never overlap because the task awaits the job before computing
//! the next fire time. Cancelling the token stops every entry; shutdown
//! waits for in-flight jobs, which observe the same token, to return.
//!
//! ## Cron format
//!
//! Six-field expressions (seconds first) as understood by the `cron` crate,
//! plus classic five-field expressions which get a `0` seconds field.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use cron::Schedule;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use insight_core::Result;
use insight_core::config::{InsightConfig, parse_schedule};

use crate::application::{APPLICATION_JOB, ApplicationCollector};
use crate::deployment::{DEPLOYMENT_JOB, DeploymentCollector};

/// A unit of work the scheduler can fire.
#[async_trait]
pub trait ScheduledJob: Send + Sync + 'static {
    /// Stable job name for logs and metrics.
    fn name(&self) -> &'static str;

    /// Runs the job once. Must return promptly once `cancel` fires.
    async fn run(&self, cancel: &CancellationToken) -> Result<()>;
}

#[async_trait]
impl ScheduledJob for ApplicationCollector {
    fn name(&self) -> &'static str {
        APPLICATION_JOB
    }

    async fn run(&self, cancel: &CancellationToken) -> Result<()> {
        let report = self.execute(cancel).await?;
        if report.had_errors() {
            warn!(
                job = APPLICATION_JOB,
                failed_projects = ?report.projects_failed,
                "run finished with errors"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl ScheduledJob for DeploymentCollector {
    fn name(&self) -> &'static str {
        DEPLOYMENT_JOB
    }

    async fn run(&self, cancel: &CancellationToken) -> Result<()> {
        let report = self.execute(cancel).await?;
        if report.had_errors() {
            warn!(
                job = DEPLOYMENT_JOB,
                failed_projects = ?report.projects_failed,
                "run finished with errors"
            );
        }
        Ok(())
    }
}

struct Entry {
    expression: String,
    schedule: Schedule,
    job: Arc<dyn ScheduledJob>,
}

/// Set of cron entries, not yet running.
#[derive(Default)]
pub struct Scheduler {
    entries: Vec<Entry>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| (e.job.name(), &e.expression)))
            .finish()
    }
}

impl Scheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the collectors whose job is enabled in `config`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if an enabled job's cron expression does
    /// not parse.
    pub fn from_config(
        config: &InsightConfig,
        applications: Arc<ApplicationCollector>,
        deployments: Arc<DeploymentCollector>,
    ) -> Result<Self> {
        let mut scheduler = Self::new();
        if config.application_collector.is_enabled() {
            scheduler.add(&config.application_collector.schedule, applications)?;
        }
        if config.deployment_collector.is_enabled() {
            scheduler.add(&config.deployment_collector.schedule, deployments)?;
        }
        Ok(scheduler)
    }

    /// Installs `job` on the cron `expression`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if the expression does not parse.
    pub fn add(&mut self, expression: &str, job: Arc<dyn ScheduledJob>) -> Result<()> {
        let schedule = parse_schedule(expression)?;
        info!(job = job.name(), schedule = expression, "installed cron entry");
        self.entries.push(Entry {
            expression: expression.to_string(),
            schedule,
            job,
        });
        Ok(())
    }

    /// Returns the names of installed jobs in installation order.
    #[must_use]
    pub fn job_names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.job.name()).collect()
    }

    /// Returns true if nothing is installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Starts one task per entry. Entries stop when `cancel` fires.
    #[must_use]
    pub fn start(self, cancel: CancellationToken) -> SchedulerHandle {
        let tasks = self
            .entries
            .into_iter()
            .map(|entry| tokio::spawn(run_entry(entry, cancel.clone())))
            .collect();
        SchedulerHandle { cancel, tasks }
    }
}

/// Handle to a running scheduler.
#[derive(Debug)]
pub struct SchedulerHandle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Cancels every entry and waits for in-flight jobs to return.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.wait().await;
    }

    /// Waits until every entry has stopped, i.e. until the token is cancelled
    /// and in-flight jobs have returned.
    pub async fn wait(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "scheduler task panicked");
            }
        }
    }
}

async fn run_entry(entry: Entry, cancel: CancellationToken) {
    let name = entry.job.name();
    loop {
        let Some(next) = entry.schedule.upcoming(Utc).next() else {
            warn!(
                job = name,
                schedule = %entry.expression,
                "cron expression has no future fire time"
            );
            return;
        };
        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        debug!(job = name, next = %next, "waiting for next fire time");

        tokio::select! {
            () = cancel.cancelled() => {
                debug!(job = name, "cron entry stopped");
                return;
            }
            () = tokio::time::sleep(wait) => {}
        }

        match entry.job.run(&cancel).await {
            Ok(()) => debug!(job = name, "scheduled run finished"),
            Err(e) if e.is_cancelled() => {
                info!(job = name, "scheduled run cancelled");
                return;
            }
            Err(e) => error!(job = name, error = %e, "scheduled run failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Noop;

    #[async_trait]
    impl ScheduledJob for Noop {
        fn name(&self) -> &'static str {
            "noop"
        }

        async fn run(&self, _cancel: &CancellationToken) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn five_field_expressions_are_accepted() {
        let mut scheduler = Scheduler::new();
        scheduler.add("*/10 * * * *", Arc::new(Noop)).unwrap();
        scheduler.add("0 0 * * * *", Arc::new(Noop)).unwrap();
        assert_eq!(scheduler.job_names(), vec!["noop", "noop"]);
    }

    #[test]
    fn malformed_expression_is_rejected() {
        let mut scheduler = Scheduler::new();
        assert!(scheduler.add("every minute", Arc::new(Noop)).is_err());
        assert!(scheduler.is_empty());
    }

    struct Counting(AtomicUsize);

    #[async_trait]
    impl ScheduledJob for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn run(&self, _cancel: &CancellationToken) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn cancelled_before_first_fire_never_runs() {
        let job = Arc::new(Counting(AtomicUsize::new(0)));
        let mut scheduler = Scheduler::new();
        // Yearly: never fires during the test.
        scheduler.add("0 0 0 1 1 *", job.clone()).unwrap();

        let handle = scheduler.start(CancellationToken::new());
        handle.shutdown().await;
        assert_eq!(job.0.load(Ordering::SeqCst), 0);
    }
}
