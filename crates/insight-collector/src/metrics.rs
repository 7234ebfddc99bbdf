//! Collector metrics.
//!
//! Run outcomes and durations per job, plus ingestion volume and how far the
//! deployment milestone trails wall-clock time.

use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

// ============================================================================
// Metric Names
// ============================================================================

/// Collector runs by job and outcome (`success`, `partial`, `failed`, `cancelled`).
pub const COLLECTOR_RUNS: &str = "insight_collector_runs_total";

/// Collector run duration in seconds by job.
pub const COLLECTOR_RUN_DURATION: &str = "insight_collector_run_duration_seconds";

/// Deployments newly written by the deployment collector.
pub const DEPLOYMENTS_INGESTED: &str = "insight_deployments_ingested_total";

/// Applications written into snapshots by the application collector.
pub const APPLICATIONS_COLLECTED: &str = "insight_applications_collected_total";

/// Seconds between the persisted milestone and the end of the last run.
pub const MILESTONE_LAG: &str = "insight_milestone_lag_seconds";

/// Run outcome label values.
pub mod outcome {
    /// Every step succeeded.
    pub const SUCCESS: &str = "success";
    /// The run finished but some project writes failed.
    pub const PARTIAL: &str = "partial";
    /// The run aborted.
    pub const FAILED: &str = "failed";
    /// The run was cancelled.
    pub const CANCELLED: &str = "cancelled";
}

// ============================================================================
// Metric Registration
// ============================================================================

/// Registers all collector metric descriptions.
///
/// Call this once at application startup after installing the metrics recorder.
pub fn register_metrics() {
    describe_counter!(COLLECTOR_RUNS, "Collector runs by job and outcome");
    describe_histogram!(COLLECTOR_RUN_DURATION, "Collector run duration in seconds");
    describe_counter!(DEPLOYMENTS_INGESTED, "Deployments written by the deployment collector");
    describe_counter!(APPLICATIONS_COLLECTED, "Applications written into snapshots");
    describe_gauge!(MILESTONE_LAG, "Seconds the deployment milestone trailed the clock at run start");
}

// ============================================================================
// Recording
// ============================================================================

pub(crate) fn record_run(job: &'static str, outcome: &'static str, elapsed: Duration) {
    counter!(COLLECTOR_RUNS, "job" => job, "outcome" => outcome).increment(1);
    histogram!(COLLECTOR_RUN_DURATION, "job" => job).record(elapsed.as_secs_f64());
}

pub(crate) fn record_deployments_ingested(count: usize) {
    counter!(DEPLOYMENTS_INGESTED).increment(count as u64);
}

pub(crate) fn record_applications_collected(count: usize) {
    counter!(APPLICATIONS_COLLECTED).increment(count as u64);
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn record_milestone_lag(lag_secs: i64) {
    gauge!(MILESTONE_LAG).set(lag_secs.max(0) as f64);
}

/// Maps a run result onto an outcome label.
pub(crate) fn outcome_of<T>(
    result: &insight_core::Result<T>,
    had_errors: impl Fn(&T) -> bool,
) -> &'static str {
    match result {
        Ok(report) if had_errors(report) => outcome::PARTIAL,
        Ok(_) => outcome::SUCCESS,
        Err(e) if e.is_cancelled() => outcome::CANCELLED,
        Err(_) => outcome::FAILED,
    }
}
