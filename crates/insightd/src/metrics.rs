//! Prometheus exporter for the daemon.
//!
//! The store and collector crates record through the `metrics` facade; this
//! module installs the recorder once and serves its rendering on `/metrics`.

use std::sync::OnceLock;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use metrics::{describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// 1 while the daemon's scheduler is running, 0 otherwise.
pub const SCHEDULER_UP: &str = "insight_scheduler_up";

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the global Prometheus recorder and registers metric descriptions.
///
/// Subsequent calls return the handle installed by the first.
///
/// # Errors
///
/// Returns an error if another recorder is already installed.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("failed to install prometheus recorder: {e}"))?;

    insight_store::metrics::register_metrics();
    insight_collector::metrics::register_metrics();
    describe_gauge!(SCHEDULER_UP, "Whether the collector scheduler is running");

    tracing::info!("prometheus metrics recorder initialized");
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Returns the global Prometheus handle, if initialized.
#[must_use]
pub fn prometheus_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

/// Sets the scheduler liveness gauge.
pub fn set_scheduler_up(up: bool) {
    gauge!(SCHEDULER_UP).set(if up { 1.0 } else { 0.0 });
}

/// Handler for `GET /metrics`.
pub async fn serve_metrics() -> impl IntoResponse {
    match prometheus_handle() {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; charset=utf-8")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [("content-type", "text/plain; charset=utf-8")],
            "metrics not initialized".to_string(),
        ),
    }
}
