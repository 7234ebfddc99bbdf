//! Observability infrastructure.
//!
//! Structured logging with consistent spans. This module provides the
//! subscriber initialisation and the span constructors shared by the store,
//! the collectors and the daemon.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `insight_store=debug`)
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .try_init();
            }
            LogFormat::Pretty => {
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .try_init();
            }
        }
    });
}

/// Creates a span for one collector run.
///
/// # Example
///
/// ```rust
/// use insight_core::observability::collector_span;
///
/// let span = collector_span("deployment_collector", 1_700_000_000);
/// let _guard = span.enter();
/// ```
#[must_use]
pub fn collector_span(job: &str, run_at: i64) -> Span {
    tracing::info_span!("collector", job = job, run_at = run_at)
}

/// Creates a span for a storage layer operation scoped to a project.
#[must_use]
pub fn store_span(operation: &str, project_id: &str) -> Span {
    tracing::debug_span!("insight_store", op = operation, project_id = project_id)
}
