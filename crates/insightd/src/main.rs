//! # insightd
//!
//! Delivery-insight daemon for the control plane.
//!
//! Collects application snapshots and completed deployments from the
//! catalogue on cron schedules, persists them in the insight store, and
//! answers operator queries over what has been stored.
//!
//! ## Modes
//!
//! - **Service Mode**: runs the scheduler with HTTP health and metrics endpoints
//! - **CLI Mode**: one collector pass or one query, for debugging or recovery
//!
//! ## Health Endpoints
//!
//! - `GET /health` - Shallow liveness check (always 200)
//! - `GET /ready` - Readiness check; 503 until the scheduler runs and the
//!   store answers
//! - `GET /metrics` - Prometheus exposition
//!
//! ## Usage
//!
//! ```bash
//! # Run as service
//! insightd --storage-root /var/lib/insight --catalog-url http://catalog:9080 serve
//!
//! # One pass of a collector
//! insightd --catalog-url http://catalog:9080 collect deployments
//!
//! # Query stored insights
//! insightd query frequency --project p1 --from 1700000000 --to 1702000000 --resolution daily
//! ```

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

mod catalog_client;
mod metrics;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, anyhow};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use clap::{Args as ClapArgs, Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use insight_collector::{ApplicationCollector, DeploymentCollector, Scheduler};
use insight_core::config::InsightConfig;
use insight_core::model::Labels;
use insight_core::{LocalFsBackend, LogFormat, MemoryBackend, ProjectId, StorageBackend};
use insight_provider::{DeploymentQuery, InsightMetric, InsightProvider, Resolution};
use insight_store::{CacheStats, InsightStore};

use crate::catalog_client::HttpCatalog;

// ============================================================================
// CLI Arguments
// ============================================================================

/// Delivery-insight collector and query daemon.
#[derive(Debug, Parser)]
#[command(name = "insightd")]
#[command(about = "Collects and serves delivery insights")]
#[command(version)]
struct Args {
    /// Root directory of the blob store. In-memory storage when unset.
    #[arg(long, env = "INSIGHT_STORAGE_ROOT", global = true)]
    storage_root: Option<PathBuf>,

    /// Base URL of the control-plane catalogue.
    #[arg(long, env = "INSIGHT_CATALOG_URL", global = true)]
    catalog_url: Option<String>,

    /// Log output format (`json` or `pretty`).
    #[arg(long, env = "INSIGHT_LOG_FORMAT", default_value = "json", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the scheduler with health and metrics endpoints.
    Serve {
        /// HTTP port for health and metrics endpoints.
        #[arg(long, env = "INSIGHT_PORT", default_value = "8090")]
        port: u16,
    },

    /// Run a single collector pass.
    Collect {
        #[command(subcommand)]
        target: CollectTarget,
    },

    /// Query stored insights and print JSON.
    Query {
        #[command(subcommand)]
        query: QueryCommand,
    },
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum CollectTarget {
    /// Snapshot every project's applications.
    Applications,
    /// Ingest deployments completed since the milestone.
    Deployments,
}

#[derive(Debug, Subcommand)]
enum QueryCommand {
    /// Application counts by kind and active status.
    Counts {
        /// Project id.
        #[arg(long)]
        project: String,
    },
    /// Completed deployments per bucket.
    Frequency(SeriesArgs),
    /// Share of failed deployments per bucket.
    ChangeFailureRate(SeriesArgs),
}

#[derive(Debug, ClapArgs)]
struct SeriesArgs {
    /// Project id.
    #[arg(long)]
    project: String,

    /// Application id; all applications when empty.
    #[arg(long, default_value = "")]
    application: String,

    /// Label selector `key=value`; repeatable.
    #[arg(long = "label", value_parser = parse_label)]
    labels: Vec<(String, String)>,

    /// Inclusive start, unix seconds.
    #[arg(long)]
    from: i64,

    /// Inclusive end, unix seconds.
    #[arg(long)]
    to: i64,

    /// Bucket width (`daily` or `monthly`).
    #[arg(long, default_value = "daily")]
    resolution: Resolution,
}

impl SeriesArgs {
    fn to_query(&self) -> Result<DeploymentQuery> {
        let project = ProjectId::new(self.project.as_str())?;
        let mut query = DeploymentQuery::new(project, self.from, self.to, self.resolution)
            .application(self.application.as_str());
        query.labels = self.labels.iter().cloned().collect::<Labels>();
        Ok(query)
    }
}

fn parse_label(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got {raw:?}")),
    }
}

// ============================================================================
// Wiring
// ============================================================================

fn open_store(args: &Args, config: &InsightConfig) -> Result<Arc<InsightStore>> {
    let backend: Arc<dyn StorageBackend> = match &args.storage_root {
        Some(root) => {
            tracing::info!(root = %root.display(), "using local filesystem storage");
            Arc::new(LocalFsBackend::new(root))
        }
        None => {
            tracing::warn!("INSIGHT_STORAGE_ROOT unset; insights are kept in memory only");
            Arc::new(MemoryBackend::new())
        }
    };
    Ok(Arc::new(InsightStore::new(backend, config.store.clone())?))
}

fn catalog(args: &Args) -> Result<Arc<HttpCatalog>> {
    let url = args
        .catalog_url
        .clone()
        .ok_or_else(|| anyhow!("missing INSIGHT_CATALOG_URL (required to collect)"))?;
    Ok(Arc::new(HttpCatalog::new(url)))
}

// ============================================================================
// Health State
// ============================================================================

/// Shared state for HTTP handlers.
struct ServiceState {
    /// Set once the scheduler has started.
    ready: AtomicBool,
    jobs: Vec<&'static str>,
    store: Arc<InsightStore>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Debug, Serialize)]
struct ReadyResponse {
    ready: bool,
    jobs: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deployment_milestone: Option<i64>,
    chunk_cache: CacheStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

/// GET /health - Shallow liveness check.
async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// GET /ready - Scheduler started and store reachable.
async fn ready(State(state): State<Arc<ServiceState>>) -> impl IntoResponse {
    let started = state.ready.load(Ordering::Acquire);
    let milestone = state.store.get_milestone().await;

    let (store_ok, deployment_milestone, message) = match milestone {
        Ok(m) => (true, m.map(|m| m.deployment_completed_at_milestone), None),
        Err(e) => (false, None, Some(format!("store unavailable: {e}"))),
    };
    let message = if started {
        message
    } else {
        Some("scheduler starting up".to_string())
    };
    let ready = started && store_ok;
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyResponse {
            ready,
            jobs: state.jobs.clone(),
            deployment_milestone,
            chunk_cache: state.store.cache_stats(),
            message,
        }),
    )
}

fn router(state: Arc<ServiceState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics::serve_metrics))
        .with_state(state)
}

// ============================================================================
// Commands
// ============================================================================

async fn serve(args: &Args, config: &InsightConfig, port: u16) -> Result<()> {
    metrics::init_metrics()?;

    let store = open_store(args, config)?;
    let catalog = catalog(args)?;
    let applications = Arc::new(ApplicationCollector::from_config(
        catalog.clone(),
        store.clone(),
        config,
    ));
    let deployments = Arc::new(DeploymentCollector::from_config(
        catalog,
        store.clone(),
        config,
    ));
    let scheduler = Scheduler::from_config(config, applications, deployments)?;
    if scheduler.is_empty() {
        tracing::warn!("no collector enabled; serving health endpoints only");
    }

    let state = Arc::new(ServiceState {
        ready: AtomicBool::new(false),
        jobs: scheduler.job_names(),
        store,
    });

    let cancel = CancellationToken::new();
    let handle = scheduler.start(cancel.clone());
    state.ready.store(true, Ordering::Release);
    metrics::set_scheduler_up(true);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(address = %addr, jobs = ?state.jobs, "starting insight service");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("shutdown signal received"),
            Err(e) => tracing::error!(error = %e, "failed to listen for shutdown signal"),
        }
        shutdown.cancel();
    });

    let server_cancel = cancel.clone();
    let served = axum::serve(listener, router(Arc::clone(&state)))
        .with_graceful_shutdown(async move { server_cancel.cancelled().await })
        .await;

    // Server errors stop the scheduler too.
    cancel.cancel();
    state.ready.store(false, Ordering::Release);
    handle.wait().await;
    metrics::set_scheduler_up(false);
    tracing::info!("insight service stopped");

    served.context("http server failed")
}

async fn collect(args: &Args, config: &InsightConfig, target: CollectTarget) -> Result<()> {
    let store = open_store(args, config)?;
    let catalog = catalog(args)?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    match target {
        CollectTarget::Applications => {
            let report = ApplicationCollector::from_config(catalog, store, config)
                .execute(&cancel)
                .await?;
            tracing::info!(
                applications = report.applications,
                projects_written = report.projects_written,
                projects_cleared = report.projects_cleared,
                projects_failed = ?report.projects_failed,
                "application collection complete"
            );
            if report.stale_scan_failed {
                return Err(anyhow!("failed to list stored application snapshots"));
            }
            if report.had_errors() {
                return Err(anyhow!(
                    "failed to write {} project snapshot(s)",
                    report.projects_failed.len()
                ));
            }
        }
        CollectTarget::Deployments => {
            let report = DeploymentCollector::from_config(catalog, store, config)
                .execute(&cancel)
                .await?;
            tracing::info!(
                from = report.from,
                to = report.to,
                listed = report.listed,
                inserted = report.inserted,
                duplicates = report.duplicates,
                lag_secs = report.lag_secs,
                milestone_advanced = report.milestone_advanced,
                "deployment collection complete"
            );
            if report.had_errors() {
                return Err(anyhow!(
                    "failed to store deployments of {} project(s); milestone kept",
                    report.projects_failed.len()
                ));
            }
        }
    }
    Ok(())
}

async fn query(args: &Args, config: &InsightConfig, command: &QueryCommand) -> Result<()> {
    let provider = InsightProvider::new(open_store(args, config)?);

    let output = match command {
        QueryCommand::Counts { project } => {
            let project = ProjectId::new(project.as_str())?;
            serde_json::to_value(provider.get_application_counts(&project).await?)?
        }
        QueryCommand::Frequency(series) => {
            let points = provider
                .get_data_points(InsightMetric::DeploymentFrequency, &series.to_query()?)
                .await?;
            serde_json::to_value(points)?
        }
        QueryCommand::ChangeFailureRate(series) => {
            let points = provider
                .get_data_points(InsightMetric::ChangeFailureRate, &series.to_query()?)
                .await?;
            serde_json::to_value(points)?
        }
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    insight_core::init_logging(args.log_format);

    let config = InsightConfig::from_env().context("invalid INSIGHT_* configuration")?;

    match &args.command {
        Commands::Serve { port } => serve(&args, &config, *port).await,
        Commands::Collect { target } => collect(&args, &config, *target).await,
        Commands::Query { query: q } => query(&args, &config, q).await,
    }
}
