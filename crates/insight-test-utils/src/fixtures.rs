//! Pre-built test fixtures for common test scenarios.
//!
//! Provides builders for catalogue items and stored deployments with
//! sensible defaults, plus a [`TestContext`] wiring a traced backend into an
//! [`InsightStore`].

use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};

use insight_core::catalog::{Application, Deployment, PipelineStage, ROLLBACK_STAGE_NAME};
use insight_core::config::StoreConfig;
use insight_core::model::{ApplicationKind, DeploymentData, DeploymentStatus, Labels};
use insight_core::project::ProjectId;
use insight_store::InsightStore;

use crate::storage::TracingMemoryBackend;

/// Test context with a traced backend and a store over it.
pub struct TestContext {
    /// Shared storage backend.
    pub storage: Arc<TracingMemoryBackend>,
    /// Store over `storage`.
    pub store: Arc<InsightStore>,
    /// Default project.
    pub project: ProjectId,
}

impl TestContext {
    /// Creates a context with the default store configuration.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Creates a context with the given `chunk_max_count`.
    pub fn with_chunk_max_count(chunk_max_count: usize) -> Self {
        Self::with_config(StoreConfig {
            chunk_max_count,
            ..StoreConfig::default()
        })
    }

    /// Creates a context with a specific store configuration.
    pub fn with_config(config: StoreConfig) -> Self {
        let storage = Arc::new(TracingMemoryBackend::new());
        let store = InsightStore::new(storage.clone(), config).expect("valid store config");
        Self {
            storage,
            store: Arc::new(store),
            project: ProjectId::new("p1").expect("valid project id"),
        }
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unix seconds of UTC midnight on the given date.
pub fn ts(year: i32, month: u32, day: u32) -> i64 {
    ts_hms(year, month, day, 0, 0, 0)
}

/// Unix seconds of the given UTC date and time.
pub fn ts_hms(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> i64 {
    let naive = NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, min, sec))
        .expect("valid date");
    Utc.from_utc_datetime(&naive).timestamp()
}

/// Shorthand for a successful stored deployment of app `app-1`.
pub fn deployment_data(id: &str, completed_at: i64) -> DeploymentData {
    DeploymentDataFactory::new(id, completed_at).build()
}

/// Builder for stored [`DeploymentData`].
#[derive(Debug, Clone)]
pub struct DeploymentDataFactory {
    data: DeploymentData,
}

impl DeploymentDataFactory {
    /// Starts a successful deployment of app `app-1` that took one minute.
    pub fn new(id: impl Into<String>, completed_at: i64) -> Self {
        Self {
            data: DeploymentData {
                id: id.into(),
                app_id: "app-1".into(),
                labels: Labels::new(),
                started_at: completed_at - 60,
                completed_at,
                complete_status: DeploymentStatus::Success,
                rollback_started_at: 0,
            },
        }
    }

    /// Sets the application id.
    #[must_use]
    pub fn app(mut self, app_id: impl Into<String>) -> Self {
        self.data.app_id = app_id.into();
        self
    }

    /// Sets the terminal status.
    #[must_use]
    pub fn status(mut self, status: DeploymentStatus) -> Self {
        self.data.complete_status = status;
        self
    }

    /// Adds a label.
    #[must_use]
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.labels.insert(key.into(), value.into());
        self
    }

    /// Returns the deployment.
    pub fn build(self) -> DeploymentData {
        self.data
    }
}

/// Builder for catalogue [`Application`]s.
#[derive(Debug, Clone)]
pub struct ApplicationFactory {
    app: Application,
}

impl ApplicationFactory {
    /// Starts an enabled Kubernetes application.
    pub fn new(id: impl Into<String>, project_id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            app: Application {
                name: format!("{id}-name"),
                id,
                project_id: project_id.into(),
                kind: ApplicationKind::Kubernetes,
                labels: Labels::new(),
                disabled: false,
                deleted: false,
                created_at: 0,
                updated_at: 0,
            },
        }
    }

    /// Sets the kind.
    #[must_use]
    pub fn kind(mut self, kind: ApplicationKind) -> Self {
        self.app.kind = kind;
        self
    }

    /// Marks the application disabled.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.app.disabled = true;
        self
    }

    /// Marks the application deleted.
    #[must_use]
    pub fn deleted(mut self) -> Self {
        self.app.deleted = true;
        self
    }

    /// Sets the creation time.
    #[must_use]
    pub fn created_at(mut self, created_at: i64) -> Self {
        self.app.created_at = created_at;
        self
    }

    /// Adds a label.
    #[must_use]
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.app.labels.insert(key.into(), value.into());
        self
    }

    /// Returns the application.
    pub fn build(self) -> Application {
        self.app
    }
}

/// Builder for catalogue [`Deployment`]s.
#[derive(Debug, Clone)]
pub struct DeploymentFactory {
    deployment: Deployment,
}

impl DeploymentFactory {
    /// Starts a successful Kubernetes deployment created at 0.
    pub fn new(
        id: impl Into<String>,
        application_id: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            deployment: Deployment {
                id: id.into(),
                application_id: application_id.into(),
                project_id: project_id.into(),
                kind: ApplicationKind::Kubernetes,
                labels: Labels::new(),
                status: DeploymentStatus::Success,
                stages: Vec::new(),
                created_at: 0,
                updated_at: 0,
                completed_at: 0,
            },
        }
    }

    /// Sets the completion time; creation is one minute earlier.
    #[must_use]
    pub fn completed_at(mut self, completed_at: i64) -> Self {
        self.deployment.completed_at = completed_at;
        self.deployment.updated_at = completed_at;
        self.deployment.created_at = completed_at - 60;
        self
    }

    /// Sets the status.
    #[must_use]
    pub fn status(mut self, status: DeploymentStatus) -> Self {
        self.deployment.status = status;
        self
    }

    /// Adds a label.
    #[must_use]
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.deployment.labels.insert(key.into(), value.into());
        self
    }

    /// Adds a pipeline stage.
    #[must_use]
    pub fn stage(mut self, name: impl Into<String>, created_at: i64) -> Self {
        let index = self.deployment.stages.len();
        self.deployment.stages.push(PipelineStage {
            id: format!("{}-stage-{index}", self.deployment.id),
            name: name.into(),
            created_at,
        });
        self
    }

    /// Adds a rollback stage created at `created_at`.
    #[must_use]
    pub fn rollback_at(self, created_at: i64) -> Self {
        self.stage(ROLLBACK_STAGE_NAME, created_at)
    }

    /// Returns the deployment.
    pub fn build(self) -> Deployment {
        self.deployment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ts_is_utc_midnight() {
        assert_eq!(ts(2023, 1, 1), 1_672_531_200);
        assert_eq!(ts_hms(2023, 1, 1, 0, 0, 1), 1_672_531_201);
    }

    #[test]
    fn rollback_stage_is_detected() {
        let deployment = DeploymentFactory::new("d1", "a1", "p1")
            .completed_at(500)
            .stage("K8S_SYNC", 100)
            .rollback_at(300)
            .build();
        assert_eq!(deployment.rollback_started_at(), 300);
    }

    #[test]
    fn context_starts_with_empty_storage() {
        let ctx = TestContext::with_chunk_max_count(3);
        assert_eq!(ctx.store.config().chunk_max_count, 3);
        assert!(ctx.storage.paths().is_empty());
    }
}
