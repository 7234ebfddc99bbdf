//! Contract of the application and deployment catalogues.
//!
//! The catalogues are external paginated listing services. Only their
//! listing interface matters here: typed filters, orders, a cursor and a
//! page limit in, one page of items and the next cursor out. An empty
//! cursor in the response means the listing is exhausted.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{ApplicationKind, DeploymentStatus, Labels};

/// Name of the pipeline stage that performs a rollback.
pub const ROLLBACK_STAGE_NAME: &str = "ROLLBACK";

/// An application as returned by the catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    /// Application id.
    pub id: String,
    /// Human readable name.
    #[serde(default)]
    pub name: String,
    /// Owning project.
    pub project_id: String,
    /// Platform kind.
    pub kind: ApplicationKind,
    /// Labels.
    #[serde(default)]
    pub labels: Labels,
    /// Disabled flag.
    #[serde(default)]
    pub disabled: bool,
    /// Deleted flag.
    #[serde(default)]
    pub deleted: bool,
    /// Unix seconds of creation.
    pub created_at: i64,
    /// Unix seconds of last update.
    #[serde(default)]
    pub updated_at: i64,
}

/// One stage of a deployment pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStage {
    /// Stage id.
    pub id: String,
    /// Stage name, e.g. `K8S_SYNC` or `ROLLBACK`.
    pub name: String,
    /// Unix seconds the stage was created.
    pub created_at: i64,
}

impl PipelineStage {
    /// Returns true if this is the rollback stage.
    #[must_use]
    pub fn is_rollback(&self) -> bool {
        self.name == ROLLBACK_STAGE_NAME
    }
}

/// A deployment as returned by the catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    /// Deployment id.
    pub id: String,
    /// Deployed application.
    pub application_id: String,
    /// Owning project.
    pub project_id: String,
    /// Platform kind of the deployed application.
    pub kind: ApplicationKind,
    /// Labels.
    #[serde(default)]
    pub labels: Labels,
    /// Current status.
    pub status: DeploymentStatus,
    /// Pipeline stages.
    #[serde(default)]
    pub stages: Vec<PipelineStage>,
    /// Unix seconds of creation (deployment start).
    pub created_at: i64,
    /// Unix seconds of last update.
    #[serde(default)]
    pub updated_at: i64,
    /// Unix seconds of completion, 0 while running.
    #[serde(default)]
    pub completed_at: i64,
}

impl Deployment {
    /// Returns the creation time of the rollback stage, or 0 if there is none.
    #[must_use]
    pub fn rollback_started_at(&self) -> i64 {
        self.stages
            .iter()
            .find(|stage| stage.is_rollback())
            .map_or(0, |stage| stage.created_at)
    }
}

/// Comparison operator of a list filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    /// `==`
    Eq,
    /// `!=`
    NotEq,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `<=`
    Le,
}

/// Typed value of a list filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// Boolean value.
    Bool(bool),
    /// Integer value (timestamps).
    Int(i64),
    /// String value.
    Str(String),
}

/// A single `field <op> value` listing filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListFilter {
    /// Field name in catalogue terms, e.g. `CompletedAt`.
    pub field: String,
    /// Comparison operator.
    pub operator: FilterOperator,
    /// Right-hand value.
    pub value: FilterValue,
}

impl ListFilter {
    /// Creates a filter.
    #[must_use]
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: FilterValue) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderDirection {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

/// A listing sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListOrder {
    /// Field name in catalogue terms.
    pub field: String,
    /// Direction.
    pub direction: OrderDirection,
}

impl ListOrder {
    /// Ascending order on `field`.
    #[must_use]
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Asc,
        }
    }
}

/// Options of one listing request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ListOptions {
    /// Filters, all of which must hold.
    #[serde(default)]
    pub filters: Vec<ListFilter>,
    /// Sort keys, most significant first.
    #[serde(default)]
    pub orders: Vec<ListOrder>,
    /// Opaque continuation cursor; empty for the first page.
    #[serde(default)]
    pub cursor: String,
    /// Page size.
    pub limit: usize,
}

/// One page of listing results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListPage<T> {
    /// Items of this page.
    pub items: Vec<T>,
    /// Cursor of the next page; empty when exhausted.
    #[serde(default)]
    pub cursor: String,
}

/// Field names understood by the catalogues.
pub mod fields {
    /// Application/deployment id.
    pub const ID: &str = "Id";
    /// Creation time.
    pub const CREATED_AT: &str = "CreatedAt";
    /// Completion time (deployments).
    pub const COMPLETED_AT: &str = "CompletedAt";
    /// Deleted flag (applications).
    pub const DELETED: &str = "Deleted";
}

/// Paginated application catalogue.
#[async_trait]
pub trait ApplicationLister: Send + Sync {
    /// Returns one page of applications.
    async fn list_applications(&self, options: &ListOptions) -> Result<ListPage<Application>>;
}

/// Paginated deployment catalogue.
#[async_trait]
pub trait DeploymentLister: Send + Sync {
    /// Returns one page of deployments.
    async fn list_deployments(&self, options: &ListOptions) -> Result<ListPage<Deployment>>;
}
