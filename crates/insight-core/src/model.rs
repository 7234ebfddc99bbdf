//! Persisted insight documents.
//!
//! Every document is JSON with stable lower_snake_case keys. Unknown keys are
//! tolerated on read and dropped on rewrite.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::{BlockId, ChunkId};

/// Free-form string labels attached to applications and deployments.
pub type Labels = BTreeMap<String, String>;

/// Platform an application deploys to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ApplicationKind {
    /// Kubernetes manifests.
    #[serde(rename = "KUBERNETES")]
    Kubernetes,
    /// Terraform modules.
    #[serde(rename = "TERRAFORM")]
    Terraform,
    /// AWS Lambda functions.
    #[serde(rename = "LAMBDA")]
    Lambda,
    /// Google Cloud Run services.
    #[serde(rename = "CLOUDRUN")]
    CloudRun,
    /// AWS ECS services.
    #[serde(rename = "ECS")]
    Ecs,
}

impl ApplicationKind {
    /// Returns the wire name of this kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Kubernetes => "KUBERNETES",
            Self::Terraform => "TERRAFORM",
            Self::Lambda => "LAMBDA",
            Self::CloudRun => "CLOUDRUN",
            Self::Ecs => "ECS",
        }
    }
}

impl fmt::Display for ApplicationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Active status of an application in a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationActiveStatus {
    /// Application is live.
    Enabled,
    /// Application exists but is disabled.
    Disabled,
    /// Application has been deleted.
    Deleted,
}

impl ApplicationActiveStatus {
    /// Derives the status from the catalogue's flag pair. Deletion wins.
    #[must_use]
    pub const fn from_flags(disabled: bool, deleted: bool) -> Self {
        if deleted {
            Self::Deleted
        } else if disabled {
            Self::Disabled
        } else {
            Self::Enabled
        }
    }

    /// Returns the wire name of this status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Enabled => "ENABLED",
            Self::Disabled => "DISABLED",
            Self::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for ApplicationActiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One application in a project snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationData {
    /// Application id.
    pub id: String,
    /// Application labels.
    #[serde(default)]
    pub labels: Labels,
    /// Platform kind.
    pub kind: ApplicationKind,
    /// Active status.
    pub status: ApplicationActiveStatus,
}

/// Full application snapshot of one project.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProjectApplicationData {
    /// Applications in catalogue order.
    #[serde(default)]
    pub applications: Vec<ApplicationData>,
    /// Unix seconds at which the snapshot was built.
    pub updated_at: i64,
}

/// Lifecycle status of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeploymentStatus {
    /// Waiting to be planned.
    #[serde(rename = "DEPLOYMENT_PENDING")]
    Pending,
    /// Planned, waiting to run.
    #[serde(rename = "DEPLOYMENT_PLANNED")]
    Planned,
    /// Running.
    #[serde(rename = "DEPLOYMENT_RUNNING")]
    Running,
    /// Rolling back after a failure or cancellation.
    #[serde(rename = "DEPLOYMENT_ROLLING_BACK")]
    RollingBack,
    /// Completed successfully.
    #[serde(rename = "DEPLOYMENT_SUCCESS")]
    Success,
    /// Completed with a failure.
    #[serde(rename = "DEPLOYMENT_FAILURE")]
    Failure,
    /// Cancelled by a user.
    #[serde(rename = "DEPLOYMENT_CANCELLED")]
    Cancelled,
}

impl DeploymentStatus {
    /// Returns true for terminal statuses.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Cancelled)
    }

    /// Returns the wire name of this status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "DEPLOYMENT_PENDING",
            Self::Planned => "DEPLOYMENT_PLANNED",
            Self::Running => "DEPLOYMENT_RUNNING",
            Self::RollingBack => "DEPLOYMENT_ROLLING_BACK",
            Self::Success => "DEPLOYMENT_SUCCESS",
            Self::Failure => "DEPLOYMENT_FAILURE",
            Self::Cancelled => "DEPLOYMENT_CANCELLED",
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One completed deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentData {
    /// Deployment id.
    pub id: String,
    /// Id of the deployed application.
    pub app_id: String,
    /// Deployment labels.
    #[serde(default)]
    pub labels: Labels,
    /// Unix seconds the deployment started.
    pub started_at: i64,
    /// Unix seconds the deployment completed.
    pub completed_at: i64,
    /// Terminal status.
    pub complete_status: DeploymentStatus,
    /// Unix seconds the rollback stage started, 0 if none.
    #[serde(default)]
    pub rollback_started_at: i64,
}

impl DeploymentData {
    /// Returns true if the deployment ended in failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.complete_status == DeploymentStatus::Failure
    }

    /// Returns true if every requested label is present with the same value.
    #[must_use]
    pub fn matches_labels(&self, selector: &Labels) -> bool {
        selector
            .iter()
            .all(|(k, v)| self.labels.get(k).is_some_and(|actual| actual == v))
    }
}

/// Outcome of merging deployments into a chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkMerge {
    /// Number of input deployments examined (appended or dropped).
    pub consumed: usize,
    /// Number of deployments appended.
    pub appended: usize,
    /// Number of deployments dropped because their id was already present.
    pub duplicates: usize,
}

/// Ordered container of deployments sharing a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentChunk {
    /// Chunk id.
    pub chunk_id: ChunkId,
    /// Deployments in insertion order.
    #[serde(default)]
    pub deployments: Vec<DeploymentData>,
}

impl DeploymentChunk {
    /// Creates an empty chunk.
    #[must_use]
    pub fn new(chunk_id: ChunkId) -> Self {
        Self {
            chunk_id,
            deployments: Vec::new(),
        }
    }

    /// Returns the number of stored deployments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.deployments.len()
    }

    /// Returns true if the chunk holds no deployments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deployments.is_empty()
    }

    /// Returns the ids of every stored deployment.
    #[must_use]
    pub fn ids(&self) -> HashSet<&str> {
        self.deployments.iter().map(|d| d.id.as_str()).collect()
    }

    /// Merges `incoming` into the chunk, de-duplicating by id.
    ///
    /// Existing deployments keep their order and new ones are appended in
    /// input order. Merging stops at the first new deployment that would
    /// push the chunk past `max_count`; duplicates never count against it.
    pub fn merge(&mut self, incoming: &[DeploymentData], max_count: usize) -> ChunkMerge {
        let mut seen: HashSet<String> = self.deployments.iter().map(|d| d.id.clone()).collect();
        let mut outcome = ChunkMerge::default();

        for deployment in incoming {
            if seen.contains(&deployment.id) {
                outcome.duplicates += 1;
            } else if self.deployments.len() < max_count {
                seen.insert(deployment.id.clone());
                self.deployments.push(deployment.clone());
                outcome.appended += 1;
            } else {
                break;
            }
            outcome.consumed += 1;
        }

        outcome
    }

    /// Returns the `(min, max)` of `completed_at` across the chunk.
    #[must_use]
    pub fn completed_at_bounds(&self) -> Option<(i64, i64)> {
        self.deployments.iter().fold(None, |acc, d| match acc {
            None => Some((d.completed_at, d.completed_at)),
            Some((lo, hi)) => Some((lo.min(d.completed_at), hi.max(d.completed_at))),
        })
    }
}

/// Summary of one chunk, held in its block metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentChunkMetadata {
    /// Chunk id.
    pub chunk_id: ChunkId,
    /// 0-based position within the block.
    pub chunk_index: usize,
    /// Smallest `completed_at` in the chunk.
    pub min_timestamp: i64,
    /// Largest `completed_at` in the chunk.
    pub max_timestamp: i64,
    /// Number of stored deployments.
    pub count: usize,
    /// Set once the chunk is full; a completed chunk is never rewritten.
    pub completed: bool,
}

impl DeploymentChunkMetadata {
    /// Creates metadata for a fresh, empty chunk.
    #[must_use]
    pub fn new(index: usize, first_timestamp: i64) -> Self {
        Self {
            chunk_id: ChunkId::new(index),
            chunk_index: index,
            min_timestamp: first_timestamp,
            max_timestamp: first_timestamp,
            count: 0,
            completed: false,
        }
    }

    /// Returns true if `[min_timestamp, max_timestamp]` overlaps `[from, to]`.
    #[must_use]
    pub const fn overlaps(&self, from: i64, to: i64) -> bool {
        !(self.max_timestamp < from || self.min_timestamp > to)
    }
}

/// All chunk summaries of one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentBlockMetadata {
    /// Block id.
    pub block_id: BlockId,
    /// Chunk summaries ordered by `chunk_index`.
    #[serde(default)]
    pub chunk_metadata: Vec<DeploymentChunkMetadata>,
}

impl DeploymentBlockMetadata {
    /// Creates empty metadata for a block.
    #[must_use]
    pub fn new(block_id: BlockId) -> Self {
        Self {
            block_id,
            chunk_metadata: Vec::new(),
        }
    }

    /// Returns the chunks whose timestamp range overlaps `[from, to]`.
    pub fn overlapping(&self, from: i64, to: i64) -> impl Iterator<Item = &DeploymentChunkMetadata> {
        self.chunk_metadata
            .iter()
            .filter(move |meta| meta.count > 0 && meta.overlaps(from, to))
    }

    /// Returns the total number of deployments recorded in this block.
    #[must_use]
    pub fn total_count(&self) -> usize {
        self.chunk_metadata.iter().map(|meta| meta.count).sum()
    }
}

/// Watermark of deployment collector progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    /// Unix seconds up to which completed deployments have been persisted.
    pub deployment_completed_at_milestone: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deployment(id: &str, completed_at: i64) -> DeploymentData {
        DeploymentData {
            id: id.to_string(),
            app_id: "app".to_string(),
            labels: Labels::new(),
            started_at: completed_at - 10,
            completed_at,
            complete_status: DeploymentStatus::Success,
            rollback_started_at: 0,
        }
    }

    #[test]
    fn status_from_flags_prefers_deleted() {
        assert_eq!(
            ApplicationActiveStatus::from_flags(true, true),
            ApplicationActiveStatus::Deleted
        );
        assert_eq!(
            ApplicationActiveStatus::from_flags(true, false),
            ApplicationActiveStatus::Disabled
        );
        assert_eq!(
            ApplicationActiveStatus::from_flags(false, false),
            ApplicationActiveStatus::Enabled
        );
    }

    #[test]
    fn merge_drops_duplicates_and_preserves_order() {
        let mut chunk = DeploymentChunk::new(ChunkId::new(0));
        chunk.merge(&[deployment("d1", 1), deployment("d2", 2)], 10);

        let outcome = chunk.merge(&[deployment("d2", 2), deployment("d3", 3)], 10);
        assert_eq!(outcome.appended, 1);
        assert_eq!(outcome.duplicates, 1);
        assert_eq!(outcome.consumed, 2);
        let ids: Vec<_> = chunk.deployments.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["d1", "d2", "d3"]);
    }

    #[test]
    fn merge_stops_at_capacity() {
        let mut chunk = DeploymentChunk::new(ChunkId::new(0));
        let outcome = chunk.merge(
            &[
                deployment("d1", 1),
                deployment("d2", 2),
                deployment("d1", 1),
                deployment("d3", 3),
            ],
            2,
        );
        assert_eq!(chunk.len(), 2);
        assert_eq!(outcome.consumed, 3);
        assert_eq!(outcome.duplicates, 1);
    }

    #[test]
    fn chunk_metadata_overlap_is_inclusive() {
        let mut meta = DeploymentChunkMetadata::new(0, 100);
        meta.max_timestamp = 200;
        assert!(meta.overlaps(200, 300));
        assert!(meta.overlaps(0, 100));
        assert!(!meta.overlaps(201, 300));
        assert!(!meta.overlaps(0, 99));
    }

    #[test]
    fn deployment_json_uses_snake_case_keys() {
        let json = serde_json::to_value(deployment("d1", 100)).unwrap();
        for key in [
            "id",
            "app_id",
            "labels",
            "started_at",
            "completed_at",
            "complete_status",
            "rollback_started_at",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert_eq!(json["complete_status"], "DEPLOYMENT_SUCCESS");
    }

    #[test]
    fn extra_keys_are_tolerated_on_read() {
        let json = r#"{"block_id":"block_2023","chunk_metadata":[],"legacy":true}"#;
        let meta: DeploymentBlockMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.block_id, BlockId::for_year(2023));
        assert!(!serde_json::to_string(&meta).unwrap().contains("legacy"));
    }

    #[test]
    fn label_selector_is_subset_match() {
        let mut d = deployment("d1", 1);
        d.labels.insert("env".into(), "prod".into());
        d.labels.insert("team".into(), "core".into());

        let mut selector = Labels::new();
        assert!(d.matches_labels(&selector));
        selector.insert("env".into(), "prod".into());
        assert!(d.matches_labels(&selector));
        selector.insert("team".into(), "infra".into());
        assert!(!d.matches_labels(&selector));
    }
}
