//! Canonical blob paths for insight documents.
//!
//! This module is the **single source of truth** for the blob store layout.
//! No hardcoded path strings should exist outside this module.
//!
//! # Path Layout
//!
//! ```text
//! insights/
//! ├── milestone.json
//! └── {project_id}/
//!     ├── applications/
//!     │   └── applications.json
//!     └── deployments/
//!         └── block_{YYYY}/
//!             ├── metadata.json
//!             ├── chunk_0.json
//!             └── chunk_{N}.json
//! ```

use crate::id::{BlockId, ChunkId};
use crate::project::ProjectId;

/// Canonical path generator for insight storage.
///
/// # Example
///
/// ```
/// use insight_core::id::{BlockId, ChunkId};
/// use insight_core::paths::InsightPaths;
/// use insight_core::project::ProjectId;
///
/// let project = ProjectId::new("p1").unwrap();
/// assert_eq!(
///     InsightPaths::deployment_chunk(&project, BlockId::for_year(2023), ChunkId::new(0)),
///     "insights/p1/deployments/block_2023/chunk_0.json"
/// );
/// ```
pub struct InsightPaths;

impl InsightPaths {
    /// Prefix shared by every insight document.
    pub const PREFIX: &'static str = "insights";

    /// Path of the single process-wide milestone document.
    pub const MILESTONE: &'static str = "insights/milestone.json";

    /// Returns the path of a project's application snapshot.
    #[must_use]
    pub fn applications(project: &ProjectId) -> String {
        format!(
            "{}/{project}/applications/applications.json",
            Self::PREFIX
        )
    }

    /// Returns the project owning an application snapshot path, or `None` if
    /// `path` is not a snapshot path.
    #[must_use]
    pub fn project_of_applications(path: &str) -> Option<ProjectId> {
        let project = path
            .strip_prefix(Self::PREFIX)?
            .strip_prefix('/')?
            .strip_suffix("/applications/applications.json")?;
        ProjectId::new(project).ok()
    }

    /// Returns the directory prefix holding all deployment blocks of a project.
    #[must_use]
    pub fn deployments_prefix(project: &ProjectId) -> String {
        format!("{}/{project}/deployments/", Self::PREFIX)
    }

    /// Returns the path of a block's metadata document.
    #[must_use]
    pub fn deployment_block_metadata(project: &ProjectId, block: BlockId) -> String {
        format!("{}/{project}/deployments/{block}/metadata.json", Self::PREFIX)
    }

    /// Returns the path of a chunk blob.
    #[must_use]
    pub fn deployment_chunk(project: &ProjectId, block: BlockId, chunk: ChunkId) -> String {
        format!("{}/{project}/deployments/{block}/{chunk}.json", Self::PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> ProjectId {
        ProjectId::new("p1").unwrap()
    }

    #[test]
    fn snapshot_path_maps_back_to_its_project() {
        let path = InsightPaths::applications(&project());
        assert_eq!(InsightPaths::project_of_applications(&path), Some(project()));
        assert_eq!(InsightPaths::project_of_applications(InsightPaths::MILESTONE), None);
        assert_eq!(
            InsightPaths::project_of_applications(
                "insights/p1/deployments/block_2023/metadata.json"
            ),
            None
        );
        assert_eq!(
            InsightPaths::project_of_applications("insights/a/b/applications/applications.json"),
            None
        );
    }

    #[test]
    fn test_milestone_path() {
        assert_eq!(InsightPaths::MILESTONE, "insights/milestone.json");
    }

    #[test]
    fn test_applications_path() {
        assert_eq!(
            InsightPaths::applications(&project()),
            "insights/p1/applications/applications.json"
        );
    }

    #[test]
    fn test_block_metadata_path() {
        assert_eq!(
            InsightPaths::deployment_block_metadata(&project(), BlockId::for_year(2022)),
            "insights/p1/deployments/block_2022/metadata.json"
        );
    }

    #[test]
    fn test_chunk_path_lives_under_block() {
        let block = BlockId::for_year(2023);
        let chunk = InsightPaths::deployment_chunk(&project(), block, ChunkId::new(7));
        assert_eq!(chunk, "insights/p1/deployments/block_2023/chunk_7.json");
        assert!(chunk.starts_with(&InsightPaths::deployments_prefix(&project())));
    }
}
