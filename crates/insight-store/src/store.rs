//! Typed accessors over the blob store.
//!
//! [`InsightStore`] is the only component that reads or writes insight
//! documents. It encodes every document as JSON and enforces the layout in
//! [`InsightPaths`]. A missing blob surfaces as `Ok(None)`; every other
//! backend failure is propagated unchanged.

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

use insight_core::config::StoreConfig;
use insight_core::model::{Milestone, ProjectApplicationData};
use insight_core::{Error, InsightPaths, ProjectId, Result, StorageBackend};

use crate::cache::{CacheStats, ChunkCache};
use crate::metrics;

/// Storage layer for application snapshots, the milestone and deployment blocks.
pub struct InsightStore {
    backend: Arc<dyn StorageBackend>,
    config: StoreConfig,
    pub(crate) chunk_cache: ChunkCache,
}

impl std::fmt::Debug for InsightStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InsightStore")
            .field("config", &self.config)
            .field("chunk_cache", &self.chunk_cache.stats())
            .finish_non_exhaustive()
    }
}

impl InsightStore {
    /// Creates a store over `backend`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if `chunk_max_count` or
    /// `max_query_range_secs` is not positive.
    pub fn new(backend: Arc<dyn StorageBackend>, config: StoreConfig) -> Result<Self> {
        if config.chunk_max_count == 0 {
            return Err(Error::InvalidInput(
                "chunk_max_count must be greater than 0".into(),
            ));
        }
        if config.max_query_range_secs <= 0 {
            return Err(Error::InvalidInput(
                "max_query_range_secs must be greater than 0".into(),
            ));
        }
        let chunk_cache = ChunkCache::new(config.chunk_cache_capacity);
        Ok(Self {
            backend,
            config,
            chunk_cache,
        })
    }

    /// Returns the store configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the underlying backend.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Returns completed-chunk cache counters.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.chunk_cache.stats()
    }

    // === Milestone ===

    /// Reads the global milestone, `None` if it was never written.
    ///
    /// # Errors
    ///
    /// Returns storage or decode failures.
    pub async fn get_milestone(&self) -> Result<Option<Milestone>> {
        self.read_json(InsightPaths::MILESTONE).await
    }

    /// Overwrites the global milestone.
    ///
    /// # Errors
    ///
    /// Returns storage or encode failures.
    pub async fn put_milestone(&self, milestone: &Milestone) -> Result<()> {
        self.write_json(InsightPaths::MILESTONE, milestone).await
    }

    // === Application snapshots ===

    /// Reads a project's application snapshot, `None` if none was written.
    ///
    /// # Errors
    ///
    /// Returns storage or decode failures.
    pub async fn get_applications(
        &self,
        project: &ProjectId,
    ) -> Result<Option<ProjectApplicationData>> {
        self.read_json(&InsightPaths::applications(project)).await
    }

    /// Overwrites a project's application snapshot as a whole.
    ///
    /// # Errors
    ///
    /// Returns storage or encode failures.
    pub async fn put_applications(
        &self,
        project: &ProjectId,
        data: &ProjectApplicationData,
    ) -> Result<()> {
        self.write_json(&InsightPaths::applications(project), data)
            .await
    }

    /// Lists the projects that have an application snapshot, sorted.
    ///
    /// # Errors
    ///
    /// Returns the backend's listing failure.
    pub async fn list_application_projects(&self) -> Result<Vec<ProjectId>> {
        let prefix = format!("{}/", InsightPaths::PREFIX);
        let listed = self.backend.list(&prefix).await.inspect_err(|_| {
            metrics::record_blob_error("list");
        })?;
        let mut projects: Vec<ProjectId> = listed
            .iter()
            .filter_map(|meta| InsightPaths::project_of_applications(&meta.path))
            .collect();
        projects.sort();
        projects.dedup();
        Ok(projects)
    }

    // === JSON plumbing ===

    /// Reads raw bytes, mapping not-found to `None`.
    pub(crate) async fn read_bytes(&self, path: &str) -> Result<Option<Bytes>> {
        match self.backend.get(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => {
                metrics::record_blob_error("get");
                Err(e)
            }
        }
    }

    pub(crate) async fn read_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        match self.read_bytes(path).await? {
            Some(bytes) => decode(path, &bytes).map(Some),
            None => Ok(None),
        }
    }

    pub(crate) async fn write_json<T: Serialize>(&self, path: &str, value: &T) -> Result<()> {
        let bytes = encode(path, value)?;
        self.backend.put(path, bytes).await.inspect_err(|_| {
            metrics::record_blob_error("put");
        })
    }
}

pub(crate) fn decode<T: DeserializeOwned>(path: &str, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| Error::serialization(path, e))
}

fn encode<T: Serialize>(path: &str, value: &T) -> Result<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| Error::serialization(path, e))
}
