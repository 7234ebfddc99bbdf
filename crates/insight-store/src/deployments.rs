//! Block/chunk layout for completed deployments.
//!
//! Deployments of a project are partitioned by the UTC year of their
//! `completed_at` into blocks (`block_<YYYY>`). Each block owns a metadata
//! document listing its chunks (`chunk_<N>`), and each chunk holds at most
//! `chunk_max_count` deployments. A chunk that reaches the bound is marked
//! completed and never rewritten, which lets readers cache it.
//!
//! Writes land chunk-first, metadata-second. A crash in between leaves a
//! chunk blob that is ahead of its metadata; the next write to that chunk
//! re-reads the blob, absorbs replays through id-based de-duplication and
//! recomputes the summary from the merged content.

use std::collections::{BTreeMap, HashSet};

use tracing::{Instrument, debug, error, warn};

use insight_core::id::{BlockId, ChunkId};
use insight_core::model::{
    ChunkMerge, DeploymentBlockMetadata, DeploymentChunk, DeploymentChunkMetadata, DeploymentData,
};
use insight_core::observability::store_span;
use insight_core::{Error, InsightPaths, ProjectId, Result};

use crate::metrics;
use crate::store::{InsightStore, decode};

/// Outcome of one `put_completed_deployments` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PutReport {
    /// Deployments handed in.
    pub received: usize,
    /// Deployments appended to a chunk.
    pub inserted: usize,
    /// Deployments dropped because their id was already stored.
    pub duplicates: usize,
    /// Chunk blobs written.
    pub chunks_written: usize,
    /// Chunks that became completed during this call.
    pub chunks_completed: usize,
    /// Blocks whose group could not be fully written.
    pub blocks_failed: usize,
}

impl PutReport {
    fn absorb(&mut self, merge: ChunkMerge) {
        self.inserted += merge.appended;
        self.duplicates += merge.duplicates;
    }
}

impl InsightStore {
    /// Appends completed deployments to the project's block/chunk layout.
    ///
    /// The call is idempotent: deployments whose id is already stored are
    /// dropped, so replaying a batch leaves the stored state unchanged.
    /// Blocks are processed independently; a failure in one block does not
    /// stop the others, and the last failure is returned once all blocks
    /// were attempted.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` before writing anything if a timestamp is
    /// out of range, otherwise the last block failure.
    pub async fn put_completed_deployments(
        &self,
        project: &ProjectId,
        deployments: &[DeploymentData],
    ) -> Result<PutReport> {
        let mut report = PutReport {
            received: deployments.len(),
            ..PutReport::default()
        };
        if deployments.is_empty() {
            return Ok(report);
        }

        let mut sorted = deployments.to_vec();
        sorted.sort_by_key(|d| d.completed_at);

        let mut groups: BTreeMap<BlockId, Vec<DeploymentData>> = BTreeMap::new();
        for deployment in sorted {
            let block = BlockId::for_timestamp(deployment.completed_at)?;
            groups.entry(block).or_default().push(deployment);
        }

        let mut last_error = None;
        for (block, group) in groups {
            let span = store_span("put_completed_deployments", project.as_str());
            let result = self
                .put_block(project, block, &group, &mut report)
                .instrument(span)
                .await;
            if let Err(e) = result {
                error!(
                    project_id = %project,
                    block_id = %block,
                    error = %e,
                    "failed to store deployment block"
                );
                report.blocks_failed += 1;
                last_error = Some(e);
            }
        }

        metrics::record_put(report.inserted, report.duplicates, report.chunks_completed);
        match last_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    async fn put_block(
        &self,
        project: &ProjectId,
        block: BlockId,
        group: &[DeploymentData],
        report: &mut PutReport,
    ) -> Result<()> {
        let max = self.config().chunk_max_count;
        let metadata_path = InsightPaths::deployment_block_metadata(project, block);

        let mut metadata = match self
            .read_json::<DeploymentBlockMetadata>(&metadata_path)
            .await?
        {
            Some(metadata) => metadata,
            None => {
                let metadata = DeploymentBlockMetadata::new(block);
                self.write_json(&metadata_path, &metadata).await?;
                metadata
            }
        };

        let fresh = self
            .drop_stored(project, &metadata, group, report)
            .await?;
        let mut remaining: &[DeploymentData] = &fresh;
        let mut index = 0;
        let mut chunk_error = None;

        while let Some(first) = remaining.first() {
            let current = metadata
                .chunk_metadata
                .get(index)
                .cloned()
                .unwrap_or_else(|| DeploymentChunkMetadata::new(index, first.completed_at));

            if current.completed {
                index += 1;
                continue;
            }
            if current.count >= max {
                metadata.chunk_metadata[index].completed = true;
                report.chunks_completed += 1;
                index += 1;
                continue;
            }

            match self.fill_chunk(project, block, current, remaining).await {
                Ok((updated, merge, written)) => {
                    if written {
                        report.chunks_written += 1;
                    }
                    if updated.completed {
                        report.chunks_completed += 1;
                    }
                    report.absorb(merge);
                    remaining = &remaining[merge.consumed..];
                    if index == metadata.chunk_metadata.len() {
                        metadata.chunk_metadata.push(updated);
                    } else {
                        metadata.chunk_metadata[index] = updated;
                    }
                }
                Err(e) => {
                    warn!(
                        project_id = %project,
                        block_id = %block,
                        chunk_id = %ChunkId::new(index),
                        error = %e,
                        "failed to write deployment chunk"
                    );
                    chunk_error = Some(e);
                    break;
                }
            }
            index += 1;
        }

        // Chunks written so far are recorded even if a later one failed.
        self.write_json(&metadata_path, &metadata).await?;
        debug!(
            project_id = %project,
            block_id = %block,
            chunks = metadata.chunk_metadata.len(),
            total = metadata.total_count(),
            "stored deployment block metadata"
        );

        match chunk_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Drops deployments already stored in any chunk whose range covers them,
    /// and repeated ids within the batch itself.
    async fn drop_stored(
        &self,
        project: &ProjectId,
        metadata: &DeploymentBlockMetadata,
        group: &[DeploymentData],
        report: &mut PutReport,
    ) -> Result<Vec<DeploymentData>> {
        let (Some(first), Some(last)) = (group.first(), group.last()) else {
            return Ok(Vec::new());
        };

        let mut known: HashSet<String> = HashSet::new();
        for meta in metadata.overlapping(first.completed_at, last.completed_at) {
            if let Some(chunk) = self.load_chunk(project, metadata.block_id, meta).await? {
                known.extend(chunk.deployments.into_iter().map(|d| d.id));
            }
        }

        let mut fresh = Vec::with_capacity(group.len());
        for deployment in group {
            if known.insert(deployment.id.clone()) {
                fresh.push(deployment.clone());
            } else {
                report.duplicates += 1;
            }
        }
        Ok(fresh)
    }

    /// Merges as many of `remaining` as fit into one chunk and writes it.
    ///
    /// Returns the recomputed chunk summary, the merge outcome and whether
    /// the blob was written. The caller only adopts the summary on success,
    /// so a failed write leaves the block metadata untouched for this chunk.
    async fn fill_chunk(
        &self,
        project: &ProjectId,
        block: BlockId,
        meta: DeploymentChunkMetadata,
        remaining: &[DeploymentData],
    ) -> Result<(DeploymentChunkMetadata, ChunkMerge, bool)> {
        let max = self.config().chunk_max_count;
        let path = InsightPaths::deployment_chunk(project, block, meta.chunk_id);

        let mut chunk = self
            .read_json::<DeploymentChunk>(&path)
            .await?
            .unwrap_or_else(|| DeploymentChunk::new(meta.chunk_id));
        let merge = chunk.merge(remaining, max);

        let written = merge.appended > 0;
        if written {
            self.write_json(&path, &chunk).await?;
        }

        let mut updated = meta;
        updated.count = chunk.len();
        if let Some((min, max_ts)) = chunk.completed_at_bounds() {
            updated.min_timestamp = min;
            updated.max_timestamp = max_ts;
        }
        updated.completed = updated.count >= max;
        Ok((updated, merge, written))
    }

    /// Loads a chunk blob, serving completed chunks through the cache.
    pub(crate) async fn load_chunk(
        &self,
        project: &ProjectId,
        block: BlockId,
        meta: &DeploymentChunkMetadata,
    ) -> Result<Option<DeploymentChunk>> {
        let path = InsightPaths::deployment_chunk(project, block, meta.chunk_id);

        if meta.completed {
            if let Some(bytes) = self.chunk_cache.get(&path) {
                return decode(&path, &bytes).map(Some);
            }
        }

        let Some(bytes) = self.read_bytes(&path).await? else {
            return Ok(None);
        };
        let chunk = decode(&path, &bytes)?;
        if meta.completed {
            self.chunk_cache.insert(path, bytes);
        }
        Ok(Some(chunk))
    }

    /// Reads the metadata of one block, `None` if the block was never written.
    ///
    /// # Errors
    ///
    /// Returns storage or decode failures.
    pub async fn get_block_metadata(
        &self,
        project: &ProjectId,
        block: BlockId,
    ) -> Result<Option<DeploymentBlockMetadata>> {
        self.read_json(&InsightPaths::deployment_block_metadata(project, block))
            .await
    }

    /// Returns every stored deployment with `from <= completed_at <= to`.
    ///
    /// Only chunks whose recorded range overlaps the query are read. The
    /// result is ordered by `completed_at`; ties keep storage order.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidInput` if `from > to`
    /// - `Error::RangeTooLarge` if the range exceeds `max_query_range_secs`;
    ///   no blob is read in that case
    /// - storage or decode failures
    pub async fn list_completed_deployments(
        &self,
        project: &ProjectId,
        from: i64,
        to: i64,
    ) -> Result<Vec<DeploymentData>> {
        if from > to {
            return Err(Error::InvalidInput(format!(
                "from ({from}) must not be after to ({to})"
            )));
        }
        let requested = to.saturating_sub(from);
        let max = self.config().max_query_range_secs;
        if requested > max {
            return Err(Error::RangeTooLarge {
                requested_secs: requested,
                max_secs: max,
            });
        }

        let first_year = BlockId::for_timestamp(from)?.year();
        let last_year = BlockId::for_timestamp(to)?.year();

        let mut deployments = Vec::new();
        for year in first_year..=last_year {
            let block = BlockId::for_year(year);
            let Some(metadata) = self.get_block_metadata(project, block).await? else {
                continue;
            };
            for meta in metadata.overlapping(from, to) {
                let Some(chunk) = self.load_chunk(project, block, meta).await? else {
                    debug!(
                        project_id = %project,
                        block_id = %block,
                        chunk_id = %meta.chunk_id,
                        "chunk listed in metadata is missing"
                    );
                    continue;
                };
                deployments.extend(
                    chunk
                        .deployments
                        .into_iter()
                        .filter(|d| from <= d.completed_at && d.completed_at <= to),
                );
            }
        }

        deployments.sort_by_key(|d| d.completed_at);
        Ok(deployments)
    }
}
