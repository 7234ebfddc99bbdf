//! Storage layer metrics.
//!
//! Provides metrics for chunk caching, de-duplication and blob failures.
//! These metrics complement the structured logging already in place.

use metrics::{counter, describe_counter};

// ============================================================================
// Metric Names
// ============================================================================

/// Completed-chunk cache hits.
pub const CHUNK_CACHE_HITS: &str = "insight_chunk_cache_hits_total";

/// Completed-chunk cache misses.
pub const CHUNK_CACHE_MISSES: &str = "insight_chunk_cache_misses_total";

/// Deployments dropped because their id was already stored.
pub const DUPLICATE_DEPLOYMENTS: &str = "insight_duplicate_deployments_total";

/// Deployments appended to chunks.
pub const DEPLOYMENTS_STORED: &str = "insight_deployments_stored_total";

/// Chunks that reached their maximum count.
pub const CHUNKS_COMPLETED: &str = "insight_chunks_completed_total";

/// Blob store failures by operation.
pub const BLOB_ERRORS: &str = "insight_blob_errors_total";

// ============================================================================
// Metric Registration
// ============================================================================

/// Registers all storage metric descriptions.
///
/// Call this once at application startup after installing the metrics recorder.
pub fn register_metrics() {
    describe_counter!(CHUNK_CACHE_HITS, "Completed chunk reads served from memory");
    describe_counter!(CHUNK_CACHE_MISSES, "Completed chunk reads that hit the blob store");
    describe_counter!(DUPLICATE_DEPLOYMENTS, "Deployments dropped as duplicates");
    describe_counter!(DEPLOYMENTS_STORED, "Deployments appended to chunks");
    describe_counter!(CHUNKS_COMPLETED, "Chunks marked completed");
    describe_counter!(BLOB_ERRORS, "Blob store operation failures");
}

// ============================================================================
// Recording
// ============================================================================

pub(crate) fn record_chunk_cache_hit() {
    counter!(CHUNK_CACHE_HITS).increment(1);
}

pub(crate) fn record_chunk_cache_miss() {
    counter!(CHUNK_CACHE_MISSES).increment(1);
}

pub(crate) fn record_put(stored: usize, duplicates: usize, completed: usize) {
    counter!(DEPLOYMENTS_STORED).increment(stored as u64);
    counter!(DUPLICATE_DEPLOYMENTS).increment(duplicates as u64);
    counter!(CHUNKS_COMPLETED).increment(completed as u64);
}

pub(crate) fn record_blob_error(op: &'static str) {
    counter!(BLOB_ERRORS, "op" => op).increment(1);
}
