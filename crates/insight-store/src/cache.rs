//! Bounded LRU cache for completed chunk blobs.
//!
//! Completed chunks are immutable, so their bytes can be served from memory
//! once read. Block metadata and open chunks never enter the cache.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use serde::Serialize;

use crate::metrics;

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups answered from memory.
    pub hits: u64,
    /// Lookups that fell through to the backend.
    pub misses: u64,
    /// Entries dropped to respect the capacity.
    pub evictions: u64,
    /// Entries currently held.
    pub entries: usize,
}

/// LRU cache keyed by chunk path.
///
/// Internally synchronized; the lock is never held across an await point.
#[derive(Debug)]
pub struct ChunkCache {
    capacity: usize,
    state: Mutex<LruState>,
}

#[derive(Debug, Default)]
struct LruState {
    /// Path → (bytes, last access tick).
    entries: HashMap<String, (Bytes, u64)>,
    /// Last access tick → path, oldest first.
    recency: BTreeMap<u64, String>,
    tick: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl LruState {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}

impl ChunkCache {
    /// Creates a cache holding at most `capacity` chunks. Zero disables caching.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(LruState::default()),
        }
    }

    /// Returns true if the cache stores anything at all.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    fn lock(&self) -> MutexGuard<'_, LruState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Looks up `path`, refreshing its recency on a hit.
    pub fn get(&self, path: &str) -> Option<Bytes> {
        if !self.is_enabled() {
            return None;
        }
        let mut guard = self.lock();
        let state = &mut *guard;
        let tick = state.next_tick();
        match state.entries.get_mut(path) {
            Some((bytes, last)) => {
                let previous = std::mem::replace(last, tick);
                let bytes = bytes.clone();
                state.recency.remove(&previous);
                state.recency.insert(tick, path.to_string());
                state.hits += 1;
                drop(guard);
                metrics::record_chunk_cache_hit();
                Some(bytes)
            }
            None => {
                state.misses += 1;
                drop(guard);
                metrics::record_chunk_cache_miss();
                None
            }
        }
    }

    /// Inserts or refreshes `path`, evicting the least recently used entry when full.
    pub fn insert(&self, path: impl Into<String>, bytes: Bytes) {
        if !self.is_enabled() {
            return;
        }
        let path = path.into();
        let mut state = self.lock();
        let tick = state.next_tick();

        if let Some((_, previous)) = state.entries.insert(path.clone(), (bytes, tick)) {
            state.recency.remove(&previous);
        }
        state.recency.insert(tick, path);

        while state.entries.len() > self.capacity {
            let Some((_, oldest)) = state.recency.pop_first() else {
                break;
            };
            state.entries.remove(&oldest);
            state.evictions += 1;
        }
    }

    /// Returns current counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            entries: state.entries.len(),
        }
    }
}
