//! Test storage with operation tracing.
//!
//! [`TracingMemoryBackend`] behaves like the in-memory backend but records
//! every call, so tests can assert which blobs a store operation touched.
//! Failures can be injected per path prefix and per operation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use chrono::Utc;

use insight_core::error::{Error, Result};
use insight_core::storage::{ObjectMeta, StorageBackend};

/// Record of a storage operation for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageOp {
    /// Get operation.
    Get {
        /// Path that was read.
        path: String,
    },
    /// Put operation.
    Put {
        /// Path that was written.
        path: String,
        /// Size of data written.
        size: usize,
    },
    /// Delete operation.
    Delete {
        /// Path that was deleted.
        path: String,
    },
    /// List operation.
    List {
        /// Prefix that was listed.
        prefix: String,
    },
}

impl StorageOp {
    /// Returns the path or prefix the operation addressed.
    pub fn path(&self) -> &str {
        match self {
            Self::Get { path } | Self::Put { path, .. } | Self::Delete { path } => path,
            Self::List { prefix } => prefix,
        }
    }

    /// Returns true for read operations.
    pub fn is_read(&self) -> bool {
        matches!(self, Self::Get { .. } | Self::List { .. })
    }
}

/// Which calls an injected failure applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOn {
    /// Reads and lists.
    Read,
    /// Writes and deletes.
    Write,
    /// Every call.
    Any,
}

/// In-memory storage backend with operation tracing.
#[derive(Debug, Clone, Default)]
pub struct TracingMemoryBackend {
    data: Arc<Mutex<HashMap<String, Bytes>>>,
    operations: Arc<Mutex<Vec<StorageOp>>>,
    failures: Arc<Mutex<Vec<(String, FailOn)>>>,
}

impl TracingMemoryBackend {
    /// Creates a new empty tracing storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all recorded operations.
    pub fn operations(&self) -> Vec<StorageOp> {
        self.operations.lock().expect("lock").clone()
    }

    /// Clears recorded operations.
    pub fn clear_operations(&self) {
        self.operations.lock().expect("lock").clear();
    }

    /// Fails every call for paths under `prefix`.
    pub fn inject_failure(&self, prefix: impl Into<String>) {
        self.inject_failure_on(prefix, FailOn::Any);
    }

    /// Fails calls of one kind for paths under `prefix`.
    pub fn inject_failure_on(&self, prefix: impl Into<String>, on: FailOn) {
        self.failures.lock().expect("lock").push((prefix.into(), on));
    }

    /// Clears all injected failures.
    pub fn clear_failures(&self) {
        self.failures.lock().expect("lock").clear();
    }

    /// Returns all stored paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<_> = self.data.lock().expect("lock").keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Returns the raw bytes stored at `path` without recording an operation.
    pub fn raw(&self, path: &str) -> Option<Bytes> {
        self.data.lock().expect("lock").get(path).cloned()
    }

    /// Stores raw bytes without recording an operation.
    pub fn seed(&self, path: impl Into<String>, data: impl Into<Bytes>) {
        self.data
            .lock()
            .expect("lock")
            .insert(path.into(), data.into());
    }

    fn record(&self, op: StorageOp) {
        self.operations.lock().expect("lock").push(op);
    }

    fn check_failure(&self, path: &str, write: bool) -> Result<()> {
        let failures = self.failures.lock().expect("lock");
        let hit = failures.iter().any(|(prefix, on)| {
            path.starts_with(prefix.as_str())
                && match on {
                    FailOn::Any => true,
                    FailOn::Read => !write,
                    FailOn::Write => write,
                }
        });
        if hit {
            return Err(Error::storage(format!("injected failure for path: {path}")));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl StorageBackend for TracingMemoryBackend {
    async fn get(&self, path: &str) -> Result<Bytes> {
        self.record(StorageOp::Get {
            path: path.to_string(),
        });
        self.check_failure(path, false)?;

        let data = self.data.lock().expect("lock");
        data.get(path)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("object not found: {path}")))
    }

    async fn put(&self, path: &str, data: Bytes) -> Result<()> {
        self.record(StorageOp::Put {
            path: path.to_string(),
            size: data.len(),
        });
        self.check_failure(path, true)?;

        self.data.lock().expect("lock").insert(path.to_string(), data);
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.record(StorageOp::Delete {
            path: path.to_string(),
        });
        self.check_failure(path, true)?;

        self.data.lock().expect("lock").remove(path);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        self.record(StorageOp::List {
            prefix: prefix.to_string(),
        });
        self.check_failure(prefix, false)?;

        let data = self.data.lock().expect("lock");
        let now = Utc::now();
        let mut listed: Vec<_> = data
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| ObjectMeta {
                path: k.clone(),
                size: v.len() as u64,
                last_modified: Some(now),
            })
            .collect();
        listed.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(listed)
    }
}
