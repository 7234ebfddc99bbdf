//! Local filesystem storage backend.
//!
//! Maps blob paths onto files under a root directory. Writes go to a
//! sibling temp file first and are renamed into place, so a reader either
//! sees the previous document or the new one.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::storage::{ObjectMeta, StorageBackend};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Storage backend rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalFsBackend {
    root: PathBuf,
}

impl LocalFsBackend {
    /// Creates a backend rooted at `root`. The directory is created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        if path.is_empty() {
            return Err(Error::InvalidInput("empty path".into()));
        }
        if path.contains('\\') || path.contains('\0') {
            return Err(Error::InvalidInput(format!("invalid path: {path}")));
        }
        let relative = Path::new(path);
        for component in relative.components() {
            match component {
                Component::Normal(_) => {}
                _ => {
                    return Err(Error::InvalidInput(format!(
                        "path must be relative without traversal: {path}"
                    )));
                }
            }
        }
        Ok(self.root.join(relative))
    }
}

fn io_error(op: &str, path: &str, err: std::io::Error) -> Error {
    Error::storage_with_source(format!("{op} {path} failed"), err)
}

#[async_trait]
impl StorageBackend for LocalFsBackend {
    async fn get(&self, path: &str) -> Result<Bytes> {
        let file = self.resolve(path)?;
        match tokio::fs::read(&file).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(Error::NotFound(format!("object not found: {path}")))
            }
            Err(e) => Err(io_error("read", path, e)),
        }
    }

    async fn put(&self, path: &str, data: Bytes) -> Result<()> {
        let file = self.resolve(path)?;
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error("create_dir", path, e))?;
        }

        let seq = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut temp = file.clone().into_os_string();
        temp.push(format!(".tmp-{}-{seq}", std::process::id()));
        let temp = PathBuf::from(temp);

        tokio::fs::write(&temp, &data)
            .await
            .map_err(|e| io_error("write", path, e))?;
        if let Err(e) = tokio::fs::rename(&temp, &file).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(io_error("rename", path, e));
        }
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let file = self.resolve(path)?;
        match tokio::fs::remove_file(&file).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error("delete", path, e)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        let mut out = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(io_error("list", prefix, e)),
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| io_error("list", prefix, e))?
            {
                let meta = entry
                    .metadata()
                    .await
                    .map_err(|e| io_error("stat", prefix, e))?;
                let full = entry.path();
                if meta.is_dir() {
                    pending.push(full);
                    continue;
                }
                let Ok(relative) = full.strip_prefix(&self.root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.contains(".tmp-") || !key.starts_with(prefix) {
                    continue;
                }
                out.push(ObjectMeta {
                    path: key,
                    size: meta.len(),
                    last_modified: meta.modified().ok().map(DateTime::<Utc>::from),
                });
            }
        }

        Ok(out)
    }
}
