//! Filesystem artifact store.
//!
//! Keys map directly to paths under the root directory. A put writes a
//! dot-prefixed temp file next to the target, fsyncs it, then renames it into
//! place, so readers never observe a partially written artifact and a
//! returned locator always points at durable bytes.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;
use walkdir::WalkDir;

use super::{ArtifactStore, PublicUrl, StorageError, StoredArtifact, validate_key};

pub struct FilesystemStore {
    root: PathBuf,
    urls: PublicUrl,
}

impl FilesystemStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            urls: PublicUrl::new(public_base_url),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root and verify it accepts a write/read/delete round trip.
    pub async fn validate(&self) -> Result<(), StorageError> {
        let io_err = |source| StorageError::Io {
            key: ".health-check".into(),
            source,
        };
        fs::create_dir_all(&self.root).await.map_err(io_err)?;
        let probe = self.root.join(".health-check");
        fs::write(&probe, b"ok").await.map_err(io_err)?;
        let read = fs::read(&probe).await.map_err(io_err)?;
        fs::remove_file(&probe).await.map_err(io_err)?;
        if read != b"ok" {
            return Err(io_err(io::Error::new(
                io::ErrorKind::InvalidData,
                "read-back mismatch",
            )));
        }
        Ok(())
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    /// Remove now-empty directories between `path` and the root.
    async fn prune_empty_parents(&self, path: &Path) {
        let mut dir = path.parent();
        while let Some(d) = dir {
            if d == self.root || !d.starts_with(&self.root) {
                break;
            }
            // Fails on non-empty directories, which ends the walk.
            if fs::remove_dir(d).await.is_err() {
                break;
            }
            dir = d.parent();
        }
    }
}

async fn write_durably(path: &Path, tmp: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(tmp).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(tmp, path).await
}

#[async_trait]
impl ArtifactStore for FilesystemStore {
    async fn put(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let path = self.path_for(key)?;
        let io_err = |source| StorageError::Io {
            key: key.to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StorageError::InvalidKey(key.to_string()))?;
        let tmp = path.with_file_name(format!(".{file_name}.{}.tmp", Uuid::new_v4()));

        if let Err(e) = write_durably(&path, &tmp, &bytes).await {
            if let Err(error) = fs::remove_file(&tmp).await {
                tracing::debug!(path = %tmp.display(), %error, "temp file cleanup failed");
            }
            return Err(io_err(e));
        }

        tracing::debug!(key, bytes = bytes.len(), content_type, "artifact stored");
        Ok(self.urls.locator(key))
    }

    async fn delete(&self, locator: &str) -> Result<(), StorageError> {
        let key = self
            .urls
            .key(locator)
            .ok_or_else(|| StorageError::ForeignLocator(locator.to_string()))?;
        let path = self.path_for(key)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(key, "artifact deleted");
                self.prune_empty_parents(&path).await;
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    async fn list(&self) -> Result<Vec<StoredArtifact>, StorageError> {
        let root = self.root.clone();
        let join = tokio::task::spawn_blocking(move || scan_root(&root)).await;
        join.map_err(|e| StorageError::Io {
            key: String::new(),
            source: io::Error::other(e),
        })?
    }

    fn urls(&self) -> &PublicUrl {
        &self.urls
    }
}

/// Walk the root and collect every committed artifact (temp files and
/// other dot-files are skipped).
fn scan_root(root: &Path) -> Result<Vec<StoredArtifact>, StorageError> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut found = Vec::new();
    for entry in WalkDir::new(root).min_depth(1) {
        let entry = entry.map_err(|e| StorageError::Io {
            key: e
                .path()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let key = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if validate_key(&key).is_err() {
            continue;
        }
        let modified = entry
            .metadata()
            .map_err(|e| StorageError::Io {
                key: key.clone(),
                source: e.into(),
            })?
            .modified()
            .map_err(|source| StorageError::Io {
                key: key.clone(),
                source,
            })?;
        found.push(StoredArtifact {
            key,
            modified: DateTime::<Utc>::from(modified),
        });
    }
    found.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(found)
}
