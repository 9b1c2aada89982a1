//! Artifact storage.
//!
//! An [`ArtifactStore`] holds opaque byte blobs under slash-separated keys
//! and hands back public locators (URLs) for them. Two backends exist:
//!
//! | Backend | Module | Use |
//! |---------|--------|-----|
//! | Filesystem | [`filesystem`] | Production. Durable puts (fsync + atomic rename); the API serves the root under `/artifacts`. |
//! | Memory | [`memory`] | Development and tests. Lost on restart. |
//!
//! ## Keys
//!
//! Every artifact of a record lives under `images/{record_id}/`, with one
//! directory per ingestion attempt:
//!
//! ```text
//! images/5d0c…/9a1f…/full.avif
//! images/5d0c…/9a1f…/preview.avif
//! ```
//!
//! The revision segment changes on every create/update, so an update never
//! overwrites the artifacts the committed row still points at, while a retry
//! inside one attempt overwrites instead of duplicating.

pub mod filesystem;
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

pub use filesystem::FilesystemStore;
pub use memory::MemoryStore;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("invalid artifact key '{0}'")]
    InvalidKey(String),
    #[error("locator '{0}' does not belong to this store")]
    ForeignLocator(String),
    #[error("storage I/O error on '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("storage operation timed out")]
    Timeout,
}

/// Which derivative an artifact holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Full,
    Preview,
}

impl ArtifactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Preview => "preview",
        }
    }
}

/// Build the key for one artifact of one ingestion attempt.
pub fn artifact_key(record: Uuid, revision: Uuid, kind: ArtifactKind, extension: &str) -> String {
    format!("images/{record}/{revision}/{}.{extension}", kind.as_str())
}

/// Reject keys that could escape the store root or collide with temp files.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let ok = !key.is_empty()
        && !key.starts_with('/')
        && !key.contains('\\')
        && key
            .split('/')
            .all(|part| !part.is_empty() && part != "." && part != ".." && !part.starts_with('.'));
    if ok {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

/// Maps keys to public locators under a base URL and back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicUrl {
    base: String,
}

impl PublicUrl {
    pub fn new(base: impl Into<String>) -> Self {
        let mut base = base.into();
        while base.ends_with('/') {
            base.pop();
        }
        Self { base }
    }

    pub fn locator(&self, key: &str) -> String {
        format!("{}/{}", self.base, key)
    }

    /// The key a locator points at, if it was issued under this base.
    pub fn key<'a>(&self, locator: &'a str) -> Option<&'a str> {
        locator
            .strip_prefix(self.base.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|key| !key.is_empty())
    }
}

/// One stored artifact, as reported by [`ArtifactStore::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub key: String,
    pub modified: DateTime<Utc>,
}

/// Content-oriented blob storage.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `bytes` under `key`. The returned locator is valid only once
    /// this returns: the write is durable by then.
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str)
    -> Result<String, StorageError>;

    /// Delete the artifact behind `locator`. Deleting something already
    /// absent succeeds.
    async fn delete(&self, locator: &str) -> Result<(), StorageError>;

    /// Every stored artifact. Used by the orphan sweep.
    async fn list(&self) -> Result<Vec<StoredArtifact>, StorageError>;

    /// Key ⇄ locator mapping for this store.
    fn urls(&self) -> &PublicUrl;
}
