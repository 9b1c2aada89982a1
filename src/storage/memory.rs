//! In-process artifact store for development and tests.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;

use super::{ArtifactStore, PublicUrl, StorageError, StoredArtifact, validate_key};

#[derive(Debug, Clone)]
pub struct MemoryObject {
    pub bytes: Bytes,
    pub content_type: String,
    pub modified: DateTime<Utc>,
}

pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, MemoryObject>>,
    urls: PublicUrl,
}

impl MemoryStore {
    pub fn new(public_base_url: impl Into<String>) -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            urls: PublicUrl::new(public_base_url),
        }
    }

    /// Look an artifact up by locator, the way a client resolving it would.
    pub fn resolve(&self, locator: &str) -> Option<MemoryObject> {
        let key = self.urls.key(locator)?;
        self.objects.read().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Backdate an artifact's modification time (sweep tests).
    pub fn set_modified(&self, key: &str, modified: DateTime<Utc>) {
        if let Some(obj) = self.objects.write().get_mut(key) {
            obj.modified = modified;
        }
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn put(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<String, StorageError> {
        validate_key(key)?;
        self.objects.write().insert(
            key.to_string(),
            MemoryObject {
                bytes,
                content_type: content_type.to_string(),
                modified: Utc::now(),
            },
        );
        Ok(self.urls.locator(key))
    }

    async fn delete(&self, locator: &str) -> Result<(), StorageError> {
        let key = self
            .urls
            .key(locator)
            .ok_or_else(|| StorageError::ForeignLocator(locator.to_string()))?;
        self.objects.write().remove(key);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<StoredArtifact>, StorageError> {
        Ok(self
            .objects
            .read()
            .iter()
            .map(|(key, obj)| StoredArtifact {
                key: key.clone(),
                modified: obj.modified,
            })
            .collect())
    }

    fn urls(&self) -> &PublicUrl {
        &self.urls
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_resolve() {
        let store = MemoryStore::new("mem://artifacts");
        let locator = store
            .put("images/a/r/full.avif", Bytes::from_static(b"data"), "image/avif")
            .await
            .unwrap();

        let obj = store.resolve(&locator).unwrap();
        assert_eq!(obj.bytes, Bytes::from_static(b"data"));
        assert_eq!(obj.content_type, "image/avif");
    }

    #[tokio::test]
    async fn delete_twice_is_ok() {
        let store = MemoryStore::new("mem://artifacts");
        let locator = store
            .put("images/a/r/full.avif", Bytes::new(), "image/avif")
            .await
            .unwrap();
        store.delete(&locator).await.unwrap();
        store.delete(&locator).await.unwrap();
        assert!(store.is_empty());
        assert!(store.resolve(&locator).is_none());
    }

    #[tokio::test]
    async fn list_is_sorted_by_key() {
        let store = MemoryStore::new("mem://artifacts");
        store.put("b/x", Bytes::new(), "t").await.unwrap();
        store.put("a/x", Bytes::new(), "t").await.unwrap();
        let keys: Vec<_> = store.list().await.unwrap().into_iter().map(|a| a.key).collect();
        assert_eq!(keys, vec!["a/x", "b/x"]);
    }
}
