//! In-memory catalog. Same contract as [`PgCatalog`](super::PgCatalog),
//! nothing survives a restart.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::cmp::Reverse;
use std::collections::HashMap;
use uuid::Uuid;

use super::{CatalogError, CatalogStore};
use crate::types::{ImageFields, ImageRecord};

#[derive(Default)]
pub struct MemoryCatalog {
    rows: RwLock<HashMap<Uuid, ImageRecord>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn insert(&self, id: Uuid, fields: ImageFields) -> Result<ImageRecord, CatalogError> {
        let mut rows = self.rows.write();
        if rows.contains_key(&id) {
            return Err(CatalogError::Duplicate(id));
        }
        let now = Utc::now();
        let record = ImageRecord {
            id,
            source_url: fields.source_url,
            full_locator: fields.full_locator,
            preview_locator: fields.preview_locator,
            width: fields.width,
            height: fields.height,
            created_at: now,
            updated_at: now,
        };
        rows.insert(id, record.clone());
        Ok(record)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<ImageRecord>, CatalogError> {
        Ok(self.rows.read().get(&id).cloned())
    }

    async fn update(&self, id: Uuid, fields: ImageFields) -> Result<ImageRecord, CatalogError> {
        let mut rows = self.rows.write();
        let row = rows.get_mut(&id).ok_or(CatalogError::NotFound(id))?;
        row.source_url = fields.source_url;
        row.full_locator = fields.full_locator;
        row.preview_locator = fields.preview_locator;
        row.width = fields.width;
        row.height = fields.height;
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<(), CatalogError> {
        self.rows
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or(CatalogError::NotFound(id))
    }

    async fn list(&self, offset: u64, limit: u64) -> Result<Vec<ImageRecord>, CatalogError> {
        let mut all: Vec<ImageRecord> = self.rows.read().values().cloned().collect();
        all.sort_by_key(|r| Reverse((r.created_at, r.id)));
        Ok(all
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .collect())
    }

    async fn count(&self) -> Result<u64, CatalogError> {
        Ok(self.rows.read().len() as u64)
    }

    async fn all_locators(&self) -> Result<Vec<String>, CatalogError> {
        Ok(self
            .rows
            .read()
            .values()
            .flat_map(|r| [r.full_locator.clone(), r.preview_locator.clone()])
            .collect())
    }

    async fn ping(&self) -> Result<(), CatalogError> {
        Ok(())
    }
}
