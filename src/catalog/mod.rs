//! Catalog persistence.
//!
//! The catalog is the source of truth for which artifacts *should* exist.
//! [`CatalogStore`] is the seam; two implementations exist:
//!
//! - [`PgCatalog`]: PostgreSQL via SQLx. Used when a database URL is configured.
//! - [`MemoryCatalog`]: process-local, for development and tests.
//!
//! Listing is always `created_at DESC`, with `id DESC` as the tie-breaker so
//! that offset pagination is stable when timestamps collide.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::types::{ImageFields, ImageRecord};

pub use memory::MemoryCatalog;
pub use postgres::PgCatalog;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("image {0} not found")]
    NotFound(Uuid),
    #[error("image {0} already exists")]
    Duplicate(Uuid),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("catalog operation timed out")]
    Timeout,
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Insert a new record; both timestamps are set to now.
    async fn insert(&self, id: Uuid, fields: ImageFields) -> Result<ImageRecord, CatalogError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<ImageRecord>, CatalogError>;

    /// Replace every mutable field and bump `updated_at`.
    async fn update(&self, id: Uuid, fields: ImageFields) -> Result<ImageRecord, CatalogError>;

    async fn delete(&self, id: Uuid) -> Result<(), CatalogError>;

    /// Records ordered newest first.
    async fn list(&self, offset: u64, limit: u64) -> Result<Vec<ImageRecord>, CatalogError>;

    async fn count(&self) -> Result<u64, CatalogError>;

    /// Every locator referenced by any record. Used by the orphan sweep.
    async fn all_locators(&self) -> Result<Vec<String>, CatalogError>;

    /// Cheap connectivity check for readiness probes.
    async fn ping(&self) -> Result<(), CatalogError>;
}
