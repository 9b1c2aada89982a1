//! Shared types passed between the catalog, the orchestrator and the API.
//!
//! [`ImageRecord`] is serialized as-is in API responses, so its field names
//! are part of the HTTP contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One catalog row: a logical image and its two artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: Uuid,
    /// URL the caller supplied. Provenance only; never re-fetched.
    pub source_url: String,
    pub full_locator: String,
    pub preview_locator: String,
    /// Decoded source dimensions; 0 when the decode produced no usable size.
    pub width: u32,
    pub height: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ImageRecord {
    pub fn locators(&self) -> [&str; 2] {
        [&self.full_locator, &self.preview_locator]
    }
}

/// Everything an ingestion produces for a record, minus timestamps.
///
/// Used for both inserts and full-replace updates: there is no partial
/// field update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFields {
    pub source_url: String,
    pub full_locator: String,
    pub preview_locator: String,
    pub width: u32,
    pub height: u32,
}

/// A page of records plus the paging arithmetic clients need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    #[serde(rename = "totalPages")]
    pub total_pages: u64,
}
