//! PostgreSQL catalog.
//!
//! All queries run against a single `images` table through a [`PgPool`].
//! Connections are acquired per query and returned to the pool when the
//! query completes, so no handler holds a connection across an await on
//! another system.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use uuid::Uuid;

use super::{CatalogError, CatalogStore};
use crate::config::DatabaseConfig;
use crate::types::{ImageFields, ImageRecord};

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS images (
    id UUID PRIMARY KEY,
    source_url TEXT NOT NULL,
    full_locator TEXT NOT NULL,
    preview_locator TEXT NOT NULL,
    width INT NOT NULL DEFAULT 0,
    height INT NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)";

const CREATE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS images_created_at_idx ON images (created_at DESC, id DESC)";

const COLUMNS: &str =
    "id, source_url, full_locator, preview_locator, width, height, created_at, updated_at";

#[derive(Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open the pool described by `config` and make sure the schema exists.
    pub async fn connect(url: &str, config: &DatabaseConfig) -> Result<Self, CatalogError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(url)
            .await?;
        tracing::info!(max_connections = config.max_connections, "connected to PostgreSQL");

        let catalog = Self::new(pool);
        catalog.ensure_schema().await?;
        Ok(catalog)
    }

    pub async fn ensure_schema(&self) -> Result<(), CatalogError> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_INDEX).execute(&self.pool).await?;
        tracing::info!("catalog schema ready");
        Ok(())
    }

    /// Wait for in-flight queries and close every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("catalog pool closed");
    }
}

#[derive(sqlx::FromRow)]
struct ImageRow {
    id: Uuid,
    source_url: String,
    full_locator: String,
    preview_locator: String,
    width: i32,
    height: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ImageRow {
    fn into_record(self) -> ImageRecord {
        ImageRecord {
            id: self.id,
            source_url: self.source_url,
            full_locator: self.full_locator,
            preview_locator: self.preview_locator,
            width: u32::try_from(self.width).unwrap_or(0),
            height: u32::try_from(self.height).unwrap_or(0),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Dimensions beyond `INT` range cannot come out of the decoder (it caps
/// edges far lower), but saturate rather than wrap if they ever do.
fn to_db_int(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn to_db_bigint(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl CatalogStore for PgCatalog {
    async fn insert(&self, id: Uuid, fields: ImageFields) -> Result<ImageRecord, CatalogError> {
        let now = Utc::now();
        let row = sqlx::query_as::<_, ImageRow>(&format!(
            "INSERT INTO images (id, source_url, full_locator, preview_locator, width, height, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
             RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(&fields.source_url)
        .bind(&fields.full_locator)
        .bind(&fields.preview_locator)
        .bind(to_db_int(fields.width))
        .bind(to_db_int(fields.height))
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                CatalogError::Duplicate(id)
            } else {
                CatalogError::Database(e)
            }
        })?;

        Ok(row.into_record())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<ImageRecord>, CatalogError> {
        let row = sqlx::query_as::<_, ImageRow>(&format!(
            "SELECT {COLUMNS} FROM images WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ImageRow::into_record))
    }

    async fn update(&self, id: Uuid, fields: ImageFields) -> Result<ImageRecord, CatalogError> {
        let row = sqlx::query_as::<_, ImageRow>(&format!(
            "UPDATE images
             SET source_url = $2, full_locator = $3, preview_locator = $4,
                 width = $5, height = $6, updated_at = $7
             WHERE id = $1
             RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(&fields.source_url)
        .bind(&fields.full_locator)
        .bind(&fields.preview_locator)
        .bind(to_db_int(fields.width))
        .bind(to_db_int(fields.height))
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        row.map(ImageRow::into_record)
            .ok_or(CatalogError::NotFound(id))
    }

    async fn delete(&self, id: Uuid) -> Result<(), CatalogError> {
        let result = sqlx::query("DELETE FROM images WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CatalogError::NotFound(id));
        }
        Ok(())
    }

    async fn list(&self, offset: u64, limit: u64) -> Result<Vec<ImageRecord>, CatalogError> {
        let rows = sqlx::query_as::<_, ImageRow>(&format!(
            "SELECT {COLUMNS} FROM images
             ORDER BY created_at DESC, id DESC
             LIMIT $1 OFFSET $2"
        ))
        .bind(to_db_bigint(limit))
        .bind(to_db_bigint(offset))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ImageRow::into_record).collect())
    }

    async fn count(&self) -> Result<u64, CatalogError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM images")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(total).unwrap_or(0))
    }

    async fn all_locators(&self) -> Result<Vec<String>, CatalogError> {
        let pairs: Vec<(String, String)> =
            sqlx::query_as("SELECT full_locator, preview_locator FROM images")
                .fetch_all(&self.pool)
                .await?;
        Ok(pairs.into_iter().flat_map(|(f, p)| [f, p]).collect())
    }

    async fn ping(&self) -> Result<(), CatalogError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
