//! Ingestion orchestration.
//!
//! [`Orchestrator`] composes the fetcher, the transcode pool, the artifact
//! store and the catalog into the three write flows plus paging and the
//! orphan sweep.
//!
//! ## Ordering
//!
//! ```text
//! create: fetch → transcode → put(full) ∥ put(preview) → insert
//! update: lookup → fetch → transcode → put(new) → update row → delete(old)
//! delete: lookup → delete(full) ∥ delete(preview) → delete row
//! ```
//!
//! Artifacts are always written before the row that references them and
//! removed only after the row stops referencing them, so a record never
//! points at a missing artifact. When a create or update aborts after
//! uploading, the fresh artifacts are deleted on a best-effort basis; what
//! cannot be deleted is an orphan for [`Orchestrator::sweep`].
//!
//! A catalog write that times out may still have committed. The row is
//! re-read: if it references the fresh artifacts the write counts as done,
//! otherwise the artifacts are left in place for the sweep.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::catalog::{CatalogError, CatalogStore};
use crate::config::ServiceConfig;
use crate::fetch::{FetchError, Fetcher};
use crate::imaging::{TranscodeError, TranscodePool, Transcoded};
use crate::storage::{ArtifactKind, ArtifactStore, StorageError, artifact_key};
use crate::types::{ImageFields, ImageRecord, Page};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("{0}")]
    Validation(String),
    #[error("image {0} not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Transcode(#[from] TranscodeError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Catalog(CatalogError),
}

impl From<CatalogError> for IngestError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound(id) => IngestError::NotFound(id),
            other => IngestError::Catalog(other),
        }
    }
}

/// Upper bounds on single store/catalog calls.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub storage: Duration,
    pub catalog: Duration,
}

impl Timeouts {
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            storage: Duration::from_secs(config.storage.timeout_secs),
            catalog: Duration::from_secs(config.database.timeout_secs),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            storage: Duration::from_secs(30),
            catalog: Duration::from_secs(10),
        }
    }
}

/// Outcome of one orphan sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub referenced: usize,
    pub skipped_young: usize,
    /// Keys deleted, or that would be deleted on a dry run.
    pub orphans: Vec<String>,
    pub failed: usize,
    pub dry_run: bool,
}

#[derive(Clone)]
pub struct Orchestrator {
    fetcher: Arc<dyn Fetcher>,
    transcoder: Arc<TranscodePool>,
    store: Arc<dyn ArtifactStore>,
    catalog: Arc<dyn CatalogStore>,
    timeouts: Timeouts,
}

impl Orchestrator {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        transcoder: Arc<TranscodePool>,
        store: Arc<dyn ArtifactStore>,
        catalog: Arc<dyn CatalogStore>,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            fetcher,
            transcoder,
            store,
            catalog,
            timeouts,
        }
    }

    pub fn catalog(&self) -> &Arc<dyn CatalogStore> {
        &self.catalog
    }

    /// Ingest `url` as a new record.
    pub async fn create(&self, url: &str) -> Result<ImageRecord, IngestError> {
        let url = require_url(url)?;
        let id = Uuid::new_v4();
        let (fields, locators) = self.produce_artifacts(id, url).await?;

        let record = match self.catalog_call(self.catalog.insert(id, fields)).await {
            Ok(record) => record,
            Err(CatalogError::Timeout) => self.confirm_write(id, &locators).await?,
            Err(err) => {
                self.discard(&locators, "create aborted").await;
                return Err(err.into());
            }
        };
        tracing::info!(%id, width = record.width, height = record.height, "image created");
        Ok(record)
    }

    /// Re-ingest record `id` from `url`, replacing both artifacts.
    pub async fn update(&self, id: Uuid, url: &str) -> Result<ImageRecord, IngestError> {
        let url = require_url(url)?;
        let previous = self.get(id).await?;
        let (fields, locators) = self.produce_artifacts(id, url).await?;

        let record = match self.catalog_call(self.catalog.update(id, fields)).await {
            Ok(record) => record,
            Err(CatalogError::Timeout) => self.confirm_write(id, &locators).await?,
            Err(err) => {
                self.discard(&locators, "update aborted").await;
                return Err(err.into());
            }
        };
        tracing::info!(%id, "image updated");

        // The row no longer references the old artifacts.
        self.discard(&previous.locators(), "replaced by update").await;
        Ok(record)
    }

    /// Remove record `id` and, best-effort, its artifacts.
    pub async fn delete(&self, id: Uuid) -> Result<Uuid, IngestError> {
        let record = self.get(id).await?;
        self.discard(&record.locators(), "record deleted").await;
        self.catalog_call(self.catalog.delete(id)).await?;
        tracing::info!(%id, "image deleted");
        Ok(id)
    }

    pub async fn get(&self, id: Uuid) -> Result<ImageRecord, IngestError> {
        self.catalog_call(self.catalog.get_by_id(id))
            .await?
            .ok_or(IngestError::NotFound(id))
    }

    /// One page of records, newest first. `page` and `limit` are 1-based and
    /// already normalized by the caller; zero is treated as one.
    pub async fn list_page(&self, page: u64, limit: u64) -> Result<Page<ImageRecord>, IngestError> {
        let page = page.max(1);
        let limit = limit.max(1);
        let offset = (page - 1).saturating_mul(limit);

        let total = self.catalog_call(self.catalog.count()).await?;
        let data = if offset >= total {
            Vec::new()
        } else {
            self.catalog_call(self.catalog.list(offset, limit)).await?
        };

        Ok(Page {
            data,
            page,
            limit,
            total,
            total_pages: total.div_ceil(limit),
        })
    }

    /// Delete stored artifacts no record references.
    ///
    /// Artifacts younger than `min_age` are skipped: an ingestion may have
    /// uploaded them and not yet committed its row. Fails without deleting
    /// anything if a record holds a locator outside the store's base URL.
    pub async fn sweep(
        &self,
        min_age: Duration,
        dry_run: bool,
    ) -> Result<SweepReport, IngestError> {
        // Listing storage before the catalog means anything committed in
        // between shows up as referenced, never as an orphan.
        let stored = self.storage_call(self.store.list()).await?;
        let locators = self.catalog_call(self.catalog.all_locators()).await?;

        let urls = self.store.urls();
        let mut referenced = HashSet::with_capacity(locators.len());
        let mut foreign = Vec::new();
        for locator in &locators {
            match urls.key(locator) {
                Some(key) => {
                    referenced.insert(key);
                }
                None => foreign.push(locator.as_str()),
            }
        }
        // Records written under another base URL would make their artifacts
        // look unreferenced.
        if let Some(&first) = foreign.first() {
            tracing::error!(
                count = foreign.len(),
                locator = first,
                "catalog references locators outside this store, sweep aborted"
            );
            return Err(StorageError::ForeignLocator(first.to_string()).into());
        }
        let now = Utc::now();
        let cutoff = chrono::Duration::from_std(min_age)
            .ok()
            .and_then(|age| now.checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let mut report = SweepReport {
            scanned: stored.len(),
            dry_run,
            ..SweepReport::default()
        };

        for artifact in stored {
            if referenced.contains(artifact.key.as_str()) {
                report.referenced += 1;
                continue;
            }
            if artifact.modified > cutoff {
                report.skipped_young += 1;
                continue;
            }
            if !dry_run {
                let locator = urls.locator(&artifact.key);
                if let Err(error) = self.storage_call(self.store.delete(&locator)).await {
                    tracing::warn!(key = %artifact.key, %error, "failed to delete orphan");
                    report.failed += 1;
                    continue;
                }
                tracing::debug!(key = %artifact.key, "orphan deleted");
            }
            report.orphans.push(artifact.key);
        }

        tracing::info!(
            scanned = report.scanned,
            referenced = report.referenced,
            orphans = report.orphans.len(),
            skipped_young = report.skipped_young,
            failed = report.failed,
            dry_run,
            "sweep finished"
        );
        Ok(report)
    }

    /// Fetch, transcode and upload both derivatives for record `id`.
    ///
    /// Returns the catalog fields plus the uploaded locators, so the caller
    /// can discard them if its own commit fails.
    async fn produce_artifacts(
        &self,
        id: Uuid,
        url: &str,
    ) -> Result<(ImageFields, [String; 2]), IngestError> {
        let source = self.fetcher.fetch(url).await?;
        tracing::debug!(%id, bytes = source.len(), "source fetched");

        let transcoded = self.transcoder.transcode(source).await?;
        tracing::debug!(
            %id,
            full = transcoded.full.len(),
            preview = transcoded.preview.len(),
            "source transcoded"
        );

        let (width, height) = (transcoded.width, transcoded.height);
        let [full_locator, preview_locator] = self.upload(id, transcoded).await?;
        let fields = ImageFields {
            source_url: url.to_string(),
            full_locator: full_locator.clone(),
            preview_locator: preview_locator.clone(),
            width,
            height,
        };
        Ok((fields, [full_locator, preview_locator]))
    }

    /// Upload both derivatives concurrently under a fresh revision.
    async fn upload(&self, id: Uuid, transcoded: Transcoded) -> Result<[String; 2], IngestError> {
        let revision = Uuid::new_v4();
        let full_key = artifact_key(id, revision, ArtifactKind::Full, transcoded.extension);
        let preview_key = artifact_key(id, revision, ArtifactKind::Preview, transcoded.extension);

        let (full, preview) = tokio::join!(
            self.storage_call(self.store.put(
                &full_key,
                Bytes::from(transcoded.full),
                transcoded.content_type
            )),
            self.storage_call(self.store.put(
                &preview_key,
                Bytes::from(transcoded.preview),
                transcoded.content_type
            )),
        );

        match (full, preview) {
            (Ok(full), Ok(preview)) => Ok([full, preview]),
            (Ok(uploaded), Err(err)) | (Err(err), Ok(uploaded)) => {
                self.discard(&[uploaded], "upload aborted").await;
                Err(err.into())
            }
            (Err(err), Err(_)) => Err(err.into()),
        }
    }

    /// Settle a catalog write that timed out. Returns the row when it
    /// references `locators`; otherwise the artifacts stay for the sweep,
    /// since the write may still land.
    async fn confirm_write(
        &self,
        id: Uuid,
        locators: &[String; 2],
    ) -> Result<ImageRecord, IngestError> {
        match self.catalog_call(self.catalog.get_by_id(id)).await {
            Ok(Some(record))
                if record.full_locator == locators[0] && record.preview_locator == locators[1] =>
            {
                tracing::warn!(%id, "catalog write timed out but committed");
                Ok(record)
            }
            Ok(_) => {
                tracing::warn!(
                    %id,
                    ?locators,
                    "catalog write timed out, artifacts left for sweep"
                );
                Err(CatalogError::Timeout.into())
            }
            Err(error) => {
                tracing::warn!(
                    %id,
                    %error,
                    ?locators,
                    "catalog write outcome unknown, artifacts left for sweep"
                );
                Err(CatalogError::Timeout.into())
            }
        }
    }

    /// Best-effort concurrent delete. Failures are logged and leave orphans.
    async fn discard<S: AsRef<str>>(&self, locators: &[S], reason: &str) {
        let deletes = locators.iter().map(|locator| async move {
            let locator = locator.as_ref();
            if let Err(error) = self.storage_call(self.store.delete(locator)).await {
                tracing::warn!(locator, %error, reason, "artifact left behind");
            }
        });
        join_all(deletes).await;
    }

    async fn storage_call<T>(
        &self,
        fut: impl Future<Output = Result<T, StorageError>>,
    ) -> Result<T, StorageError> {
        tokio::time::timeout(self.timeouts.storage, fut)
            .await
            .map_err(|_| StorageError::Timeout)?
    }

    async fn catalog_call<T>(
        &self,
        fut: impl Future<Output = Result<T, CatalogError>>,
    ) -> Result<T, CatalogError> {
        tokio::time::timeout(self.timeouts.catalog, fut)
            .await
            .map_err(|_| CatalogError::Timeout)?
    }
}

fn require_url(url: &str) -> Result<&str, IngestError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(IngestError::Validation("url must not be blank".into()));
    }
    Ok(url)
}
