//! Startup wiring: config in, running components out.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::catalog::{CatalogError, CatalogStore, MemoryCatalog, PgCatalog};
use crate::config::{ServiceConfig, StorageBackendKind, effective_threads};
use crate::fetch::HttpFetcher;
use crate::imaging::{RustBackend, TranscodePool};
use crate::ingest::{Orchestrator, Timeouts};
use crate::state::AppState;
use crate::storage::{ArtifactStore, FilesystemStore, MemoryStore, StorageError};

#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("catalog: {0}")]
    Catalog(#[from] CatalogError),
    #[error("artifact store: {0}")]
    Storage(#[from] StorageError),
    #[error("HTTP client: {0}")]
    Http(#[from] reqwest::Error),
    #[error("transcode pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Every long-lived component of a running service.
pub struct Service {
    pub orchestrator: Orchestrator,
    pub artifacts_root: Option<PathBuf>,
    postgres: Option<PgCatalog>,
}

impl Service {
    pub fn app_state(&self, config: &ServiceConfig) -> AppState {
        let state = AppState::new(self.orchestrator.clone(), config.pagination.clone());
        match &self.artifacts_root {
            Some(root) => state.serving_artifacts_from(root),
            None => state,
        }
    }

    /// Release the database pool. Call after the server has drained.
    pub async fn shutdown(&self) {
        if let Some(pg) = &self.postgres {
            pg.close().await;
        }
    }
}

pub async fn bootstrap(config: &ServiceConfig) -> Result<Service, BootstrapError> {
    let (catalog, postgres) = match &config.database.url {
        Some(url) => {
            let pg = PgCatalog::connect(url, &config.database).await?;
            (Arc::new(pg.clone()) as Arc<dyn CatalogStore>, Some(pg))
        }
        None => {
            tracing::warn!("no database URL configured, using the in-memory catalog");
            (Arc::new(MemoryCatalog::new()) as Arc<dyn CatalogStore>, None)
        }
    };

    let (store, artifacts_root) = match config.storage.backend {
        StorageBackendKind::Filesystem => {
            let fs = FilesystemStore::new(&config.storage.root, &config.storage.public_base_url);
            fs.validate().await?;
            tracing::info!(root = %fs.root().display(), "filesystem artifact store ready");
            let root = fs.root().to_path_buf();
            (Arc::new(fs) as Arc<dyn ArtifactStore>, Some(root))
        }
        StorageBackendKind::Memory => {
            tracing::warn!("using the in-memory artifact store, nothing survives a restart");
            let store = MemoryStore::new(&config.storage.public_base_url);
            (Arc::new(store) as Arc<dyn ArtifactStore>, None)
        }
    };

    let fetcher = Arc::new(HttpFetcher::new(&config.fetch)?);

    let settings = &config.transcode;
    let pool = TranscodePool::new(
        Arc::new(RustBackend::with_max_dimension(settings.max_dimension)),
        settings.transcode_config(),
        effective_threads(settings),
    )?;

    let orchestrator = Orchestrator::new(
        fetcher,
        Arc::new(pool),
        store,
        catalog,
        Timeouts::from_config(config),
    );

    Ok(Service {
        orchestrator,
        artifacts_root,
        postgres,
    })
}
