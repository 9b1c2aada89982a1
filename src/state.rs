//! Shared handler state.
//!
//! Everything here is either `Arc`-backed or small and `Clone`; handlers
//! never share mutable state with each other.

use std::path::PathBuf;

use crate::config::PaginationConfig;
use crate::ingest::Orchestrator;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub pagination: PaginationConfig,
    /// Filesystem artifact root served under `/artifacts`, if any.
    pub artifacts_root: Option<PathBuf>,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator, pagination: PaginationConfig) -> Self {
        Self {
            orchestrator,
            pagination,
            artifacts_root: None,
        }
    }

    pub fn serving_artifacts_from(mut self, root: impl Into<PathBuf>) -> Self {
        self.artifacts_root = Some(root.into());
        self
    }
}
