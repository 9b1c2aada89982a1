//! Bounded worker pool for CPU-bound transcoding.
//!
//! AVIF encoding can take seconds per image. Running it on tokio's worker
//! threads would stall every other request, so transcodes are shipped to a
//! dedicated rayon pool and the result comes back over a oneshot channel.

use super::backend::{ImageBackend, TranscodeError};
use super::operations::{TranscodeConfig, Transcoded, transcode};
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::oneshot;

/// A rayon pool plus the backend and settings every job uses.
pub struct TranscodePool {
    pool: rayon::ThreadPool,
    backend: Arc<dyn ImageBackend>,
    config: TranscodeConfig,
}

impl TranscodePool {
    /// Build a pool with `threads` workers (at least one).
    pub fn new(
        backend: Arc<dyn ImageBackend>,
        config: TranscodeConfig,
        threads: usize,
    ) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("transcode-{i}"))
            .panic_handler(|_| tracing::error!("transcode worker panicked"))
            .build()?;
        tracing::info!(threads = pool.current_num_threads(), "transcode pool ready");
        Ok(Self {
            pool,
            backend,
            config,
        })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Transcode `bytes` on the pool without blocking the async runtime.
    pub async fn transcode(&self, bytes: Bytes) -> Result<Transcoded, TranscodeError> {
        let (tx, rx) = oneshot::channel();
        let backend = Arc::clone(&self.backend);
        let config = self.config;
        self.pool.spawn(move || {
            let result = transcode(backend.as_ref(), &bytes, &config);
            // The receiver is gone only if the request future was dropped.
            let _ = tx.send(result);
        });
        rx.await.map_err(|_| TranscodeError::WorkerLost)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::MockBackend;

    #[tokio::test]
    async fn pool_runs_transcode_off_runtime() {
        let backend = Arc::new(MockBackend::with_dimensions(640, 480));
        let pool = TranscodePool::new(backend, TranscodeConfig::default(), 2).unwrap();

        let out = pool.transcode(Bytes::from_static(b"src")).await.unwrap();
        assert_eq!((out.width, out.height), (640, 480));
        assert_eq!(pool.threads(), 2);
    }

    #[tokio::test]
    async fn pool_propagates_backend_errors() {
        let pool =
            TranscodePool::new(Arc::new(MockBackend::failing()), TranscodeConfig::default(), 1)
                .unwrap();
        let result = pool.transcode(Bytes::from_static(b"src")).await;
        assert!(matches!(result, Err(TranscodeError::Decode(_))));
    }

    #[test]
    fn zero_threads_still_builds_one_worker() {
        let pool =
            TranscodePool::new(Arc::new(MockBackend::failing()), TranscodeConfig::default(), 0)
                .unwrap();
        assert_eq!(pool.threads(), 1);
    }
}
