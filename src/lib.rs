//! # Gallery Intake
//!
//! Image intake and catalog service for a web gallery. A client hands over a
//! source URL; the service fetches the bytes, transcodes them into a full
//! artifact and a small preview, stores both, and records them in a catalog
//! that the gallery pages through.
//!
//! # Architecture
//!
//! ```text
//! client → api → ingest::Orchestrator → { fetch, imaging, storage, catalog }
//! ```
//!
//! Handlers hold no state of their own; everything shared is an `Arc` of a
//! store, the fetcher or the transcode pool. Transcoding is CPU-bound and
//! runs on a dedicated rayon pool, never on the async runtime.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`api`] | Axum router: `/images` CRUD with pagination, health probes, artifact serving |
//! | [`ingest`] | Create / update / delete flows, paging, orphan sweep |
//! | [`fetch`] | Source download over HTTP(S) with timeout and size cap |
//! | [`imaging`] | Decode (JPEG, PNG, TIFF, WebP, AVIF) and encode full + preview AVIF |
//! | [`storage`] | Artifact blobs: filesystem (durable) or memory |
//! | [`catalog`] | Image records: PostgreSQL or memory |
//! | [`config`] | `gallery.toml` loading, env overrides, validation |
//! | [`bootstrap`] | Turns a config into running components |
//! | [`types`] | Records and pages shared across layers |
//!
//! # Design Decisions
//!
//! ## Artifacts Before Rows
//!
//! Artifacts are written before the catalog row that references them and
//! deleted only after the row stops referencing them. A failure in between
//! can leave an unreferenced artifact (an orphan) but never a record with a
//! dangling locator. Orphans are reclaimed by `gallery-intake sweep`.
//!
//! ## AVIF-Only Output
//!
//! Both derivatives are AVIF. The preview trades quality for size (quality
//! 20, fastest encoder setting, longer edge capped at 480px); the full
//! artifact keeps source dimensions at quality 70.
//!
//! ## Pure-Rust Imaging
//!
//! Decoding and encoding use the `image` crate, `rav1e` and `rav1d`. No
//! system image libraries are needed at build or run time.

pub mod api;
pub mod bootstrap;
pub mod catalog;
pub mod config;
pub mod fetch;
pub mod imaging;
pub mod ingest;
pub mod state;
pub mod storage;
pub mod types;
