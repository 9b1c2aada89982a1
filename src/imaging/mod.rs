//! Image transcoding in pure Rust, statically linked.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image` (JPEG, PNG, TIFF, WebP), `avif-parse` + `rav1d` (AVIF) |
//! | **Resize** | Lanczos3 via `DynamicImage::resize_exact` |
//! | **Encode** | AVIF via rav1e (`image::codecs::avif`) |
//! | **Scheduling** | dedicated `rayon` pool |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing each derivative
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: [`transcode`], decode once and encode full + preview
//! - **Pool**: [`TranscodePool`], the async bridge onto the worker threads

pub mod backend;
mod calculations;
pub mod operations;
mod params;
pub mod pool;
pub mod rust_backend;

pub use backend::{Dimensions, ImageBackend, TranscodeError};
pub use calculations::fit_within;
pub use operations::{TranscodeConfig, Transcoded, transcode};
pub use params::{EncodeParams, Quality, Speed};
pub use pool::TranscodePool;
pub use rust_backend::RustBackend;
