//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the two operations every backend must
//! support: decode arbitrary source bytes, and encode one derivative from an
//! already-decoded image. Splitting them lets the transcoder decode once and
//! encode both derivatives from the same pixels.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), pure Rust and statically
//! linked.

use super::params::EncodeParams;
use image::DynamicImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to decode image: {0}")]
    Decode(String),
    #[error("failed to encode image: {0}")]
    Encode(String),
    #[error("transcode worker exited before returning a result")]
    WorkerLost,
}

/// Pixel dimensions of a decoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn of(image: &DynamicImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }
}

/// Trait for image processing backends.
pub trait ImageBackend: Send + Sync {
    /// Decode source bytes in any supported encoding.
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, TranscodeError>;

    /// Encode one derivative of a decoded image.
    fn encode(&self, image: &DynamicImage, params: &EncodeParams)
    -> Result<Vec<u8>, TranscodeError>;

    /// MIME type of everything [`encode`](Self::encode) produces.
    fn content_type(&self) -> &'static str;

    /// File extension matching [`content_type`](Self::content_type).
    fn extension(&self) -> &'static str;
}
