//! High-level image operations.
//!
//! [`transcode`] is the whole Transcoder contract: decode once, encode the
//! full and preview derivatives from the same pixels, and report the source
//! dimensions. It is synchronous and CPU-bound; async callers go through
//! [`TranscodePool`](super::pool::TranscodePool).

use super::backend::{Dimensions, ImageBackend, TranscodeError};
use super::params::EncodeParams;

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, TranscodeError>;

/// Encoding settings for both derivatives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscodeConfig {
    pub full: EncodeParams,
    pub preview: EncodeParams,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            full: EncodeParams::full(),
            preview: EncodeParams::preview(),
        }
    }
}

/// The two derivative encodings of one source image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcoded {
    pub full: Vec<u8>,
    pub preview: Vec<u8>,
    /// Dimensions of the decoded source, not of either derivative.
    pub width: u32,
    pub height: u32,
    pub content_type: &'static str,
    pub extension: &'static str,
}

/// Decode `bytes` and produce the full and preview derivatives.
pub fn transcode(
    backend: &dyn ImageBackend,
    bytes: &[u8],
    config: &TranscodeConfig,
) -> Result<Transcoded> {
    let image = backend.decode(bytes)?;
    let Dimensions { width, height } = Dimensions::of(&image);

    let full = backend.encode(&image, &config.full)?;
    let mut preview = backend.encode(&image, &config.preview)?;

    // Tiny sources can come out of the low-effort encoder larger than the
    // high-effort one; the preview must never cost more than the full image.
    if preview.len() > full.len() {
        preview.clone_from(&full);
    }

    Ok(Transcoded {
        full,
        preview,
        width,
        height,
        content_type: backend.content_type(),
        extension: backend.extension(),
    })
}
