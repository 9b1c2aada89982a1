//! Parameter types for derivative encodings.
//!
//! These structs describe *what* to encode, not *how*. They are the interface
//! between the high-level [`operations`](super::operations) module (which
//! decides which derivatives a source produces) and the
//! [`backend`](super::backend) (which does the pixel work).
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 70). Clamped on construction.
//! - [`Speed`]: Encoder effort (1 = slowest/best, 10 = fastest). Clamped on construction.
//! - [`EncodeParams`]: One derivative: quality, speed, and optional longer-edge cap.

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(70)
    }
}

/// Encoder speed for AVIF (rav1e): 1 spends the most effort, 10 the least.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Speed(pub u8);

impl Speed {
    pub fn new(value: u8) -> Self {
        Self(value.clamp(1, 10))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Speed {
    fn default() -> Self {
        Self(4)
    }
}

/// Parameters for encoding one derivative from a decoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeParams {
    pub quality: Quality,
    pub speed: Speed,
    /// Longer-edge cap in pixels. `None` keeps the source dimensions.
    pub max_edge: Option<u32>,
}

impl EncodeParams {
    /// High-fidelity settings for the full artifact.
    pub fn full() -> Self {
        Self {
            quality: Quality::new(70),
            speed: Speed::new(4),
            max_edge: None,
        }
    }

    /// Byte-size-first settings for the preview artifact.
    pub fn preview() -> Self {
        Self {
            quality: Quality::new(20),
            speed: Speed::new(10),
            max_edge: Some(480),
        }
    }
}
