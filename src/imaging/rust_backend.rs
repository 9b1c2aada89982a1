//! Pure Rust image processing backend.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Sniff format | `image::guess_format` + ISO-BMFF `ftyp` brand check for AVIF |
//! | Decode (JPEG, PNG, TIFF, WebP) | `image` crate (pure Rust decoders, bounded by [`image::Limits`]) |
//! | Decode (AVIF) | `avif-parse` (container) + `rav1d` (AV1 decode) + YUV→RGB |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` |
//! | Encode → AVIF | `image::codecs::avif::AvifEncoder` (rav1e) |

use super::backend::{ImageBackend, TranscodeError};
use super::calculations::fit_within;
use super::params::EncodeParams;
use image::codecs::avif::AvifEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader, RgbImage};
use std::io::Cursor;

/// Formats whose decoders are compiled in and known to work.
///
/// AVIF is handled separately: the `image` crate's `"avif"` feature only
/// enables the **encoder** (rav1e), and `ImageFormat::reading_enabled()`
/// reports `true` for it anyway, so it cannot be trusted for AVIF input.
const DECODABLE: &[ImageFormat] = &[
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Tiff,
    ImageFormat::WebP,
];

/// Default cap on either source edge. Larger inputs are rejected before
/// any pixel buffer is allocated.
pub const DEFAULT_MAX_DIMENSION: u32 = 16_384;

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend {
    max_dimension: u32,
}

impl RustBackend {
    pub fn new() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }

    pub fn with_max_dimension(max_dimension: u32) -> Self {
        Self { max_dimension }
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// What the source bytes claim to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceFormat {
    Avif,
    Raster(ImageFormat),
}

/// AVIF files are ISO-BMFF: bytes 4..8 are `ftyp`, 8..12 the major brand.
fn is_avif(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[4..8] == b"ftyp" && matches!(&bytes[8..12], b"avif" | b"avis")
}

fn sniff(bytes: &[u8]) -> Result<SourceFormat, TranscodeError> {
    if bytes.is_empty() {
        return Err(TranscodeError::UnsupportedFormat("empty input".into()));
    }
    if is_avif(bytes) {
        return Ok(SourceFormat::Avif);
    }
    match image::guess_format(bytes) {
        Ok(format) if DECODABLE.contains(&format) => Ok(SourceFormat::Raster(format)),
        Ok(format) => Err(TranscodeError::UnsupportedFormat(format!("{format:?}"))),
        Err(_) => Err(TranscodeError::UnsupportedFormat(
            "unrecognized file signature".into(),
        )),
    }
}

impl RustBackend {
    fn decode_raster(&self, bytes: &[u8], format: ImageFormat) -> Result<DynamicImage, TranscodeError> {
        let mut limits = image::Limits::default();
        limits.max_image_width = Some(self.max_dimension);
        limits.max_image_height = Some(self.max_dimension);

        let mut reader = ImageReader::with_format(Cursor::new(bytes), format);
        reader.limits(limits);
        reader
            .decode()
            .map_err(|e| TranscodeError::Decode(format!("{format:?}: {e}")))
    }

    /// Decode AVIF via avif-parse (container) + rav1d (AV1 payload).
    fn decode_avif(&self, bytes: &[u8]) -> Result<DynamicImage, TranscodeError> {
        let avif = avif_parse::read_avif(&mut Cursor::new(bytes))
            .map_err(|e| TranscodeError::Decode(format!("AVIF container: {e:?}")))?;
        let meta = avif
            .primary_item_metadata()
            .map_err(|e| TranscodeError::Decode(format!("AVIF metadata: {e:?}")))?;
        let (w, h) = (meta.max_frame_width.get(), meta.max_frame_height.get());
        if w > self.max_dimension || h > self.max_dimension {
            return Err(TranscodeError::Decode(format!(
                "AVIF dimensions {w}x{h} exceed limit {}",
                self.max_dimension
            )));
        }
        decode_av1(&avif.primary_item)
    }
}

/// Decode a single AV1 frame with rav1d and convert it to RGB8.
fn decode_av1(av1_bytes: &[u8]) -> Result<DynamicImage, TranscodeError> {
    use rav1d::include::dav1d::data::Dav1dData;
    use rav1d::include::dav1d::dav1d::Dav1dSettings;
    use rav1d::include::dav1d::headers::{
        DAV1D_PIXEL_LAYOUT_I400, DAV1D_PIXEL_LAYOUT_I420, DAV1D_PIXEL_LAYOUT_I422,
        DAV1D_PIXEL_LAYOUT_I444,
    };
    use rav1d::include::dav1d::picture::Dav1dPicture;
    use rav1d::src::lib as dav1d;
    use std::ptr::NonNull;

    let mut settings = std::mem::MaybeUninit::<Dav1dSettings>::uninit();
    let settings_ptr = NonNull::new(settings.as_mut_ptr())
        .ok_or_else(|| TranscodeError::Decode("rav1d settings allocation".into()))?;
    unsafe { dav1d::dav1d_default_settings(settings_ptr) };
    let mut settings = unsafe { settings.assume_init() };
    // Decoding runs inside a transcode worker already; stay single-threaded.
    settings.n_threads = 1;
    settings.max_frame_delay = 1;

    let mut ctx = None;
    let rc = unsafe { dav1d::dav1d_open(NonNull::new(&mut ctx), NonNull::new(&mut settings)) };
    if rc.0 != 0 {
        return Err(TranscodeError::Decode(format!("rav1d open failed ({})", rc.0)));
    }

    let mut data = Dav1dData::default();
    let buf_ptr = unsafe { dav1d::dav1d_data_create(NonNull::new(&mut data), av1_bytes.len()) };
    if buf_ptr.is_null() {
        unsafe { dav1d::dav1d_close(NonNull::new(&mut ctx)) };
        return Err(TranscodeError::Decode("rav1d data_create failed".into()));
    }
    unsafe { std::ptr::copy_nonoverlapping(av1_bytes.as_ptr(), buf_ptr, av1_bytes.len()) };

    let rc = unsafe { dav1d::dav1d_send_data(ctx, NonNull::new(&mut data)) };
    if rc.0 != 0 {
        unsafe {
            dav1d::dav1d_data_unref(NonNull::new(&mut data));
            dav1d::dav1d_close(NonNull::new(&mut ctx));
        }
        return Err(TranscodeError::Decode(format!(
            "rav1d send_data failed ({})",
            rc.0
        )));
    }

    let mut pic: Dav1dPicture = unsafe { std::mem::zeroed() };
    let rc = unsafe { dav1d::dav1d_get_picture(ctx, NonNull::new(&mut pic)) };
    if rc.0 != 0 {
        unsafe { dav1d::dav1d_close(NonNull::new(&mut ctx)) };
        return Err(TranscodeError::Decode(format!(
            "rav1d get_picture failed ({})",
            rc.0
        )));
    }

    let subsampling = match pic.p.layout {
        DAV1D_PIXEL_LAYOUT_I400 => Some(None),
        DAV1D_PIXEL_LAYOUT_I420 => Some(Some((true, true))),
        DAV1D_PIXEL_LAYOUT_I422 => Some(Some((true, false))),
        DAV1D_PIXEL_LAYOUT_I444 => Some(Some((false, false))),
        _ => None,
    };

    let planes = match (subsampling, pic.data[0]) {
        (Some(layout), Some(y)) => {
            let y_ptr = y.as_ptr() as *const u8;
            let chroma = match (layout, pic.data[1], pic.data[2]) {
                (Some((ss_x, ss_y)), Some(u), Some(v)) => Some(Chroma {
                    u_ptr: u.as_ptr() as *const u8,
                    v_ptr: v.as_ptr() as *const u8,
                    stride: pic.stride[1],
                    ss_x,
                    ss_y,
                }),
                _ => None,
            };
            Some(YuvPlanes {
                y_ptr,
                y_stride: pic.stride[0],
                chroma,
                width: pic.p.w as u32,
                height: pic.p.h as u32,
                bpc: pic.p.bpc as u32,
            })
        }
        _ => None,
    };

    let rgb = planes.map(|p| p.to_rgb());
    let layout = pic.p.layout;

    unsafe {
        dav1d::dav1d_picture_unref(NonNull::new(&mut pic));
        dav1d::dav1d_close(NonNull::new(&mut ctx));
    }

    rgb.map(DynamicImage::ImageRgb8).ok_or_else(|| {
        TranscodeError::Decode(format!("unsupported AVIF pixel layout: {layout}"))
    })
}

/// Chroma plane pointers plus subsampling (horizontal, vertical).
struct Chroma {
    u_ptr: *const u8,
    v_ptr: *const u8,
    stride: isize,
    ss_x: bool,
    ss_y: bool,
}

/// Decoded planes from rav1d, valid until the picture is unref'd.
/// `chroma` is `None` for monochrome (I400) pictures.
struct YuvPlanes {
    y_ptr: *const u8,
    y_stride: isize,
    chroma: Option<Chroma>,
    width: u32,
    height: u32,
    bpc: u32,
}

impl YuvPlanes {
    /// Convert to RGB8 using BT.601 coefficients.
    fn to_rgb(&self) -> RgbImage {
        let max_val = ((1u32 << self.bpc) - 1) as f32;
        let center = (1u32 << (self.bpc - 1)) as f32;
        let scale = 255.0 / max_val;

        RgbImage::from_fn(self.width, self.height, |col, row| {
            let y = read_sample(self.y_ptr, self.y_stride, col, row, self.bpc);
            let Some(c) = &self.chroma else {
                let v = (y * scale).clamp(0.0, 255.0) as u8;
                return image::Rgb([v, v, v]);
            };
            let cx = if c.ss_x { col / 2 } else { col };
            let cy = if c.ss_y { row / 2 } else { row };
            let cb = read_sample(c.u_ptr, c.stride, cx, cy, self.bpc) - center;
            let cr = read_sample(c.v_ptr, c.stride, cx, cy, self.bpc) - center;

            let to_u8 = |v: f32| (v * scale).clamp(0.0, 255.0) as u8;
            image::Rgb([
                to_u8(y + 1.402 * cr),
                to_u8(y - 0.344136 * cb - 0.714136 * cr),
                to_u8(y + 1.772 * cb),
            ])
        })
    }
}

/// Read one sample from a plane; >8-bit content is stored as u16.
#[inline]
fn read_sample(ptr: *const u8, stride: isize, x: u32, y: u32, bpc: u32) -> f32 {
    if bpc <= 8 {
        (unsafe { *ptr.offset(y as isize * stride + x as isize) }) as f32
    } else {
        let byte_offset = y as isize * stride + x as isize * 2;
        (unsafe { (ptr.offset(byte_offset) as *const u16).read_unaligned() }) as f32
    }
}

impl ImageBackend for RustBackend {
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, TranscodeError> {
        match sniff(bytes)? {
            SourceFormat::Avif => self.decode_avif(bytes),
            SourceFormat::Raster(format) => self.decode_raster(bytes, format),
        }
    }

    fn encode(
        &self,
        image: &DynamicImage,
        params: &EncodeParams,
    ) -> Result<Vec<u8>, TranscodeError> {
        let source = (image.width(), image.height());
        let target = params
            .max_edge
            .map(|edge| fit_within(source, edge))
            .unwrap_or(source);

        let resized;
        let image = if target != source {
            resized = image.resize_exact(target.0, target.1, FilterType::Lanczos3);
            &resized
        } else {
            image
        };

        // rav1e only takes 8-bit RGB(A); normalize 16-bit and grayscale sources.
        let pixels = if image.color().has_alpha() {
            DynamicImage::ImageRgba8(image.to_rgba8())
        } else {
            DynamicImage::ImageRgb8(image.to_rgb8())
        };

        let mut out = Vec::new();
        let encoder = AvifEncoder::new_with_speed_quality(
            &mut out,
            params.speed.value(),
            params.quality.value() as u8,
        );
        pixels
            .write_with_encoder(encoder)
            .map_err(|e| TranscodeError::Encode(format!("AVIF encode failed: {e}")))?;
        Ok(out)
    }

    fn content_type(&self) -> &'static str {
        "image/avif"
    }

    fn extension(&self) -> &'static str {
        "avif"
    }
}
