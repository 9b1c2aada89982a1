//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Calculate output dimensions so the longer edge does not exceed `max_edge`.
///
/// Aspect ratio is preserved and images are never upscaled: if the source
/// already fits, its own dimensions are returned. Neither output edge is
/// allowed to round down to zero.
///
/// # Examples
/// ```
/// # use gallery_intake::imaging::fit_within;
/// // 4000x3000 landscape capped at 480 → 480x360
/// assert_eq!(fit_within((4000, 3000), 480), (480, 360));
///
/// // Already small enough → unchanged
/// assert_eq!(fit_within((320, 200), 480), (320, 200));
/// ```
pub fn fit_within(original: (u32, u32), max_edge: u32) -> (u32, u32) {
    let (orig_w, orig_h) = original;
    let longer_edge = orig_w.max(orig_h);

    if max_edge == 0 || longer_edge <= max_edge {
        return original;
    }

    if orig_w >= orig_h {
        // Landscape or square
        let ratio = max_edge as f64 / orig_w as f64;
        (max_edge, ((orig_h as f64 * ratio).round() as u32).max(1))
    } else {
        // Portrait
        let ratio = max_edge as f64 / orig_h as f64;
        (((orig_w as f64 * ratio).round() as u32).max(1), max_edge)
    }
}
