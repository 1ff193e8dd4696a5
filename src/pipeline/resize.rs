//! ResizeCanonical: stretch any image to the 1024×1024 canonical square.
//!
//! Aspect ratio is not preserved. The output is always an
//! opaque JPEG; alpha is dropped (not blended) before encoding.

use crate::error::ItemError;
use crate::pipeline::encode::{decode, encode_jpeg};
use image::imageops::FilterType;
use image::DynamicImage;
use tracing::debug;

/// Side length of the canonical square used by resize and the composite canvas.
pub const CANONICAL_SIZE: u32 = 1024;

/// Resampling filter used for every resize in the pipeline (bicubic).
pub const RESIZE_FILTER: FilterType = FilterType::CatmullRom;

/// Decode, stretch to `CANONICAL_SIZE`², drop alpha, re-encode as JPEG.
pub fn resize_canonical(bytes: &[u8]) -> Result<Vec<u8>, ItemError> {
    resize_to(bytes, CANONICAL_SIZE, CANONICAL_SIZE)
}

/// [`resize_canonical`] with an explicit target size.
pub fn resize_to(bytes: &[u8], width: u32, height: u32) -> Result<Vec<u8>, ItemError> {
    let img = decode(bytes)?;
    debug!(
        "Resizing {}x{} → {}x{}",
        img.width(),
        img.height(),
        width,
        height
    );
    let resized = img.resize_exact(width, height, RESIZE_FILTER);
    encode_jpeg(&flatten(resized))
}

/// Convert to a channel layout JPEG can hold: grayscale stays `L8`,
/// everything else becomes `Rgb8`.
fn flatten(img: DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => img,
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}
