//! Image codec helpers shared by every stage.
//!
//! Stages take and return encoded bytes, so each one starts with
//! [`decode`] and ends with [`encode_jpeg`] or [`encode_png`]. Failures map
//! to [`ItemError`] so the batch can skip the item instead of aborting.

use crate::error::ItemError;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Quality used for every JPEG output.
pub const JPEG_QUALITY: u8 = 75;

/// Decode bytes of any supported format (PNG, JPEG) into an image.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, ItemError> {
    image::load_from_memory(bytes).map_err(|e| ItemError::DecodeFailure {
        detail: e.to_string(),
    })
}

/// Encode as JPEG.
///
/// JPEG has no alpha channel: callers must pass an `L8` or `Rgb8` image.
pub fn encode_jpeg(img: &DynamicImage) -> Result<Vec<u8>, ItemError> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
    img.write_with_encoder(encoder)
        .map_err(|e| ItemError::EncodeFailure {
            detail: e.to_string(),
        })?;
    debug!("Encoded {}x{} → {} bytes JPEG", img.width(), img.height(), buf.len());
    Ok(buf)
}

/// Encode as PNG, preserving any alpha channel.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, ItemError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| ItemError::EncodeFailure {
            detail: e.to_string(),
        })?;
    debug!("Encoded {}x{} → {} bytes PNG", img.width(), img.height(), buf.len());
    Ok(buf)
}
