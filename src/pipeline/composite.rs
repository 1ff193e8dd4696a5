//! CompositeOnBackground: centre a (cut-out) foreground on a background.
//!
//! ## Geometry
//!
//! The background is stretched to the 1024×1024 canvas. With
//! `resize_foreground` the foreground is scaled uniformly so its area is
//! [`FOREGROUND_TARGET_AREA`] px²:
//!
//! ```text
//! k = sqrt(400_000 / (w × h))        new size = (trunc(w·k), trunc(h·k))
//! ```
//!
//! The offset is `((canvas_w − fg_w) div 2, (canvas_h − fg_h) div 2)` with
//! floor division, so a foreground larger than the canvas gets a negative
//! offset and is clipped on every side.
//!
//! ## Blending
//!
//! The foreground alpha is a paste mask applied to *every* channel,
//! including alpha: `out = (fg·a + bg·(255 − a) + 127) / 255`. This is a
//! cut-out paste, not Porter-Duff "over".

use crate::error::ItemError;
use crate::pipeline::encode::{decode, encode_png};
use crate::pipeline::resize::{CANONICAL_SIZE, RESIZE_FILTER};
use image::imageops;
use image::{DynamicImage, RgbaImage};
use tracing::debug;

/// Pixel area the foreground is scaled to when `resize_foreground` is set.
pub const FOREGROUND_TARGET_AREA: f64 = 400_000.0;

/// Decode both images, composite, re-encode as PNG.
pub fn composite_on_background(
    foreground: &[u8],
    background: &[u8],
    resize_foreground: bool,
) -> Result<Vec<u8>, ItemError> {
    let fg = decode(foreground)?.to_rgba8();
    let bg = decode(background)?.to_rgba8();
    let combined = composite_images(&fg, &bg, resize_foreground);
    encode_png(&DynamicImage::ImageRgba8(combined))
}

/// Pixel-level composite on already-decoded images.
pub fn composite_images(fg: &RgbaImage, bg: &RgbaImage, resize_foreground: bool) -> RgbaImage {
    let mut canvas = imageops::resize(bg, CANONICAL_SIZE, CANONICAL_SIZE, RESIZE_FILTER);

    let scaled;
    let fg = if resize_foreground {
        let (w, h) = scaled_foreground_size(fg.width(), fg.height());
        debug!("Scaling foreground {}x{} → {}x{}", fg.width(), fg.height(), w, h);
        scaled = imageops::resize(fg, w, h, RESIZE_FILTER);
        &scaled
    } else {
        fg
    };

    let (x, y) = center_offset(canvas.dimensions(), fg.dimensions());
    paste_with_alpha_mask(&mut canvas, fg, x, y);
    canvas
}

/// Size of a `width`×`height` foreground scaled to the target area,
/// preserving aspect ratio. Each side is at least 1.
pub fn scaled_foreground_size(width: u32, height: u32) -> (u32, u32) {
    let area = f64::from(width) * f64::from(height);
    if area == 0.0 {
        return (width.max(1), height.max(1));
    }
    let k = (FOREGROUND_TARGET_AREA / area).sqrt();
    let w = (f64::from(width) * k) as u32;
    let h = (f64::from(height) * k) as u32;
    (w.max(1), h.max(1))
}

/// Top-left offset that centres `fg` on `canvas`, using floor division.
pub fn center_offset(canvas: (u32, u32), fg: (u32, u32)) -> (i64, i64) {
    let dx = i64::from(canvas.0) - i64::from(fg.0);
    let dy = i64::from(canvas.1) - i64::from(fg.1);
    (dx.div_euclid(2), dy.div_euclid(2))
}

/// Paste `fg` at `(x, y)` using its alpha channel as the mask.
/// Pixels falling outside the canvas are dropped.
pub fn paste_with_alpha_mask(canvas: &mut RgbaImage, fg: &RgbaImage, x: i64, y: i64) {
    let (cw, ch) = (i64::from(canvas.width()), i64::from(canvas.height()));

    for (fx, fy, src) in fg.enumerate_pixels() {
        let cx = x + i64::from(fx);
        let cy = y + i64::from(fy);
        if cx < 0 || cy < 0 || cx >= cw || cy >= ch {
            continue;
        }

        let mask = u32::from(src[3]);
        if mask == 0 {
            continue;
        }
        let dst = canvas.get_pixel_mut(cx as u32, cy as u32);
        if mask == 255 {
            *dst = *src;
            continue;
        }
        for c in 0..4 {
            let blended = (u32::from(src[c]) * mask + u32::from(dst[c]) * (255 - mask) + 127) / 255;
            dst[c] = blended as u8;
        }
    }
}
