//! In-process background removal with an ONNX salient-object model.
//!
//! Built for the U²-Net family (`u2net.onnx`, `u2netp.onnx` and exports with
//! the same I/O):
//!
//! ```text
//! input   1×3×320×320 f32, pixels / max(pixels), then ImageNet mean/std
//! output  first tensor, 1×1×320×320 saliency map
//! ```
//!
//! The map is min-max normalised, stretched back to the source size and
//! applied as the alpha channel of the original image.

use crate::error::{BatchError, ItemError};
use crate::pipeline::resize::RESIZE_FILTER;
use crate::pipeline::run_blocking;
use crate::pipeline::segment::{apply_mask, Segmenter};
use async_trait::async_trait;
use image::{imageops, DynamicImage, GrayImage, Luma, RgbImage, RgbaImage};
use ndarray::Array4;
use ort::session::Session;
use ort::value::Tensor;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Side length of the square the model sees.
pub const MODEL_INPUT_SIZE: u32 = 320;

const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Segmenter running an ONNX model through onnxruntime.
///
/// The session is loaded once and shared by every item of the batch.
#[derive(Clone)]
pub struct OnnxSegmenter {
    session: Arc<Session>,
}

impl fmt::Debug for OnnxSegmenter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnnxSegmenter").finish_non_exhaustive()
    }
}

impl OnnxSegmenter {
    /// Load the model at `path`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, BatchError> {
        let path = path.as_ref();
        let load_failed = |e: ort::Error| BatchError::ModelLoadFailed {
            path: path.to_path_buf(),
            detail: e.to_string(),
        };

        let session = Session::builder()
            .map_err(load_failed)?
            .commit_from_file(path)
            .map_err(load_failed)?;

        info!("Loaded segmentation model {}", path.display());
        Ok(Self {
            session: Arc::new(session),
        })
    }
}

#[async_trait]
impl Segmenter for OnnxSegmenter {
    async fn segment(&self, image: &DynamicImage) -> Result<RgbaImage, ItemError> {
        let session = Arc::clone(&self.session);
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();

        let mask = run_blocking(move || {
            let saliency = infer(&session, model_input(&rgb))?;
            Ok(mask_from_saliency(&saliency, width, height))
        })
        .await?;

        Ok(apply_mask(image, &mask))
    }
}

fn segmentation_failed(e: impl fmt::Display) -> ItemError {
    ItemError::SegmentationFailed {
        detail: e.to_string(),
    }
}

/// Run one forward pass; returns the first `320×320` plane of the output.
fn infer(session: &Session, input: Vec<f32>) -> Result<Vec<f32>, ItemError> {
    let side = MODEL_INPUT_SIZE as usize;
    let array = Array4::from_shape_vec((1, 3, side, side), input).map_err(segmentation_failed)?;
    let tensor = Tensor::from_array(array).map_err(segmentation_failed)?;

    let outputs = session
        .run(ort::inputs![tensor].map_err(segmentation_failed)?)
        .map_err(segmentation_failed)?;
    let view = outputs[0]
        .try_extract_tensor::<f32>()
        .map_err(segmentation_failed)?;

    let plane: Vec<f32> = view.iter().copied().take(side * side).collect();
    if plane.len() != side * side {
        return Err(segmentation_failed(format!(
            "model output has {} values, expected at least {}",
            plane.len(),
            side * side
        )));
    }
    debug!("Model produced {}x{} saliency map", side, side);
    Ok(plane)
}

/// Resize to the model square and lay out as normalised NCHW floats.
fn model_input(rgb: &RgbImage) -> Vec<f32> {
    let side = MODEL_INPUT_SIZE;
    let small = imageops::resize(rgb, side, side, RESIZE_FILTER);

    let peak = small.as_raw().iter().copied().max().unwrap_or(0).max(1);
    let scale = f32::from(peak);

    let plane = (side * side) as usize;
    let mut data = vec![0.0f32; 3 * plane];
    for (x, y, px) in small.enumerate_pixels() {
        let i = (y * side + x) as usize;
        for c in 0..3 {
            data[c * plane + i] = (f32::from(px[c]) / scale - MEAN[c]) / STD[c];
        }
    }
    data
}

/// Min-max normalise a square saliency map into a mask of `width`×`height`.
fn mask_from_saliency(saliency: &[f32], width: u32, height: u32) -> GrayImage {
    let side = MODEL_INPUT_SIZE;
    let (lo, hi) = saliency
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = hi - lo;

    let small = GrayImage::from_fn(side, side, |x, y| {
        let v = saliency[(y * side + x) as usize];
        let norm = if range > f32::EPSILON { (v - lo) / range } else { 0.0 };
        Luma([(norm * 255.0).round().clamp(0.0, 255.0) as u8])
    });

    imageops::resize(&small, width, height, RESIZE_FILTER)
}
