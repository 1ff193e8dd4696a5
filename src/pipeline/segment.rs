//! RemoveBackground: cut the foreground out with a segmentation model.
//!
//! The model itself is an external capability behind the [`Segmenter`]
//! trait: `segment(image) -> image-with-alpha`. A single handle is resolved
//! once per batch and shared by every item through an `Arc`, so the model is
//! never re-initialised per image.
//!
//! [`RemoteSegmenter`] is the shipped implementation. It talks to an HTTP
//! segmentation service (one POST per image, PNG body) and accepts two
//! response shapes:
//!
//! * an RGBA cut-out of the same size — used as-is;
//! * a single-channel mask of the same size — applied as the alpha channel
//!   of the original image.

use crate::error::{BatchError, ItemError};
use crate::pipeline::encode::{decode, encode_png};
use async_trait::async_trait;
use image::{DynamicImage, GenericImageView, GrayImage, RgbaImage};
use std::time::Duration;
use tracing::debug;

/// A foreground/background segmentation capability.
///
/// Implementations must be safe to call concurrently (`&self`) since one
/// handle serves the whole batch.
#[async_trait]
pub trait Segmenter: Send + Sync {
    /// Return `image` with background pixels made transparent.
    async fn segment(&self, image: &DynamicImage) -> Result<RgbaImage, ItemError>;
}

/// Decode, segment, re-encode as PNG with alpha.
pub async fn remove_background(
    bytes: Vec<u8>,
    segmenter: &dyn Segmenter,
) -> Result<Vec<u8>, ItemError> {
    let img = super::run_blocking(move || decode(&bytes)).await?;
    debug!("Segmenting {}x{} image", img.width(), img.height());
    let cutout = segmenter.segment(&img).await?;
    super::run_blocking(move || encode_png(&DynamicImage::ImageRgba8(cutout))).await
}

/// Use `mask` as the alpha channel of `image`.
///
/// `mask` must have the same dimensions as `image`.
pub fn apply_mask(image: &DynamicImage, mask: &GrayImage) -> RgbaImage {
    let mut out = image.to_rgba8();
    for (px, m) in out.pixels_mut().zip(mask.pixels()) {
        px[3] = m[0];
    }
    out
}

/// Segmenter backed by an HTTP service.
#[derive(Debug, Clone)]
pub struct RemoteSegmenter {
    client: reqwest::Client,
    url: String,
}

impl RemoteSegmenter {
    /// Build a segmenter posting to `url`. `timeout_secs = None` keeps the
    /// client default.
    pub fn new(url: impl Into<String>, timeout_secs: Option<u64>) -> Result<Self, BatchError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| BatchError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Segmenter for RemoteSegmenter {
    async fn segment(&self, image: &DynamicImage) -> Result<RgbaImage, ItemError> {
        let body = encode_png(image)?;

        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "image/png")
            .body(body)
            .send()
            .await
            .map_err(|e| ItemError::SegmentationFailed {
                detail: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(ItemError::SegmentationFailed {
                detail: format!("HTTP {} from {}", response.status(), self.url),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ItemError::SegmentationFailed {
                detail: e.to_string(),
            })?;

        let returned = decode(&bytes).map_err(|e| ItemError::SegmentationFailed {
            detail: format!("response is not an image: {}", e),
        })?;

        merge_response(image, returned)
    }
}

/// Interpret a segmentation service response relative to the original.
fn merge_response(original: &DynamicImage, returned: DynamicImage) -> Result<RgbaImage, ItemError> {
    if returned.dimensions() != original.dimensions() {
        return Err(ItemError::SegmentationFailed {
            detail: format!(
                "response is {}x{}, expected {}x{}",
                returned.width(),
                returned.height(),
                original.width(),
                original.height()
            ),
        });
    }

    let color = returned.color();
    if color.has_alpha() {
        Ok(returned.to_rgba8())
    } else if color.channel_count() == 1 {
        Ok(apply_mask(original, &returned.to_luma8()))
    } else {
        Err(ItemError::SegmentationFailed {
            detail: format!("response has no alpha channel ({:?})", color),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage, Rgba};

    /// Makes the left half of every image transparent.
    struct LeftHalfSegmenter;

    #[async_trait]
    impl Segmenter for LeftHalfSegmenter {
        async fn segment(&self, image: &DynamicImage) -> Result<RgbaImage, ItemError> {
            let mut out = image.to_rgba8();
            let half = out.width() / 2;
            for (x, _, px) in out.enumerate_pixels_mut() {
                if x < half {
                    px[3] = 0;
                }
            }
            Ok(out)
        }
    }

    fn rgb(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([200, 100, 50])))
    }

    #[test]
    fn apply_mask_sets_alpha() {
        let mut mask = GrayImage::from_pixel(4, 2, Luma([255]));
        mask.put_pixel(0, 0, Luma([0]));
        let out = apply_mask(&rgb(4, 2), &mask);
        assert_eq!(out.get_pixel(0, 0)[3], 0);
        assert_eq!(out.get_pixel(1, 0)[3], 255);
        assert_eq!(out.get_pixel(1, 0)[0], 200);
    }

    #[test]
    fn merge_accepts_rgba_cutout() {
        let cut = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([1, 2, 3, 4])));
        let out = merge_response(&rgb(8, 8), cut).unwrap();
        assert_eq!(out.get_pixel(0, 0), &Rgba([1, 2, 3, 4]));
    }

    #[test]
    fn merge_applies_grayscale_mask() {
        let mask = DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 8, Luma([77])));
        let out = merge_response(&rgb(8, 8), mask).unwrap();
        assert_eq!(out.get_pixel(5, 5), &Rgba([200, 100, 50, 77]));
    }

    #[test]
    fn merge_rejects_size_mismatch() {
        let mask = DynamicImage::ImageLuma8(GrayImage::new(4, 4));
        let err = merge_response(&rgb(8, 8), mask).unwrap_err();
        assert!(err.to_string().contains("expected 8x8"), "got: {err}");
    }

    #[test]
    fn merge_rejects_opaque_rgb() {
        let err = merge_response(&rgb(8, 8), rgb(8, 8)).unwrap_err();
        assert!(matches!(err, ItemError::SegmentationFailed { .. }));
    }

    #[tokio::test]
    async fn remove_background_outputs_png_with_alpha() {
        let input = encode_png(&rgb(10, 6)).unwrap();
        let out = remove_background(input, &LeftHalfSegmenter).await.unwrap();
        assert_eq!(image::guess_format(&out).unwrap(), image::ImageFormat::Png);
        let img = decode(&out).unwrap().to_rgba8();
        assert_eq!((img.width(), img.height()), (10, 6));
        assert_eq!(img.get_pixel(0, 0)[3], 0);
        assert_eq!(img.get_pixel(9, 5)[3], 255);
    }

    #[tokio::test]
    async fn remove_background_rejects_garbage() {
        let err = remove_background(b"nope".to_vec(), &LeftHalfSegmenter)
            .await
            .unwrap_err();
        assert!(matches!(err, ItemError::DecodeFailure { .. }));
    }

    #[tokio::test]
    async fn remote_segmenter_applies_returned_mask() {
        let mut server = mockito::Server::new_async().await;
        let mask = encode_png(&DynamicImage::ImageLuma8(GrayImage::from_pixel(
            6,
            4,
            Luma([10]),
        )))
        .unwrap();
        let mock = server
            .mock("POST", "/segment")
            .match_header("content-type", "image/png")
            .with_status(200)
            .with_header("content-type", "image/png")
            .with_body(mask)
            .create_async()
            .await;

        let seg = RemoteSegmenter::new(format!("{}/segment", server.url()), Some(5)).unwrap();
        let out = seg.segment(&rgb(6, 4)).await.unwrap();
        assert_eq!(out.get_pixel(2, 2), &Rgba([200, 100, 50, 10]));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn remote_segmenter_maps_http_errors() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/segment")
            .with_status(503)
            .create_async()
            .await;

        let seg = RemoteSegmenter::new(format!("{}/segment", server.url()), None).unwrap();
        let err = seg.segment(&rgb(2, 2)).await.unwrap_err();
        assert!(err.to_string().contains("503"), "got: {err}");
    }
}
