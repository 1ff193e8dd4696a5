//! Eager (whole-batch) entry points.
//!
//! These wait for every item, then return. Use
//! [`crate::stream::process_stream`] to receive items as they finish.
//!
//! ## Stage order per item
//!
//! 1. Resolve the source to bytes.
//! 2. `remove_background` ? RemoveBackground (PNG) : ResizeCanonical (JPEG).
//! 3. If compositing is on and a background is present: composite (PNG).
//!
//! Any failing step drops the item. Nothing an item does is visible to any
//! other item, so `concurrency > 1` cannot change a result.

use crate::archive;
use crate::config::{BatchConfig, MODEL_PATH_ENV, SEGMENTER_URL_ENV};
use crate::error::{BatchError, ItemError};
use crate::output::{BatchOutput, BatchStats, ImageExtension, ProcessedImage, ProcessedItem, SkippedItem};
#[cfg(feature = "onnx")]
use crate::pipeline::onnx::OnnxSegmenter;
use crate::pipeline::segment::{self, RemoteSegmenter, Segmenter};
use crate::pipeline::source::{self, ImageSource, NamedItem};
use crate::pipeline::{composite, resize, run_blocking};
use crate::progress::ProgressCallback;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Process a batch and return the successful items in submission order.
///
/// Items that fail at any stage are omitted; nothing else about them is
/// returned. Use [`process_batch`] for the reasons and counters.
///
/// # Errors
/// Only fatal setup errors: background removal requested with no segmenter
/// available, or an HTTP client that cannot be built.
pub async fn process(
    items: Vec<NamedItem>,
    config: &BatchConfig,
) -> Result<Vec<ProcessedItem>, BatchError> {
    Ok(process_batch(items, config).await?.items)
}

/// Process a batch, returning results, skipped items and statistics.
pub async fn process_batch(
    items: Vec<NamedItem>,
    config: &BatchConfig,
) -> Result<BatchOutput, BatchError> {
    let start = Instant::now();
    let total = items.len();
    info!("Starting batch: {} items", total);

    let ctx = BatchContext::new(config, total)?;

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let results: Vec<Result<ProcessedItem, SkippedItem>> =
        stream::iter(items.into_iter().enumerate().map(|(index, item)| {
            let ctx = ctx.clone();
            async move { ctx.run_item(index, item).await }
        }))
        .buffered(config.concurrency)
        .collect()
        .await;

    let mut output = BatchOutput::default();
    for result in results {
        match result {
            Ok(item) => output.items.push(item),
            Err(skipped) => output.skipped.push(skipped),
        }
    }

    output.stats = BatchStats {
        total_items: total,
        processed_items: output.items.len(),
        skipped_items: output.skipped.len(),
        duration_ms: start.elapsed().as_millis() as u64,
    };

    info!(
        "Batch complete: {}/{} items, {}ms",
        output.stats.processed_items, total, output.stats.duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(total, output.stats.processed_items);
    }

    Ok(output)
}

/// Process a batch and write every result into a zip archive at `output_path`.
pub async fn process_to_archive(
    items: Vec<NamedItem>,
    output_path: impl AsRef<Path>,
    config: &BatchConfig,
) -> Result<BatchStats, BatchError> {
    let output = process_batch(items, config).await?;
    archive::write_archive(&output.items, output_path.as_ref(), config.duplicate_names).await?;
    Ok(output.stats)
}

/// Synchronous wrapper around [`process_batch`].
///
/// Creates a temporary tokio runtime internally; do not call it from inside
/// an async context.
pub fn process_sync(items: Vec<NamedItem>, config: &BatchConfig) -> Result<BatchOutput, BatchError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| BatchError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(process_batch(items, config))
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Everything an item needs, resolved once per batch. Cheap to clone.
#[derive(Clone)]
pub(crate) struct BatchContext {
    client: reqwest::Client,
    segmenter: Option<Arc<dyn Segmenter>>,
    remove_background: bool,
    background: Option<Arc<[u8]>>,
    resize_foreground: bool,
    progress: Option<ProgressCallback>,
    total: usize,
}

impl BatchContext {
    pub(crate) fn new(config: &BatchConfig, total: usize) -> Result<Self, BatchError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.download_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| BatchError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        let segmenter = if config.remove_background {
            Some(resolve_segmenter(config)?)
        } else {
            None
        };

        if config.add_background && config.background_image.is_none() {
            warn!("{}; compositing skipped", ItemError::MissingBackground);
        }

        Ok(Self {
            client,
            segmenter,
            remove_background: config.remove_background,
            background: if config.composites() {
                config.background_image.clone()
            } else {
                None
            },
            resize_foreground: config.resize_foreground,
            progress: config.progress_callback.clone(),
            total,
        })
    }

    /// Run every configured stage for one item, reporting progress.
    pub(crate) async fn run_item(
        &self,
        index: usize,
        item: NamedItem,
    ) -> Result<ProcessedItem, SkippedItem> {
        let NamedItem { name, source } = item;
        if let Some(ref cb) = self.progress {
            cb.on_item_start(index, self.total, &name);
        }

        match self.transform(&source).await {
            Ok(image) => {
                debug!(
                    "Item '{}': {} bytes {}",
                    name,
                    image.bytes.len(),
                    image.extension
                );
                if let Some(ref cb) = self.progress {
                    cb.on_item_complete(index, self.total, &name, image.bytes.len());
                }
                Ok(ProcessedItem { name, image })
            }
            Err(error) => {
                warn!("Skipping item '{}': {}", name, error);
                if let Some(ref cb) = self.progress {
                    cb.on_item_skipped(index, self.total, &name, &error.to_string());
                }
                Err(SkippedItem { name, error })
            }
        }
    }

    async fn transform(&self, source: &ImageSource) -> Result<ProcessedImage, ItemError> {
        let raw = source::resolve(source, &self.client).await?;

        let (mut bytes, mut extension) = if self.remove_background {
            let segmenter = self
                .segmenter
                .as_deref()
                .ok_or_else(|| ItemError::Internal("segmenter was not resolved".into()))?;
            (
                segment::remove_background(raw, segmenter).await?,
                ImageExtension::Png,
            )
        } else {
            (
                run_blocking(move || resize::resize_canonical(&raw)).await?,
                ImageExtension::Jpeg,
            )
        };

        if let Some(ref background) = self.background {
            let background = Arc::clone(background);
            let resize_foreground = self.resize_foreground;
            bytes = run_blocking(move || {
                composite::composite_on_background(&bytes, &background, resize_foreground)
            })
            .await?;
            extension = ImageExtension::Png;
        }

        Ok(ProcessedImage { bytes, extension })
    }
}

/// Resolve the segmentation capability, from most-specific to least-specific:
///
/// 1. **Pre-built handle** (`config.segmenter`) — used as-is.
/// 2. **Endpoint** (`config.segmenter_url`) — wrapped in a [`RemoteSegmenter`].
/// 3. **Model file** (`config.model_path`, `onnx` feature) — loaded in-process.
/// 4. **Environment** (`IMGBATCH_SEGMENTER_URL`) — same as 2.
/// 5. **Environment** (`IMGBATCH_MODEL_PATH`, `onnx` feature) — same as 3.
fn resolve_segmenter(config: &BatchConfig) -> Result<Arc<dyn Segmenter>, BatchError> {
    if let Some(ref segmenter) = config.segmenter {
        return Ok(Arc::clone(segmenter));
    }

    if let Some(ref url) = config.segmenter_url {
        return Ok(Arc::new(RemoteSegmenter::new(
            url.as_str(),
            config.download_timeout_secs,
        )?));
    }

    #[cfg(feature = "onnx")]
    if let Some(ref path) = config.model_path {
        return Ok(Arc::new(OnnxSegmenter::from_file(path)?));
    }

    if let Ok(url) = std::env::var(SEGMENTER_URL_ENV) {
        if !url.is_empty() {
            return Ok(Arc::new(RemoteSegmenter::new(
                url,
                config.download_timeout_secs,
            )?));
        }
    }

    #[cfg(feature = "onnx")]
    if let Some(path) = std::env::var_os(MODEL_PATH_ENV).filter(|p| !p.is_empty()) {
        return Ok(Arc::new(OnnxSegmenter::from_file(path)?));
    }

    Err(BatchError::SegmenterNotConfigured {
        hint: segmenter_hint(),
    })
}

fn segmenter_hint() -> String {
    let remote = format!(
        "Pass a segmenter handle, set a segmenter URL, or export {}=http://host/segment",
        SEGMENTER_URL_ENV
    );
    if cfg!(feature = "onnx") {
        format!("{remote}; or point {MODEL_PATH_ENV} at a U2-Net .onnx model")
    } else {
        format!("{remote}; or rebuild with --features onnx to run a local model")
    }
}
