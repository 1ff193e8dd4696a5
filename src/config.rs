//! Configuration types for a batch run.
//!
//! All batch behaviour is controlled through [`BatchConfig`], built via its
//! [`BatchConfigBuilder`]. The config is constructed once per batch and is
//! read-only for the whole run; every item sees the same flags.

use crate::error::BatchError;
use crate::pipeline::segment::Segmenter;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Environment variable consulted for a segmentation endpoint when neither
/// [`BatchConfig::segmenter`] nor [`BatchConfig::segmenter_url`] is set.
pub const SEGMENTER_URL_ENV: &str = "IMGBATCH_SEGMENTER_URL";

/// Environment variable consulted for an ONNX segmentation model when no
/// segmenter handle or URL is available (requires the `onnx` feature).
pub const MODEL_PATH_ENV: &str = "IMGBATCH_MODEL_PATH";

/// Configuration for a batch run.
///
/// # Example
/// ```rust
/// use edgequake_imgbatch::BatchConfig;
///
/// let background: Vec<u8> = vec![/* encoded PNG or JPEG bytes */];
/// let config = BatchConfig::builder()
///     .background_image(background)
///     .resize_foreground(true)
///     .build()
///     .unwrap();
/// assert!(config.add_background);
/// ```
#[derive(Clone)]
pub struct BatchConfig {
    /// Strip each image's background instead of resizing it. Default: false.
    ///
    /// Exactly one of background removal and the canonical resize runs per
    /// item; this flag picks which.
    pub remove_background: bool,

    /// Composite each result onto [`Self::background_image`]. Default: false.
    ///
    /// Ignored (with a warning) when no background image is supplied.
    pub add_background: bool,

    /// Encoded background image used by the composite stage.
    pub background_image: Option<Arc<[u8]>>,

    /// Scale the foreground to a fixed pixel area before centring it on the
    /// background. Default: false.
    pub resize_foreground: bool,

    /// Pre-constructed segmentation capability. Takes precedence over
    /// `segmenter_url`.
    pub segmenter: Option<Arc<dyn Segmenter>>,

    /// Endpoint of an HTTP segmentation service.
    pub segmenter_url: Option<String>,

    /// ONNX salient-object model (U²-Net family) run in-process. Only
    /// honoured with the `onnx` feature.
    pub model_path: Option<PathBuf>,

    /// Number of items processed at once. Default: 1 (strictly sequential).
    ///
    /// Items never share mutable state, so raising this is safe; results keep
    /// their submission order either way.
    pub concurrency: usize,

    /// Timeout for each source download and segmentation call. Default: None,
    /// which leaves the HTTP client's own default in place.
    pub download_timeout_secs: Option<u64>,

    /// What to do when two results map to the same archive entry.
    pub duplicate_names: DuplicateNames,

    /// Optional per-item event sink.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            remove_background: false,
            add_background: false,
            background_image: None,
            resize_foreground: false,
            segmenter: None,
            segmenter_url: None,
            model_path: None,
            concurrency: 1,
            download_timeout_secs: None,
            duplicate_names: DuplicateNames::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("remove_background", &self.remove_background)
            .field("add_background", &self.add_background)
            .field(
                "background_image",
                &self.background_image.as_ref().map(|b| format!("<{} bytes>", b.len())),
            )
            .field("resize_foreground", &self.resize_foreground)
            .field("segmenter", &self.segmenter.as_ref().map(|_| "<dyn Segmenter>"))
            .field("segmenter_url", &self.segmenter_url)
            .field("model_path", &self.model_path)
            .field("concurrency", &self.concurrency)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("duplicate_names", &self.duplicate_names)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl BatchConfig {
    /// Create a new builder for `BatchConfig`.
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: Self::default(),
        }
    }

    /// True when the composite stage will actually run.
    pub fn composites(&self) -> bool {
        self.add_background && self.background_image.is_some()
    }
}

/// Builder for [`BatchConfig`].
#[derive(Debug)]
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    pub fn remove_background(mut self, v: bool) -> Self {
        self.config.remove_background = v;
        self
    }

    pub fn add_background(mut self, v: bool) -> Self {
        self.config.add_background = v;
        self
    }

    /// Set the background image and turn compositing on.
    pub fn background_image(mut self, bytes: impl Into<Arc<[u8]>>) -> Self {
        self.config.background_image = Some(bytes.into());
        self.config.add_background = true;
        self
    }

    pub fn resize_foreground(mut self, v: bool) -> Self {
        self.config.resize_foreground = v;
        self
    }

    pub fn segmenter(mut self, segmenter: Arc<dyn Segmenter>) -> Self {
        self.config.segmenter = Some(segmenter);
        self
    }

    pub fn segmenter_url(mut self, url: impl Into<String>) -> Self {
        self.config.segmenter_url = Some(url.into());
        self
    }

    pub fn model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.model_path = Some(path.into());
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = Some(secs);
        self
    }

    pub fn duplicate_names(mut self, policy: DuplicateNames) -> Self {
        self.config.duplicate_names = policy;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BatchConfig, BatchError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(BatchError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.download_timeout_secs == Some(0) {
            return Err(BatchError::InvalidConfig(
                "Download timeout must be ≥ 1 second".into(),
            ));
        }
        if let Some(ref url) = c.segmenter_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(BatchError::InvalidConfig(format!(
                    "Segmenter URL must be http(s), got '{}'",
                    url
                )));
            }
        }
        if cfg!(not(feature = "onnx")) && c.model_path.is_some() {
            return Err(BatchError::InvalidConfig(
                "A model path needs the `onnx` feature; rebuild with --features onnx".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Policy for results whose `"<name>.<extension>"` collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DuplicateNames {
    /// Keep one entry per file name; the last item wins. (default)
    #[default]
    Overwrite,
    /// Keep every item, renaming later duplicates to `name-1`, `name-2`, …
    Suffix,
}
