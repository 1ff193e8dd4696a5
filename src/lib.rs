//! # edgequake-imgbatch
//!
//! Batch image normalisation: fetch many images, bring each to a canonical
//! 1024×1024 form, optionally cut out the subject and place it on a shared
//! background, and package everything into a single zip archive.
//!
//! ## Pipeline Overview
//!
//! ```text
//! (name, URL | uploaded bytes)  × N
//!  │
//!  ├─ 1. Resolve    blob as-is, or GET the URL (Drive share links rewritten)
//!  ├─ 2. Transform  ResizeCanonical → JPEG   or   RemoveBackground → PNG
//!  ├─ 3. Composite  optional: centre on the 1024² background → PNG
//!  └─ 4. Archive    "<name>.<ext>" entries in one zip
//! ```
//!
//! An item that fails at any step is dropped from the output and the rest
//! of the batch carries on. `N` inputs with `M` failures yield `N − M`
//! outputs, in submission order.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_imgbatch::{process_to_archive, BatchConfig, NamedItem};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let items = vec![
//!         NamedItem::url("cat", "https://example.com/cat.jpg"),
//!         NamedItem::blob("dog", std::fs::read("dog.png")?),
//!     ];
//!     let stats = process_to_archive(items, "all_images.zip", &BatchConfig::default()).await?;
//!     eprintln!("{}/{} images archived", stats.processed_items, stats.total_items);
//!     Ok(())
//! }
//! ```
//!
//! ## Background Removal
//!
//! Segmentation is delegated to a [`Segmenter`]. Pass your own
//! implementation via [`BatchConfigBuilder::segmenter`], or point the
//! built-in [`RemoteSegmenter`] at an HTTP endpoint with
//! [`BatchConfigBuilder::segmenter_url`] or the `IMGBATCH_SEGMENTER_URL`
//! environment variable. With the `onnx` feature a U²-Net model can run
//! in-process instead ([`BatchConfigBuilder::model_path`] or
//! `IMGBATCH_MODEL_PATH`).
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `imgbatch` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `onnx`  | off     | In-process background removal with an ONNX model (ort + ndarray) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-imgbatch = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod archive;
pub mod batch;
pub mod config;
pub mod error;
pub mod input;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use archive::{build_archive, build_archive_with, write_archive, write_individual};
pub use batch::{process, process_batch, process_sync, process_to_archive};
pub use config::{BatchConfig, BatchConfigBuilder, DuplicateNames, MODEL_PATH_ENV, SEGMENTER_URL_ENV};
pub use error::{BatchError, ItemError};
pub use input::{from_paths_or_urls, from_uploads, load_table, parse_table, TableFormat};
pub use output::{BatchOutput, BatchStats, ImageExtension, ProcessedImage, ProcessedItem, SkippedItem};
#[cfg(feature = "onnx")]
pub use pipeline::onnx::OnnxSegmenter;
pub use pipeline::segment::{RemoteSegmenter, Segmenter};
pub use pipeline::source::{ImageSource, NamedItem};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{process_stream, ItemStream};
