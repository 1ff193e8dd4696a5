//! Error types for the edgequake-imgbatch library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`BatchError`] — **Fatal**: the batch cannot run at all (unreadable
//!   table, missing columns, background removal requested with no segmenter
//!   configured, archive could not be written). Returned as
//!   `Err(BatchError)` from the top-level entry points.
//!
//! * [`ItemError`] — **Non-fatal**: a single image failed (dead link, bytes
//!   that are not an image, segmentation service error) but every other item
//!   is fine. The item is dropped from the results and the error is only
//!   reported through [`crate::output::BatchOutput::skipped`], the progress
//!   callback and the log.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-imgbatch library.
///
/// Item-level failures use [`ItemError`] and never abort a batch.
#[derive(Debug, Error)]
pub enum BatchError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Table file was not found at the given path.
    #[error("Table file not found: '{path}'\nCheck the path exists and is readable.")]
    TableNotFound { path: PathBuf },

    /// Table file has an extension we cannot parse.
    #[error("Unsupported table format: '{path}'\nUse a .csv or .xlsx file.")]
    UnsupportedTable { path: PathBuf },

    /// Table bytes could not be parsed as CSV / XLSX.
    #[error("Failed to parse table: {detail}")]
    TableParse { detail: String },

    /// The header row lacks a name column or a links column.
    #[error("The table must contain 'links' and 'name' columns (found: {found:?})")]
    MissingColumns { found: Vec<String> },

    /// A local image could not be read.
    #[error("Failed to read image '{path}': {source}")]
    ImageReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Segmenter errors ──────────────────────────────────────────────────
    /// Background removal was requested but no segmenter is available.
    #[error("Background removal requested but no segmenter is configured.\n{hint}")]
    SegmenterNotConfigured { hint: String },

    /// The in-process segmentation model could not be loaded.
    #[error("Failed to load segmentation model '{path}': {detail}")]
    ModelLoadFailed { path: PathBuf, detail: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// The zip container could not be assembled.
    #[error("Failed to build archive: {detail}")]
    ArchiveFailed { detail: String },

    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<zip::result::ZipError> for BatchError {
    fn from(e: zip::result::ZipError) -> Self {
        BatchError::ArchiveFailed {
            detail: e.to_string(),
        }
    }
}

/// A non-fatal error for a single item.
///
/// The item that produced it contributes nothing to the output.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum ItemError {
    /// The bytes are not a decodable image.
    #[error("not a valid image: {detail}")]
    DecodeFailure { detail: String },

    /// The source URL returned a non-success status or no response.
    #[error("failed to fetch '{url}': {reason}")]
    FetchFailure { url: String, reason: String },

    /// Compositing was requested without a background image.
    #[error("compositing requested but no background image was supplied")]
    MissingBackground,

    /// The segmentation capability failed or returned an unusable image.
    #[error("background removal failed: {detail}")]
    SegmentationFailed { detail: String },

    /// Re-encoding the transformed image failed.
    #[error("failed to encode image: {detail}")]
    EncodeFailure { detail: String },

    /// A worker task panicked or was cancelled.
    #[error("internal error: {0}")]
    Internal(String),
}
