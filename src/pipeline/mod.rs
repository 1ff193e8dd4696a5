//! Pipeline stages for batch image processing.
//!
//! Each submodule implements exactly one step. Every stage consumes and
//! produces encoded bytes and reports bad input as an [`ItemError`] instead
//! of panicking, so the batch can drop the item and carry on.
//!
//! ## Data Flow
//!
//! ```text
//! source ──▶ remove-background ─┐
//!   │                           ├──▶ composite (optional) ──▶ archive
//!   └──────▶ resize-canonical ──┘
//! (URL/blob)  exactly one of the two
//! ```
//!
//! 1. [`source`]    — blob passthrough or download (with sharing-link rewrite)
//! 2. [`resize`]    — stretch to 1024×1024, opaque JPEG
//! 3. [`segment`]   — background removal through a [`segment::Segmenter`];
//!    the only stage besides `source` with network I/O
//! 4. [`composite`] — centre the result on a background canvas, PNG
//! 5. [`encode`]    — shared decode/encode helpers
//!
//! With the `onnx` feature, `onnx` provides an in-process [`segment::Segmenter`].

pub mod composite;
pub mod encode;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod resize;
pub mod segment;
pub mod source;

use crate::error::ItemError;

/// Run CPU-bound image work on the blocking pool.
///
/// Decoding, resampling and encoding a 1024² image takes long enough to
/// stall a Tokio worker, so stages hop off the async threads for it.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, ItemError>
where
    F: FnOnce() -> Result<T, ItemError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ItemError::Internal(format!("Image task panicked: {}", e)))?
}
