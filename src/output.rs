//! Result types produced by a batch run.

use crate::error::ItemError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Encoding of a processed image, decided solely by which stages ran.
///
/// Background removal or compositing ⇒ [`ImageExtension::Png`] (alpha is
/// preserved); the plain canonical resize ⇒ [`ImageExtension::Jpeg`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageExtension {
    Png,
    Jpeg,
}

impl ImageExtension {
    /// File extension without the leading dot.
    pub fn as_str(self) -> &'static str {
        match self {
            ImageExtension::Png => "png",
            ImageExtension::Jpeg => "jpeg",
        }
    }

    /// MIME type to serve an individual download with.
    pub fn mime_type(self) -> &'static str {
        match self {
            ImageExtension::Png => "image/png",
            ImageExtension::Jpeg => "image/jpeg",
        }
    }
}

impl fmt::Display for ImageExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encoded bytes of one processed image plus their extension.
#[derive(Clone, PartialEq, Eq)]
pub struct ProcessedImage {
    pub bytes: Vec<u8>,
    pub extension: ImageExtension,
}

impl fmt::Debug for ProcessedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessedImage")
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .field("extension", &self.extension)
            .finish()
    }
}

/// A successfully processed item, keyed by its (not necessarily unique) name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedItem {
    pub name: String,
    pub image: ProcessedImage,
}

impl ProcessedItem {
    /// `"<name>.<extension>"`, the entry name used in archives and on disk.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.name, self.image.extension)
    }
}

/// An item that produced no output, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedItem {
    pub name: String,
    pub error: ItemError,
}

/// Counters for one batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    /// Items submitted.
    pub total_items: usize,
    /// Items that produced an image.
    pub processed_items: usize,
    /// Items omitted because a stage failed.
    pub skipped_items: usize,
    /// Wall-clock time for the whole batch.
    pub duration_ms: u64,
}

/// Everything a batch run produced.
///
/// `items` keeps the submission order of the successful items.
#[derive(Debug, Clone, Default)]
pub struct BatchOutput {
    pub items: Vec<ProcessedItem>,
    pub skipped: Vec<SkippedItem>,
    pub stats: BatchStats,
}
