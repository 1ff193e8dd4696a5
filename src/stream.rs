//! Streaming batch API: emit each item as soon as it is done.
//!
//! Unlike the eager [`crate::batch::process_batch`], [`process_stream`]
//! yields one `Result<ProcessedItem, SkippedItem>` per submitted item, in
//! submission order, so a caller can show or offer each image for download
//! while later ones are still being fetched.

use crate::batch::BatchContext;
use crate::config::BatchConfig;
use crate::error::BatchError;
use crate::output::{ProcessedItem, SkippedItem};
use crate::pipeline::source::NamedItem;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of per-item outcomes.
pub type ItemStream = Pin<Box<dyn Stream<Item = Result<ProcessedItem, SkippedItem>> + Send>>;

/// Process a batch, streaming each item's outcome.
///
/// # Returns
/// - `Ok(ItemStream)` — exactly one element per input item
/// - `Err(BatchError)` — fatal setup error (e.g. no segmenter configured)
///
/// `on_batch_start` fires immediately; `on_batch_complete` is not fired
/// because completion is observed by the consumer draining the stream.
pub fn process_stream(items: Vec<NamedItem>, config: &BatchConfig) -> Result<ItemStream, BatchError> {
    let total = items.len();
    info!("Starting streaming batch: {} items", total);

    let ctx = BatchContext::new(config, total)?;

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let s = stream::iter(items.into_iter().enumerate())
        .map(move |(index, item)| {
            let ctx = ctx.clone();
            async move { ctx.run_item(index, item).await }
        })
        .buffered(config.concurrency);

    Ok(Box::pin(s))
}
