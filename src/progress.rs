//! Progress-callback trait for per-item batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::BatchConfigBuilder::progress_callback`] to receive
//! events as the pipeline works through each item. This is also the one
//! place where the reason an item was skipped reaches the caller while the
//! batch is still running.
//!
//! # Example
//!
//! ```rust
//! use edgequake_imgbatch::{BatchConfig, BatchProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_item_complete(&self, index: usize, total: usize, name: &str, bytes: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{}/{} {} ({} bytes)", index + 1, total, name, bytes);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = BatchConfig::builder()
//!     .progress_callback(counter as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the batch pipeline as it processes each item.
///
/// Implementations must be `Send + Sync`: with `concurrency > 1` the item
/// events may arrive from different tasks. All methods default to no-ops.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before any item is resolved.
    fn on_batch_start(&self, total_items: usize) {
        let _ = total_items;
    }

    /// Called before an item's source is resolved.
    ///
    /// `index` is the 0-based position of the item in the submitted batch.
    fn on_item_start(&self, index: usize, total_items: usize, name: &str) {
        let _ = (index, total_items, name);
    }

    /// Called when an item produced an image of `bytes` encoded bytes.
    fn on_item_complete(&self, index: usize, total_items: usize, name: &str, bytes: usize) {
        let _ = (index, total_items, name, bytes);
    }

    /// Called when an item is dropped from the results.
    fn on_item_skipped(&self, index: usize, total_items: usize, name: &str, error: &str) {
        let _ = (index, total_items, name, error);
    }

    /// Called once after every item has been attempted.
    fn on_batch_complete(&self, total_items: usize, success_count: usize) {
        let _ = (total_items, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::BatchConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        skips: AtomicUsize,
        started_total: AtomicUsize,
        completed_total: AtomicUsize,
    }

    impl BatchProgressCallback for TrackingCallback {
        fn on_batch_start(&self, total_items: usize) {
            self.started_total.store(total_items, Ordering::SeqCst);
        }

        fn on_item_start(&self, _index: usize, _total: usize, _name: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_item_complete(&self, _index: usize, _total: usize, _name: &str, _bytes: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_item_skipped(&self, _index: usize, _total: usize, _name: &str, _error: &str) {
            self.skips.fetch_add(1, Ordering::SeqCst);
        }

        fn on_batch_complete(&self, _total_items: usize, success_count: usize) {
            self.completed_total.store(success_count, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(3);
        cb.on_item_start(0, 3, "cat");
        cb.on_item_complete(0, 3, "cat", 42);
        cb.on_item_skipped(1, 3, "dog", "not a valid image");
        cb.on_batch_complete(3, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();

        tracker.on_batch_start(3);
        assert_eq!(tracker.started_total.load(Ordering::SeqCst), 3);

        tracker.on_item_start(0, 3, "a");
        tracker.on_item_complete(0, 3, "a", 100);
        tracker.on_item_start(1, 3, "b");
        tracker.on_item_complete(1, 3, "b", 200);
        tracker.on_item_start(2, 3, "c");
        tracker.on_item_skipped(2, 3, "c", "HTTP 404");

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.skips.load(Ordering::SeqCst), 1);

        tracker.on_batch_complete(3, 2);
        assert_eq!(tracker.completed_total.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: Arc<dyn BatchProgressCallback> = Arc::new(NoopProgressCallback);
        cb.on_batch_start(10);
        cb.on_item_start(0, 10, "x");
        cb.on_item_complete(0, 10, "x", 512);
    }
}
