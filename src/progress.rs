//! Progress-callback trait for per-stage pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as the pipeline walks through its stages. The CLI forwards them to
//! an indicatif progress bar; library callers can forward them anywhere.
//!
//! # Example
//!
//! ```rust
//! use docsift::{PipelineConfig, PipelineProgressCallback, Stage};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     items: AtomicUsize,
//! }
//!
//! impl PipelineProgressCallback for CountingCallback {
//!     fn on_item_complete(&self, _stage: Stage, _done: usize, _total: usize) {
//!         self.items.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { items: AtomicUsize::new(0) });
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(counter as Arc<dyn PipelineProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// One step of the pipeline, as reported to progress callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    /// Walking the input root and routing files to intake directories.
    Dispatch,
    /// Classifying the working set of the given pass (1-indexed).
    Classify(usize),
    /// Running the extraction tool on the mixed images of the given pass.
    Extract(usize),
    /// Streaming deduplication of text snippets.
    TextDedup,
    /// Batch deduplication of final images.
    ImageDedup,
    /// Removing intermediate staging directories.
    Cleanup,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Dispatch => write!(f, "dispatch"),
            Stage::Classify(pass) => write!(f, "classify (pass {pass})"),
            Stage::Extract(pass) => write!(f, "extract (pass {pass})"),
            Stage::TextDedup => write!(f, "text dedup"),
            Stage::ImageDedup => write!(f, "image dedup"),
            Stage::Cleanup => write!(f, "cleanup"),
        }
    }
}

/// Called by the pipeline as it moves through stages.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. The pipeline is sequential, but the trait is
/// `Send + Sync` so a callback can be shared with other threads (for example
/// a progress-bar ticker).
pub trait PipelineProgressCallback: Send + Sync {
    /// Called when a stage begins.
    ///
    /// `total` is the number of items the stage will process, when known
    /// up front (0 otherwise).
    fn on_stage_start(&self, stage: Stage, total: usize) {
        let _ = (stage, total);
    }

    /// Called after each item of a stage has been handled.
    fn on_item_complete(&self, stage: Stage, done: usize, total: usize) {
        let _ = (stage, done, total);
    }

    /// Called once a stage has finished, successfully or not.
    fn on_stage_complete(&self, stage: Stage) {
        let _ = stage;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct TrackingCallback {
        starts: Mutex<Vec<Stage>>,
        items: AtomicUsize,
        completes: AtomicUsize,
    }

    impl PipelineProgressCallback for TrackingCallback {
        fn on_stage_start(&self, stage: Stage, _total: usize) {
            self.starts.lock().unwrap().push(stage);
        }

        fn on_item_complete(&self, _stage: Stage, _done: usize, _total: usize) {
            self.items.fetch_add(1, Ordering::SeqCst);
        }

        fn on_stage_complete(&self, _stage: Stage) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_stage_start(Stage::Dispatch, 3);
        cb.on_item_complete(Stage::Dispatch, 1, 3);
        cb.on_stage_complete(Stage::Dispatch);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback {
            starts: Mutex::new(Vec::new()),
            items: AtomicUsize::new(0),
            completes: AtomicUsize::new(0),
        };

        tracker.on_stage_start(Stage::Classify(1), 2);
        tracker.on_item_complete(Stage::Classify(1), 1, 2);
        tracker.on_item_complete(Stage::Classify(1), 2, 2);
        tracker.on_stage_complete(Stage::Classify(1));
        tracker.on_stage_start(Stage::Extract(1), 1);

        assert_eq!(
            *tracker.starts.lock().unwrap(),
            vec![Stage::Classify(1), Stage::Extract(1)]
        );
        assert_eq!(tracker.items.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stage_display_includes_pass() {
        assert_eq!(Stage::Classify(2).to_string(), "classify (pass 2)");
        assert_eq!(Stage::ImageDedup.to_string(), "image dedup");
    }
}
