//! Progress-callback trait for document and chapter events.
//!
//! Inject an [`Arc<dyn StudyProgressCallback>`] via
//! [`crate::config::StudyConfigBuilder::progress_callback`] to receive events
//! as the pipeline resolves, splits and generates.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2study::{StudyConfig, StudyProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     attempts: AtomicUsize,
//! }
//!
//! impl StudyProgressCallback for CountingCallback {
//!     fn on_attempt(&self, _ordinal: usize, attempt: u32, max_attempts: u32) {
//!         self.attempts.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("attempt {}/{}", attempt + 1, max_attempts);
//!     }
//! }
//!
//! let cb = Arc::new(CountingCallback { attempts: AtomicUsize::new(0) });
//! let config = StudyConfig::builder()
//!     .progress_callback(cb as Arc<dyn StudyProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by the pipeline as it processes documents and chapters.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// With `concurrency > 1`, the chapter-level methods may be called from
/// several tasks at once.
pub trait StudyProgressCallback: Send + Sync {
    /// Called before structure resolution of a source document starts.
    fn on_document_start(&self, path: &Path) {
        let _ = path;
    }

    /// Called once the book structure is known and the PDF has been split.
    ///
    /// # Arguments
    /// * `chapters_found`   — chapters returned by the resolver
    /// * `chapters_written` — chapter PDFs actually written
    fn on_split_complete(&self, chapters_found: usize, chapters_written: usize) {
        let _ = (chapters_found, chapters_written);
    }

    /// Called before the first generation of a chapter.
    fn on_chapter_start(&self, ordinal: usize, total: usize, name: &str) {
        let _ = (ordinal, total, name);
    }

    /// Called before every generation request (0-based `attempt`).
    fn on_attempt(&self, ordinal: usize, attempt: u32, max_attempts: u32) {
        let _ = (ordinal, attempt, max_attempts);
    }

    /// Called when a chapter's correction loop ends.
    ///
    /// # Arguments
    /// * `status`   — "accepted", "soft-accepted", "exhausted" or "failed"
    /// * `attempts` — generations consumed
    fn on_chapter_complete(&self, ordinal: usize, total: usize, status: &str, attempts: u32) {
        let _ = (ordinal, total, status, attempts);
    }

    /// Called when a document cannot be processed at all.
    fn on_document_error(&self, path: &Path, error: &str) {
        let _ = (path, error);
    }

    /// Called once after every chapter of a document has been attempted.
    fn on_document_complete(&self, path: &Path, accepted: usize, total: usize) {
        let _ = (path, accepted, total);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl StudyProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::StudyConfig`].
pub type ProgressCallback = Arc<dyn StudyProgressCallback>;
