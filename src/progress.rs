//! Progress-callback trait for assignment archive events.
//!
//! Pass an [`ArchiveProgress`] to [`crate::archive::archive_assignment`] to be
//! told about each entry as it is added or skipped. The CLI drives a progress
//! bar from it; a web front end could forward the events to a socket.
//!
//! # Example
//!
//! ```rust
//! use coursework_pdf::ArchiveProgressCallback;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct Counter(AtomicUsize);
//!
//! impl ArchiveProgressCallback for Counter {
//!     fn on_entry_added(&self, _name: &str, _index: usize, _total: usize) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//! ```

use std::sync::Arc;

/// Called by the archiver as it packs an assignment's PDFs.
///
/// The archiver runs on a blocking thread, so implementations must be
/// `Send + Sync`. All methods have default no-op implementations.
pub trait ArchiveProgressCallback: Send + Sync {
    /// Called once with the number of distinct canonical PDFs to pack.
    fn on_archive_start(&self, total_entries: usize) {
        let _ = total_entries;
    }

    /// Called after an entry is written into the archive.
    ///
    /// # Arguments
    /// * `name`  — entry name (the canonical PDF file name)
    /// * `index` — 1-indexed position
    /// * `total` — number of candidate entries
    fn on_entry_added(&self, name: &str, index: usize, total: usize) {
        let _ = (name, index, total);
    }

    /// Called when an entry is left out (its PDF is missing or unreadable).
    fn on_entry_skipped(&self, name: &str, reason: &str) {
        let _ = (name, reason);
    }

    /// Called once the archive has been moved into place.
    fn on_archive_complete(&self, added: usize, skipped: usize) {
        let _ = (added, skipped);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopArchiveProgress;

impl ArchiveProgressCallback for NoopArchiveProgress {}

/// Shared callback handle accepted by the archiver.
pub type ArchiveProgress = Arc<dyn ArchiveProgressCallback>;
