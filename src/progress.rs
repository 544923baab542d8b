//! Progress reporting for document ingestion.
//!
//! Two levels exist. The extractor itself only knows about pages and reports a
//! [`ProgressState`] after every page through a plain closure. The workspace
//! wraps that into the file-level [`IngestProgressCallback`] events so a UI can
//! show "file 2 of 5, page 40 of 312".
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdfcite::{IngestProgressCallback, ProgressState, WorkspaceConfig};
//! use std::sync::Arc;
//!
//! struct PrintPages;
//!
//! impl IngestProgressCallback for PrintPages {
//!     fn on_page_extracted(&self, name: &str, progress: ProgressState) {
//!         eprintln!("{name}: {}/{} pages", progress.pages_done, progress.pages_total);
//!     }
//! }
//!
//! let config = WorkspaceConfig::builder()
//!     .progress_callback(Arc::new(PrintPages) as Arc<dyn IngestProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Pages processed so far for one in-flight extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProgressState {
    pub pages_done: usize,
    pub pages_total: usize,
}

impl ProgressState {
    pub fn new(pages_done: usize, pages_total: usize) -> Self {
        Self {
            pages_done,
            pages_total,
        }
    }

    /// Completed fraction in `0.0..=1.0`; an empty document counts as done.
    pub fn fraction(&self) -> f64 {
        if self.pages_total == 0 {
            1.0
        } else {
            self.pages_done as f64 / self.pages_total as f64
        }
    }
}

/// Called by [`crate::workspace::Workspace::ingest`] as it works through a batch.
///
/// Files are processed one at a time, so events for different files never
/// interleave. All methods default to no-ops.
pub trait IngestProgressCallback: Send + Sync {
    /// Called once before the first file.
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called before a file is decoded. `file_index` is 1-based.
    fn on_file_start(&self, file_index: usize, total_files: usize, name: &str) {
        let _ = (file_index, total_files, name);
    }

    /// Called after each page, in strictly increasing page order.
    fn on_page_extracted(&self, name: &str, progress: ProgressState) {
        let _ = (name, progress);
    }

    /// Called when a file settles as `Ready`.
    fn on_file_ready(&self, name: &str, page_count: usize) {
        let _ = (name, page_count);
    }

    /// Called when a file settles as `Error`.
    fn on_file_error(&self, name: &str, error: &str) {
        let _ = (name, error);
    }

    /// Called once after every file has been attempted.
    fn on_batch_complete(&self, total_files: usize, ready_count: usize) {
        let _ = (total_files, ready_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl IngestProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::WorkspaceConfig`].
pub type ProgressCallback = Arc<dyn IngestProgressCallback>;
