//! Error types for the edgequake-pdfcite library.
//!
//! Errors are split by how far they are allowed to travel:
//!
//! * [`PdfCiteError`]: **Fatal** for the operation that returned it: the
//!   workspace cannot proceed (no readable context, chat not initialised,
//!   provider not configured, store unreadable).
//!
//! * [`ExtractError`]: **Per file**: one upload could not be decoded. The
//!   ingestion batch converts it into a terminal `Error` status on that
//!   document and moves on to the next file.
//!
//! * [`RenderError`]: **Per preview**: one page render failed. Each variant
//!   maps to a distinct short message so the caller can offer the right
//!   recovery (re-upload, fix the page number, try again).
//!
//! Citation resolution misses are not errors at all; see
//! [`crate::pipeline::citation`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the workspace API.
#[derive(Debug, Error)]
pub enum PdfCiteError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Workspace errors ──────────────────────────────────────────────────
    /// No stored document has the requested id.
    #[error("No document with id '{id}' in the store")]
    UnknownDocument { id: String },

    /// A document was asked to leave `Processing` twice.
    #[error("Document '{id}' already settled as {status}")]
    AlreadySettled { id: String, status: String },

    /// None of the loaded documents produced any text.
    #[error("No readable text content found.\nUpload at least one PDF that extracts successfully.")]
    NoReadableContent,

    /// A question was asked before the document context was loaded.
    #[error("Chat session not initialized. Please upload documents and load the context first.")]
    ChatNotInitialized,

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The chat transport failed.
    #[error(transparent)]
    Chat(#[from] ChatError),

    // ── Storage errors ────────────────────────────────────────────────────
    /// The document store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium (or its directory) or install pdfium\n\
system-wide so it can be found by the dynamic loader.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Text extraction failed for one file.
///
/// There is no partial result: a single bad page fails the whole file.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractError {
    /// The bytes are not a well-formed PDF, or decoding a page threw.
    #[error("Failed to parse PDF: {detail}")]
    Parse { detail: String },
}

/// A single page render failed.
///
/// The variants are mutually exclusive and each carries a human-readable
/// cause. Use [`RenderError::user_message`] for the short UI text.
#[derive(Debug, Clone, Error, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RenderError {
    /// No raw bytes are held for this document, or they are empty.
    #[error("Original PDF data not available: {detail}")]
    DataUnavailable { detail: String },

    /// The page number or scale is not a usable value.
    #[error("Invalid argument: {detail}")]
    InvalidArgument { detail: String },

    /// The page number is outside `1..=total`.
    #[error("Page {page} is out of range (valid pages: 1..{total})")]
    PageOutOfBounds { page: i64, total: usize },

    /// The page exists but could not be fetched from the decoded document.
    #[error("Page {page} could not be retrieved: {detail}")]
    PageRetrieval { page: usize, detail: String },

    /// The pixel surface could not be allocated, rendered or encoded.
    #[error("Could not build the preview surface: {detail}")]
    RenderSurface { detail: String },
}

impl RenderError {
    /// Short message suitable for a preview panel next to a "Try again" action.
    pub fn user_message(&self) -> String {
        match self {
            RenderError::DataUnavailable { .. } => {
                "Original PDF data not found. Please re-upload the file.".to_string()
            }
            RenderError::InvalidArgument { .. } => "The requested page is not a valid page number.".to_string(),
            RenderError::PageOutOfBounds { total, .. } => {
                format!("This page number is invalid. The document has pages 1 to {total}.")
            }
            RenderError::PageRetrieval { page, .. } => {
                format!("Page {page} could not be read. It may be damaged or too complex.")
            }
            RenderError::RenderSurface { .. } => "Could not build the preview image.".to_string(),
        }
    }
}

/// The chat transport could not produce a reply.
#[derive(Debug, Clone, Error)]
pub enum ChatError {
    /// The provider rejected or failed the request after all retries.
    #[error("LLM call failed after {retries} retries: {detail}")]
    Provider { retries: u32, detail: String },

    /// The reply stream broke off mid-way.
    #[error("Reply stream interrupted: {0}")]
    Stream(String),
}

/// The document store could not complete an operation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing directory failed.
    #[error("Store I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stored record could not be (de)serialised.
    #[error("Corrupt store record '{path}': {detail}")]
    Corrupt { path: PathBuf, detail: String },

    /// The id cannot name a record inside the store directory.
    #[error("Invalid document id '{id}'")]
    InvalidId { id: String },
}
