//! Uploaded documents and the byte buffer they are decoded from.
//!
//! A [`SourceDocument`] is created in [`DocumentStatus::Processing`] when an
//! upload starts and settles exactly once, to `Ready` or `Error`. Its raw bytes
//! live in a [`GuardedBuffer`] for the whole lifetime of the document because
//! every preview re-decodes them.

use crate::error::PdfCiteError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Immutable, shareable PDF bytes that are only ever handed out as copies.
///
/// Decoders may take ownership of the buffer they are given (pdfium's
/// `load_pdf_from_byte_vec` does), so a decoder never sees the canonical
/// allocation. [`GuardedBuffer::copy`] produces a fresh `Vec<u8>` each call;
/// cloning the guard itself only bumps a reference count.
#[derive(Clone, PartialEq, Eq)]
pub struct GuardedBuffer {
    bytes: Arc<[u8]>,
}

impl GuardedBuffer {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// A fresh, independent copy for one decoder to own.
    pub fn copy(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }

    /// Read-only view, for hashing or persisting. Never pass this to a decoder.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for GuardedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GuardedBuffer({} bytes)", self.bytes.len())
    }
}

impl From<Vec<u8>> for GuardedBuffer {
    fn from(v: Vec<u8>) -> Self {
        Self::new(v)
    }
}

/// Lifecycle of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Uploading,
    Processing,
    Ready,
    Error,
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DocumentStatus::Uploading => "uploading",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Ready => "ready",
            DocumentStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// One uploaded PDF as held by the document store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    pub id: String,
    pub name: String,
    pub size_bytes: u64,
    pub page_count: usize,
    /// Per-page text tagged with `[Page n]` markers.
    pub extracted_text: String,
    /// Persisted separately by stores; `None` means previews need a re-upload.
    #[serde(skip)]
    pub raw_bytes: Option<GuardedBuffer>,
    pub status: DocumentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Creation order, used by stores to list documents in upload order.
    #[serde(default)]
    pub sequence: u64,
}

impl SourceDocument {
    /// Start tracking an upload. The document begins in `Processing`.
    pub fn processing(name: impl Into<String>, bytes: GuardedBuffer) -> Self {
        let (id, sequence) = next_document_id();
        Self {
            id,
            name: name.into(),
            size_bytes: bytes.len() as u64,
            page_count: 0,
            extracted_text: String::new(),
            raw_bytes: Some(bytes),
            status: DocumentStatus::Processing,
            error_message: None,
            sequence,
        }
    }

    /// Settle as `Ready` with the extracted text.
    pub fn mark_ready(&mut self, text: String, page_count: usize) -> Result<(), PdfCiteError> {
        self.ensure_processing()?;
        self.extracted_text = text;
        self.page_count = page_count;
        self.status = DocumentStatus::Ready;
        Ok(())
    }

    /// Settle as `Error`. Any partial text is discarded.
    pub fn mark_failed(&mut self, message: impl Into<String>) -> Result<(), PdfCiteError> {
        self.ensure_processing()?;
        self.extracted_text.clear();
        self.page_count = 0;
        self.status = DocumentStatus::Error;
        self.error_message = Some(message.into());
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.status == DocumentStatus::Ready
    }

    /// Size in mebibytes, as shown in file lists.
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / 1024.0 / 1024.0
    }

    fn ensure_processing(&self) -> Result<(), PdfCiteError> {
        if self.status == DocumentStatus::Processing {
            Ok(())
        } else {
            Err(PdfCiteError::AlreadySettled {
                id: self.id.clone(),
                status: self.status.to_string(),
            })
        }
    }
}

static LAST_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// A random 32-character hex id plus a creation sequence.
///
/// The sequence is wall-clock nanoseconds, bumped past the last value issued
/// in this process, so it orders uploads both within a run and across runs
/// sharing one store.
fn next_document_id() -> (String, u64) {
    let id = Uuid::new_v4().simple().to_string();
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let next = |last: u64| now.max(last.saturating_add(1));
    let previous = match LAST_SEQUENCE.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(next(last))) {
        Ok(prev) | Err(prev) => prev,
    };
    (id, next(previous))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_are_independent() {
        let guard = GuardedBuffer::from(b"%PDF-1.7".to_vec());
        let mut first = guard.copy();
        first.clear();
        let second = guard.copy();
        assert_eq!(second, b"%PDF-1.7");
        assert_eq!(guard.len(), 8);
    }

    #[test]
    fn settles_exactly_once() {
        let mut doc = SourceDocument::processing("a.pdf", GuardedBuffer::from(vec![1, 2, 3]));
        assert_eq!(doc.status, DocumentStatus::Processing);
        assert_eq!(doc.size_bytes, 3);

        doc.mark_ready("[Page 1]\nhello\n\n".into(), 1).unwrap();
        assert!(doc.is_ready());
        assert!(doc.mark_failed("late").is_err());
        assert!(doc.mark_ready(String::new(), 0).is_err());
        assert_eq!(doc.page_count, 1);
    }

    #[test]
    fn failure_clears_partial_text() {
        let mut doc = SourceDocument::processing("b.pdf", GuardedBuffer::from(vec![0]));
        doc.extracted_text.push_str("[Page 1]\npartial");
        doc.mark_failed("Failed to parse PDF").unwrap();
        assert_eq!(doc.status, DocumentStatus::Error);
        assert!(doc.extracted_text.is_empty());
        assert_eq!(doc.error_message.as_deref(), Some("Failed to parse PDF"));
    }

    #[test]
    fn ids_are_unique_and_opaque() {
        let a = SourceDocument::processing("a.pdf", GuardedBuffer::from(vec![]));
        let b = SourceDocument::processing("a.pdf", GuardedBuffer::from(vec![]));
        assert_ne!(a.id, b.id);
        assert_eq!(a.id.len(), 32);
        assert!(a.id.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(a.sequence < b.sequence);
    }

    #[test]
    fn ids_do_not_repeat_across_many_uploads() {
        let ids: std::collections::HashSet<String> = (0..2000)
            .map(|_| SourceDocument::processing("x.pdf", GuardedBuffer::from(vec![])).id)
            .collect();
        assert_eq!(ids.len(), 2000);
    }

    #[test]
    fn raw_bytes_are_not_serialised() {
        let doc = SourceDocument::processing("c.pdf", GuardedBuffer::from(vec![7; 16]));
        let json = serde_json::to_string(&doc).unwrap();
        assert!(json.contains("\"processing\""));
        let back: SourceDocument = serde_json::from_str(&json).unwrap();
        assert!(back.raw_bytes.is_none());
        assert_eq!(back.size_bytes, 16);
    }
}
