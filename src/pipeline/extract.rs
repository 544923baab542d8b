//! Per-page text extraction with page markers and progress ticks.
//!
//! Every page contributes `"[Page {n}]\n{fragments joined by ' '}\n\n"`. The
//! marker is the only link between a position in the text and a visual page;
//! citation resolution relies on the model reading it back.
//!
//! Fragment joining is a deliberate heuristic: no line or column
//! reconstruction is attempted. Pages are processed one at a time in
//! increasing order, so progress ticks are monotonic and fire exactly once
//! per page. A failure on any page fails the whole file.

use crate::document::GuardedBuffer;
use crate::error::ExtractError;
use crate::pipeline::backend::PdfBackend;
use crate::progress::ProgressState;
use std::sync::Arc;
use tracing::{debug, info};

/// Text and page count recovered from one PDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub text: String,
    pub page_count: usize,
}

/// Extract all pages of `buffer` off the async runtime.
///
/// The decoder runs inside `spawn_blocking`; `on_progress` is invoked from that
/// thread after each page and before this future resolves. Dropping the future
/// does not stop the decode: it runs to completion and its result is discarded.
pub async fn extract_text<F>(
    backend: Arc<dyn PdfBackend>,
    buffer: GuardedBuffer,
    mut on_progress: F,
) -> Result<Extraction, ExtractError>
where
    F: FnMut(ProgressState) + Send + 'static,
{
    tokio::task::spawn_blocking(move || extract_blocking(backend.as_ref(), &buffer, &mut on_progress))
        .await
        .map_err(|e| ExtractError::Parse {
            detail: format!("extraction task panicked: {e}"),
        })?
}

/// Blocking implementation of text extraction.
pub fn extract_blocking(
    backend: &dyn PdfBackend,
    buffer: &GuardedBuffer,
    on_progress: &mut dyn FnMut(ProgressState),
) -> Result<Extraction, ExtractError> {
    let document = backend.open(buffer.copy()).map_err(|e| ExtractError::Parse {
        detail: e.to_string(),
    })?;

    let total = document.page_count();
    info!("PDF decoded for extraction: {} pages", total);

    let mut text = String::new();
    for page_number in 1..=total {
        let page = document.page(page_number - 1).map_err(|e| ExtractError::Parse {
            detail: format!("page {page_number}: {e}"),
        })?;
        let fragments = page.text_fragments().map_err(|e| ExtractError::Parse {
            detail: format!("page {page_number} text: {e}"),
        })?;

        append_page(&mut text, page_number, &fragments);
        debug!(page = page_number, fragments = fragments.len(), "Extracted page text");

        on_progress(ProgressState::new(page_number, total));
    }

    Ok(Extraction {
        text,
        page_count: total,
    })
}

fn append_page(out: &mut String, page_number: usize, fragments: &[String]) {
    out.push_str(&format!("[Page {page_number}]\n"));
    out.push_str(&fragments.join(" "));
    out.push_str("\n\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::mock::MockPdfBackend;

    fn run(bytes: Vec<u8>) -> (Result<Extraction, ExtractError>, Vec<ProgressState>) {
        let backend = MockPdfBackend::new();
        let mut ticks = Vec::new();
        let result = extract_blocking(&backend, &GuardedBuffer::from(bytes), &mut |p| ticks.push(p));
        (result, ticks)
    }

    #[test]
    fn tags_each_page_and_joins_fragments_with_spaces() {
        let (result, _) = run(MockPdfBackend::document(&[
            &["Clause 1.1", "Definitions"],
            &["Fee:", "5%"],
        ]));
        let extraction = result.unwrap();
        assert_eq!(extraction.page_count, 2);
        assert_eq!(
            extraction.text,
            "[Page 1]\nClause 1.1 Definitions\n\n[Page 2]\nFee: 5%\n\n"
        );
    }

    #[test]
    fn progress_is_strictly_increasing_and_ends_at_total() {
        let (result, ticks) = run(MockPdfBackend::document(&[&["a"], &["b"], &["c"], &["d"]]));
        assert!(result.is_ok());
        assert_eq!(ticks.len(), 4);
        for (i, tick) in ticks.iter().enumerate() {
            assert_eq!(*tick, ProgressState::new(i + 1, 4));
        }
    }

    #[test]
    fn markers_appear_once_in_order() {
        let pages: Vec<Vec<String>> = (1..=12).map(|i| vec![format!("body {i}")]).collect();
        let page_refs: Vec<Vec<&str>> = pages
            .iter()
            .map(|p| p.iter().map(String::as_str).collect())
            .collect();
        let slices: Vec<&[&str]> = page_refs.iter().map(Vec::as_slice).collect();
        let (result, _) = run(MockPdfBackend::document(&slices));
        let text = result.unwrap().text;

        let mut last = 0;
        for i in 1..=12 {
            let marker = format!("[Page {i}]\n");
            assert_eq!(text.matches(&marker).count(), 1, "marker {i}");
            let at = text.find(&marker).unwrap();
            assert!(at >= last);
            assert!(text[at + marker.len()..].starts_with(&format!("body {i}")));
            last = at;
        }
    }

    #[test]
    fn zero_page_document_is_empty_not_an_error() {
        let (result, ticks) = run(MockPdfBackend::document(&[]));
        assert_eq!(
            result.unwrap(),
            Extraction {
                text: String::new(),
                page_count: 0
            }
        );
        assert!(ticks.is_empty());
    }

    #[test]
    fn undecodable_bytes_are_a_parse_error() {
        let (result, ticks) = run(b"not a pdf at all".to_vec());
        assert!(matches!(result, Err(ExtractError::Parse { .. })));
        assert!(ticks.is_empty());
    }

    #[test]
    fn one_bad_page_fails_the_whole_file() {
        let (result, ticks) = run(MockPdfBackend::document(&[&["ok"], &["!unreadable"], &["never"]]));
        let err = result.unwrap_err();
        assert!(err.to_string().contains("page 2"), "got: {err}");
        assert_eq!(ticks, vec![ProgressState::new(1, 3)]);
    }

    #[test]
    fn text_layer_failure_is_a_parse_error() {
        let (result, _) = run(MockPdfBackend::document(&[&["!notext"]]));
        assert!(matches!(result, Err(ExtractError::Parse { .. })));
    }

    #[test]
    fn independent_copies_extract_identically() {
        let backend = MockPdfBackend::new();
        let buffer = GuardedBuffer::from(MockPdfBackend::document(&[&["one"], &["two"]]));
        let first = extract_blocking(&backend, &buffer, &mut |_| {}).unwrap();
        let second = extract_blocking(&backend, &buffer, &mut |_| {}).unwrap();
        assert_eq!(first, second);
        assert_eq!(backend.open_count(), 2);
        assert!(!buffer.is_empty());
    }

    #[tokio::test]
    async fn async_extraction_reports_progress() {
        use std::sync::Mutex;

        let ticks = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&ticks);
        let backend: Arc<dyn PdfBackend> = Arc::new(MockPdfBackend::new());
        let buffer = GuardedBuffer::from(MockPdfBackend::document(&[&["x"], &["y"]]));

        let extraction = extract_text(backend, buffer, move |p| sink.lock().unwrap().push(p))
            .await
            .unwrap();

        assert_eq!(extraction.page_count, 2);
        assert_eq!(
            *ticks.lock().unwrap(),
            vec![ProgressState::new(1, 2), ProgressState::new(2, 2)]
        );
    }
}
