//! Scripted in-memory [`PdfBackend`] for tests and demos.
//!
//! Documents are plain UTF-8 with a `%PDF-mock` header line. Pages are
//! separated by form feeds (`\x0c`) and text fragments by `|`:
//!
//! ```text
//! %PDF-mock
//! Clause 1|Definitions\x0cClause 2|Fees are 5%
//! ```
//!
//! A page may start with `@{width}x{height};` to override its size in points
//! (default 612×792). The page bodies `!unreadable` and `!notext` make the
//! page fetch or the text fetch fail, to exercise error paths.

use crate::pipeline::backend::{DecodeError, DecodedDocument, DecodedPage, PageSize, PdfBackend};
use image::{DynamicImage, Rgba, RgbaImage};
use std::sync::atomic::{AtomicUsize, Ordering};

const HEADER: &str = "%PDF-mock\n";
const PAGE_BREAK: char = '\x0c';

/// A [`PdfBackend`] that decodes the mock format described in the module docs.
#[derive(Debug, Default)]
pub struct MockPdfBackend {
    opens: AtomicUsize,
}

impl MockPdfBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many documents have been opened through this backend.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Build mock document bytes from per-page fragment lists.
    pub fn document(pages: &[&[&str]]) -> Vec<u8> {
        let body: Vec<String> = pages.iter().map(|fragments| fragments.join("|")).collect();
        format!("{HEADER}{}", body.join(&PAGE_BREAK.to_string())).into_bytes()
    }
}

impl PdfBackend for MockPdfBackend {
    fn open(&self, bytes: Vec<u8>) -> Result<Box<dyn DecodedDocument + '_>, DecodeError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let text = String::from_utf8(bytes).map_err(|_| DecodeError::new("not UTF-8"))?;
        let body = text
            .strip_prefix(HEADER)
            .or_else(|| text.strip_prefix(HEADER.trim_end()))
            .ok_or_else(|| DecodeError::new("missing %PDF-mock header"))?;

        let pages: Vec<MockPage> = if body.is_empty() {
            Vec::new()
        } else {
            body.split(PAGE_BREAK).map(MockPage::parse).collect::<Result<_, _>>()?
        };
        Ok(Box::new(MockDocument { pages }))
    }
}

struct MockDocument {
    pages: Vec<MockPage>,
}

impl DecodedDocument for MockDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page(&self, index: usize) -> Result<Box<dyn DecodedPage + '_>, DecodeError> {
        let page = self
            .pages
            .get(index)
            .ok_or_else(|| DecodeError::new(format!("no page at index {index}")))?;
        if page.body == "!unreadable" {
            return Err(DecodeError::new(format!("page {} object is damaged", index + 1)));
        }
        Ok(Box::new(MockPageRef { page, index }))
    }
}

struct MockPage {
    size: PageSize,
    body: String,
}

impl MockPage {
    fn parse(raw: &str) -> Result<Self, DecodeError> {
        let mut size = PageSize {
            width: 612.0,
            height: 792.0,
        };
        let mut body = raw;
        if let Some(rest) = raw.strip_prefix('@') {
            let (dims, tail) = rest
                .split_once(';')
                .ok_or_else(|| DecodeError::new("unterminated page size"))?;
            let (w, h) = dims
                .split_once('x')
                .ok_or_else(|| DecodeError::new("page size must be WxH"))?;
            size = PageSize {
                width: w.trim().parse().map_err(|_| DecodeError::new("bad page width"))?,
                height: h.trim().parse().map_err(|_| DecodeError::new("bad page height"))?,
            };
            body = tail;
        }
        Ok(Self {
            size,
            body: body.to_string(),
        })
    }
}

struct MockPageRef<'a> {
    page: &'a MockPage,
    index: usize,
}

impl DecodedPage for MockPageRef<'_> {
    fn text_fragments(&self) -> Result<Vec<String>, DecodeError> {
        if self.page.body == "!notext" {
            return Err(DecodeError::new("text layer unavailable"));
        }
        if self.page.body.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.page.body.split('|').map(str::to_string).collect())
    }

    fn size(&self) -> PageSize {
        self.page.size
    }

    fn rasterize(&self, width: u32, height: u32) -> Result<DynamicImage, DecodeError> {
        if width == 0 || height == 0 {
            return Err(DecodeError::new("empty surface"));
        }
        // A shade per page plus a band whose height tracks the text length,
        // so different pages produce different pixels.
        let shade = 255u8.saturating_sub((self.index as u8).wrapping_mul(17));
        let band = (self.page.body.len() as u32 % height).max(1);
        let img = RgbaImage::from_fn(width, height, |_, y| {
            if y < band {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([shade, shade, 255, 255])
            }
        });
        Ok(DynamicImage::ImageRgba8(img))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_pages_and_fragments() {
        let backend = MockPdfBackend::new();
        let bytes = MockPdfBackend::document(&[&["a", "b"], &["c"]]);
        let doc = backend.open(bytes).unwrap();
        assert_eq!(doc.page_count(), 2);
        assert_eq!(doc.page(0).unwrap().text_fragments().unwrap(), vec!["a", "b"]);
        assert_eq!(doc.page(1).unwrap().text_fragments().unwrap(), vec!["c"]);
        assert!(doc.page(2).is_err());
        assert_eq!(backend.open_count(), 1);
    }

    #[test]
    fn rejects_non_mock_bytes() {
        let backend = MockPdfBackend::new();
        assert!(backend.open(b"hello".to_vec()).is_err());
        assert!(backend.open(Vec::new()).is_err());
    }

    #[test]
    fn header_only_is_zero_pages() {
        let backend = MockPdfBackend::new();
        let doc = backend.open(MockPdfBackend::document(&[])).unwrap();
        assert_eq!(doc.page_count(), 0);
    }

    #[test]
    fn custom_page_size() {
        let backend = MockPdfBackend::new();
        let doc = backend.open(MockPdfBackend::document(&[&["@100x50;body"]])).unwrap();
        let page = doc.page(0).unwrap();
        assert_eq!(page.size(), PageSize { width: 100.0, height: 50.0 });
        assert_eq!(page.text_fragments().unwrap(), vec!["body"]);
    }
}
