//! The decoder service: an injectable seam in front of the PDF library.
//!
//! The extractor and the rasteriser never talk to pdfium directly. They receive
//! an `Arc<dyn PdfBackend>` and ask it to open a byte vector they own. Tests
//! swap in [`crate::pipeline::mock::MockPdfBackend`]; production uses
//! [`PdfiumBackend`].
//!
//! Each `open` call yields an independent [`DecodedDocument`]. Handles are
//! never shared between operations, so two renders (or a render and an
//! extraction) can run side by side on copies of the same bytes.

use crate::error::PdfCiteError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};

/// A failure reported by the decoding library.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct DecodeError(pub String);

impl DecodeError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self(detail.into())
    }
}

/// Page dimensions in PDF points (1/72 inch).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

/// Opens PDF bytes into a page-addressable document.
pub trait PdfBackend: Send + Sync {
    /// Decode `bytes`. The backend takes ownership; callers pass a copy.
    fn open(&self, bytes: Vec<u8>) -> Result<Box<dyn DecodedDocument + '_>, DecodeError>;
}

/// One decoded document. Lives only for the operation that opened it.
pub trait DecodedDocument {
    fn page_count(&self) -> usize;

    /// Fetch a page by 0-based index.
    fn page(&self, index: usize) -> Result<Box<dyn DecodedPage + '_>, DecodeError>;
}

/// One page of a decoded document.
pub trait DecodedPage {
    /// Text fragments in content-stream order.
    fn text_fragments(&self) -> Result<Vec<String>, DecodeError>;

    fn size(&self) -> PageSize;

    /// Rasterise into a surface of exactly `width × height` pixels.
    fn rasterize(&self, width: u32, height: u32) -> Result<DynamicImage, DecodeError>;
}

// ── Pdfium ───────────────────────────────────────────────────────────────

/// [`PdfBackend`] over the pdfium C++ library.
///
/// Binding is done once; every `open` creates a fresh `PdfDocument`. The
/// `sync` feature of pdfium-render makes `Pdfium` `Send + Sync` and serialises
/// calls into the library, so one backend can be shared across blocking tasks.
pub struct PdfiumBackend {
    pdfium: Pdfium,
}

impl PdfiumBackend {
    /// Bind to pdfium.
    ///
    /// Resolution order: `PDFIUM_LIB_PATH` (a library file or the directory
    /// holding it), then the current directory, then the system loader path.
    pub fn bind() -> Result<Self, PdfCiteError> {
        let bindings = match std::env::var("PDFIUM_LIB_PATH") {
            Ok(path) if !path.is_empty() => {
                let path = PathBuf::from(path);
                let lib = if path.is_dir() {
                    Pdfium::pdfium_platform_library_name_at_path(&path)
                } else {
                    path
                };
                debug!("Binding pdfium from {}", lib.display());
                Pdfium::bind_to_library(&lib)
            }
            _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| PdfCiteError::PdfiumBindingFailed(format!("{e:?}")))?;

        info!("pdfium bound");
        Ok(Self {
            pdfium: Pdfium::new(bindings),
        })
    }
}

impl PdfBackend for PdfiumBackend {
    fn open(&self, bytes: Vec<u8>) -> Result<Box<dyn DecodedDocument + '_>, DecodeError> {
        let document = self
            .pdfium
            .load_pdf_from_byte_vec(bytes, None)
            .map_err(|e| DecodeError(format!("{e:?}")))?;
        Ok(Box::new(PdfiumDocument { document }))
    }
}

struct PdfiumDocument<'a> {
    document: PdfDocument<'a>,
}

impl<'a> DecodedDocument for PdfiumDocument<'a> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn page(&self, index: usize) -> Result<Box<dyn DecodedPage + '_>, DecodeError> {
        let index = u16::try_from(index)
            .map_err(|_| DecodeError(format!("page index {index} exceeds pdfium's u16 limit")))?;
        let page = self
            .document
            .pages()
            .get(index)
            .map_err(|e| DecodeError(format!("{e:?}")))?;
        Ok(Box::new(PdfiumPage { page }))
    }
}

struct PdfiumPage<'a> {
    page: PdfPage<'a>,
}

impl<'a> DecodedPage for PdfiumPage<'a> {
    fn text_fragments(&self) -> Result<Vec<String>, DecodeError> {
        let text = self.page.text().map_err(|e| DecodeError(format!("{e:?}")))?;
        Ok(text.segments().iter().map(|segment| segment.text()).collect())
    }

    fn size(&self) -> PageSize {
        PageSize {
            width: self.page.width().value,
            height: self.page.height().value,
        }
    }

    fn rasterize(&self, width: u32, height: u32) -> Result<DynamicImage, DecodeError> {
        let render_config = PdfRenderConfig::new()
            .set_target_width(width as i32)
            .set_maximum_height(height as i32);

        let bitmap = self
            .page
            .render_with_config(&render_config)
            .map_err(|e| DecodeError(format!("{e:?}")))?;
        Ok(bitmap.as_image())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn pdfium_backend_can_be_shared_across_tasks() {
        assert_send_sync::<PdfiumBackend>();
        let _share: fn(PdfiumBackend) -> Arc<dyn PdfBackend> = |backend| Arc::new(backend);
    }
}
