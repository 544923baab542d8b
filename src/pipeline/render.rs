//! Page rasterisation: render one page of a stored document to a PNG.
//!
//! Every call starts from the raw bytes. Nothing decoded during extraction is
//! reused, and no decoded handle outlives the call, so renders of different
//! documents (or of one document while it is still being extracted elsewhere)
//! never interfere.
//!
//! ## Viewport
//!
//! The surface is the page size in points multiplied by `scale` and floored,
//! so scale 1.0 gives one pixel per point. Inline thumbnails use 1.0 and the
//! large preview 2.0 (see [`crate::config::WorkspaceConfig`]).
//!
//! ## Why spawn_blocking?
//!
//! pdfium is CPU-bound C++ and not async-aware. Rendering on the blocking pool
//! keeps the runtime's worker threads free for the chat stream.

use crate::document::GuardedBuffer;
use crate::error::RenderError;
use crate::pipeline::backend::PdfBackend;
use crate::pipeline::encode::{encode_png, RenderedPage};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Largest surface edge we will allocate, in pixels.
pub const MAX_SURFACE_DIMENSION: u32 = 16_384;

/// Renders pages through an injected decoder.
#[derive(Clone)]
pub struct Rasterizer {
    backend: Arc<dyn PdfBackend>,
}

impl Rasterizer {
    pub fn new(backend: Arc<dyn PdfBackend>) -> Self {
        Self { backend }
    }

    /// Render `page_number` (1-based) of `buffer` at `scale`.
    ///
    /// Identical arguments produce byte-identical output. Failures are
    /// returned, never retried; retrying is the caller's decision.
    pub async fn render_page(
        &self,
        buffer: Option<&GuardedBuffer>,
        page_number: i64,
        scale: f32,
    ) -> Result<RenderedPage, RenderError> {
        let buffer = require_bytes(buffer)?.clone();
        let backend = Arc::clone(&self.backend);

        tokio::task::spawn_blocking(move || {
            render_page_blocking(backend.as_ref(), Some(&buffer), page_number, scale)
        })
        .await
        .map_err(|e| RenderError::RenderSurface {
            detail: format!("render task panicked: {e}"),
        })?
    }
}

/// Blocking implementation of page rendering.
pub fn render_page_blocking(
    backend: &dyn PdfBackend,
    buffer: Option<&GuardedBuffer>,
    page_number: i64,
    scale: f32,
) -> Result<RenderedPage, RenderError> {
    let buffer = require_bytes(buffer)?;
    if !scale.is_finite() || scale <= 0.0 {
        return Err(RenderError::InvalidArgument {
            detail: format!("scale must be a positive number, got {scale}"),
        });
    }

    let document = backend
        .open(buffer.copy())
        .map_err(|e| RenderError::DataUnavailable {
            detail: format!("stored bytes could not be decoded ({e}); re-upload required"),
        })?;

    let total = document.page_count();
    if page_number < 1 || page_number as u64 > total as u64 {
        warn!("Page {} requested, document has {} pages", page_number, total);
        return Err(RenderError::PageOutOfBounds {
            page: page_number,
            total,
        });
    }
    let page_number = page_number as usize;

    let page = document
        .page(page_number - 1)
        .map_err(|e| RenderError::PageRetrieval {
            page: page_number,
            detail: e.to_string(),
        })?;

    let size = page.size();
    let (width, height) = viewport(size.width, size.height, scale)?;

    let image = page
        .rasterize(width, height)
        .map_err(|e| RenderError::RenderSurface {
            detail: format!("{width}x{height} surface: {e}"),
        })?;

    let png = encode_png(&image).map_err(|e| RenderError::RenderSurface {
        detail: format!("PNG encoding failed: {e}"),
    })?;

    info!(
        page = page_number,
        width = image.width(),
        height = image.height(),
        "Rendered page preview"
    );

    Ok(RenderedPage {
        page_number,
        width: image.width(),
        height: image.height(),
        png,
    })
}

/// Validate a user-typed page number.
///
/// Accepts whole numbers only (`"12"`, `" 3 "`, `"4.0"`). Empty input, NaN,
/// infinities and fractional values are `InvalidArgument`; range checking is
/// left to the render itself.
pub fn parse_page_number(input: &str) -> Result<i64, RenderError> {
    let trimmed = input.trim();
    if let Ok(n) = trimmed.parse::<i64>() {
        return Ok(n);
    }
    let value: f64 = trimmed.parse().map_err(|_| RenderError::InvalidArgument {
        detail: format!("'{trimmed}' is not a page number"),
    })?;
    if !value.is_finite() || value.fract() != 0.0 || value.abs() > i64::MAX as f64 {
        return Err(RenderError::InvalidArgument {
            detail: format!("'{trimmed}' is not a whole page number"),
        });
    }
    Ok(value as i64)
}

fn require_bytes(buffer: Option<&GuardedBuffer>) -> Result<&GuardedBuffer, RenderError> {
    match buffer {
        Some(b) if !b.is_empty() => Ok(b),
        Some(_) => Err(RenderError::DataUnavailable {
            detail: "stored PDF data is empty; re-upload required".into(),
        }),
        None => Err(RenderError::DataUnavailable {
            detail: "no PDF data held for this document; re-upload required".into(),
        }),
    }
}

/// Pixel surface for a page of `width_pt × height_pt` points at `scale`.
fn viewport(width_pt: f32, height_pt: f32, scale: f32) -> Result<(u32, u32), RenderError> {
    let w = (width_pt * scale).floor();
    let h = (height_pt * scale).floor();
    if !(w >= 1.0 && h >= 1.0) {
        return Err(RenderError::RenderSurface {
            detail: format!("viewport {w}x{h} is empty"),
        });
    }
    if w > MAX_SURFACE_DIMENSION as f32 || h > MAX_SURFACE_DIMENSION as f32 {
        return Err(RenderError::RenderSurface {
            detail: format!("viewport {w}x{h} exceeds {MAX_SURFACE_DIMENSION}px per side"),
        });
    }
    debug!("Viewport {}x{} pt @ {} → {}x{} px", width_pt, height_pt, scale, w, h);
    Ok((w as u32, h as u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::mock::MockPdfBackend;

    fn three_pages() -> GuardedBuffer {
        GuardedBuffer::from(MockPdfBackend::document(&[&["one"], &["two"], &["three"]]))
    }

    #[test]
    fn renders_at_scale() {
        let backend = MockPdfBackend::new();
        let page = render_page_blocking(&backend, Some(&three_pages()), 2, 1.0).unwrap();
        assert_eq!((page.page_number, page.width, page.height), (2, 612, 792));

        let big = render_page_blocking(&backend, Some(&three_pages()), 2, 2.0).unwrap();
        assert_eq!((big.width, big.height), (1224, 1584));
    }

    #[test]
    fn repeated_renders_are_byte_identical() {
        let backend = MockPdfBackend::new();
        let buffer = three_pages();
        let a = render_page_blocking(&backend, Some(&buffer), 3, 0.5).unwrap();
        let b = render_page_blocking(&backend, Some(&buffer), 3, 0.5).unwrap();
        assert_eq!(a, b);
        assert_eq!(backend.open_count(), 2);
    }

    #[test]
    fn out_of_bounds_names_range() {
        let backend = MockPdfBackend::new();
        for page in [0, 4, -1] {
            let err = render_page_blocking(&backend, Some(&three_pages()), page, 1.0).unwrap_err();
            assert_eq!(err, RenderError::PageOutOfBounds { page, total: 3 });
            assert!(err.to_string().contains("1..3"));
        }
    }

    #[test]
    fn missing_or_empty_bytes_are_data_unavailable() {
        let backend = MockPdfBackend::new();
        let none = render_page_blocking(&backend, None, 1, 1.0).unwrap_err();
        assert!(matches!(none, RenderError::DataUnavailable { .. }));

        let empty = GuardedBuffer::from(Vec::new());
        let err = render_page_blocking(&backend, Some(&empty), 1, 1.0).unwrap_err();
        assert!(matches!(err, RenderError::DataUnavailable { .. }));
        assert_eq!(backend.open_count(), 0);
    }

    #[test]
    fn invalid_scale_is_invalid_argument() {
        let backend = MockPdfBackend::new();
        for scale in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            let err = render_page_blocking(&backend, Some(&three_pages()), 1, scale).unwrap_err();
            assert!(matches!(err, RenderError::InvalidArgument { .. }), "scale {scale}");
        }
    }

    #[test]
    fn unreadable_page_is_retrieval_error() {
        let backend = MockPdfBackend::new();
        let buffer = GuardedBuffer::from(MockPdfBackend::document(&[&["ok"], &["!unreadable"]]));
        let err = render_page_blocking(&backend, Some(&buffer), 2, 1.0).unwrap_err();
        assert!(matches!(err, RenderError::PageRetrieval { page: 2, .. }));
        assert!(render_page_blocking(&backend, Some(&buffer), 1, 1.0).is_ok());
    }

    #[test]
    fn degenerate_viewport_is_surface_error() {
        let backend = MockPdfBackend::new();
        let tiny = GuardedBuffer::from(MockPdfBackend::document(&[&["@0.5x0.5;dot"]]));
        let err = render_page_blocking(&backend, Some(&tiny), 1, 1.0).unwrap_err();
        assert!(matches!(err, RenderError::RenderSurface { .. }));

        let err = render_page_blocking(&backend, Some(&three_pages()), 1, 40.0).unwrap_err();
        assert!(matches!(err, RenderError::RenderSurface { .. }));
    }

    #[test]
    fn parses_page_numbers() {
        assert_eq!(parse_page_number(" 12 ").unwrap(), 12);
        assert_eq!(parse_page_number("4.0").unwrap(), 4);
        assert_eq!(parse_page_number("0").unwrap(), 0);
        for bad in ["", "abc", "2.5", "NaN", "inf"] {
            assert!(
                matches!(parse_page_number(bad), Err(RenderError::InvalidArgument { .. })),
                "{bad:?}"
            );
        }
    }

    #[tokio::test]
    async fn async_render_matches_blocking() {
        let backend = Arc::new(MockPdfBackend::new());
        let rasterizer = Rasterizer::new(backend.clone());
        let buffer = three_pages();
        let a = rasterizer.render_page(Some(&buffer), 1, 1.0).await.unwrap();
        let b = render_page_blocking(backend.as_ref(), Some(&buffer), 1, 1.0).unwrap();
        assert_eq!(a, b);
    }
}
