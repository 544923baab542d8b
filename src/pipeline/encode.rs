//! Image encoding: `DynamicImage` → PNG bytes → `data:` URI.
//!
//! PNG keeps rendered text crisp, and encoding is deterministic: the same
//! pixels always produce the same bytes, which makes repeated previews of one
//! page byte-identical.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use tracing::debug;

/// A rasterised page ready to hand to a preview surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedPage {
    /// 1-based page number.
    pub page_number: usize,
    pub width: u32,
    pub height: u32,
    /// PNG-encoded pixels.
    pub png: Vec<u8>,
}

impl RenderedPage {
    /// `data:image/png;base64,...` for embedding in HTML or chat UIs.
    pub fn to_data_uri(&self) -> String {
        format!("data:image/png;base64,{}", STANDARD.encode(&self.png))
    }
}

/// Encode a rendered surface as PNG.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!("Encoded {}x{} surface → {} bytes PNG", img.width(), img.height(), buf.len());
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let png = encode_png(&img).expect("encode should succeed");
        assert_eq!(&png[1..4], b"PNG");

        let page = RenderedPage {
            page_number: 1,
            width: 10,
            height: 10,
            png,
        };
        let uri = page.to_data_uri();
        let b64 = uri.strip_prefix("data:image/png;base64,").expect("data uri prefix");
        assert_eq!(STANDARD.decode(b64).expect("valid base64"), page.png);
    }

    #[test]
    fn encoding_is_deterministic() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_fn(32, 16, |x, y| {
            Rgba([x as u8, y as u8, 7, 255])
        }));
        assert_eq!(encode_png(&img).unwrap(), encode_png(&img).unwrap());
    }
}
