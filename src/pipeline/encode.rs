//! Attachment encoding for generative-service calls.
//!
//! Providers accept binary content as base64 inside the JSON request body.
//! Two shapes are produced here:
//!
//! * a whole sub-document as `application/pdf` (for providers that read PDFs
//!   natively), and
//! * one lossless PNG per rasterised page (for vision-only providers).

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// MIME type used for inline PDF attachments.
pub const PDF_MIME: &str = "application/pdf";

/// Encode a rasterised page as a base64 PNG.
///
/// `detail: "high"` keeps small print and formulas legible to the model.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded page {}x{} → {} bytes base64", img.width(), img.height(), b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// Encode a whole PDF sub-document as a single inline attachment.
pub fn encode_pdf(bytes: &[u8]) -> ImageData {
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded PDF {} bytes → {} bytes base64", bytes.len(), b64.len());
    ImageData::new(b64, PDF_MIME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let data = encode_page(&img).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(&decoded[1..4], b"PNG");
    }

    #[test]
    fn encode_pdf_keeps_bytes() {
        let data = encode_pdf(b"%PDF-1.7\n%%EOF");
        assert_eq!(data.mime_type, PDF_MIME);
        assert_eq!(STANDARD.decode(&data.data).expect("base64"), b"%PDF-1.7\n%%EOF");
    }
}
