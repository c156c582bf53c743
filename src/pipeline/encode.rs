//! Image encoding: raw document bytes → base64 payloads for model requests.
//!
//! Both model tiers that see the image take it inline in the JSON request
//! body. The OCR tier gets a `data:` URI tagged `#transform=inline`, which
//! asks OpenAI-compatible gateways that support document inlining to run
//! their own pre-processing; the visual tier gets the plain base64 payload.

use crate::model::ImagePart;
use crate::pipeline::acquire::DocumentImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

/// Base64-encoded image plus the MIME type to declare for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub data: String,
    pub mime_type: String,
}

impl EncodedImage {
    /// `data:<mime>;base64,<payload>`
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }

    /// Data URI tagged for inline transformation by the OCR gateway.
    pub fn inline_data_uri(&self) -> String {
        format!("{}#transform=inline", self.data_uri())
    }

    /// Image part for the OCR tier.
    pub fn ocr_part(&self) -> ImagePart {
        ImagePart::Url(self.inline_data_uri())
    }

    /// Image part for the visual tier.
    pub fn visual_part(&self) -> ImagePart {
        ImagePart::Base64 {
            data: self.data.clone(),
            mime_type: self.mime_type.clone(),
        }
    }
}

/// Encode an acquired document image.
///
/// The declared MIME type is the sniffed format when the bytes are a
/// recognisable image, falling back to the type the source reported. A
/// server that labels every upload `image/jpeg` still gets PNGs declared
/// correctly.
pub fn encode_image(image: &DocumentImage) -> EncodedImage {
    let mime_type = sniff_mime(&image.bytes)
        .map(str::to_string)
        .unwrap_or_else(|| image.content_type.clone());
    let data = STANDARD.encode(&image.bytes);
    debug!("Encoded {} bytes as {} → {} bytes base64", image.len(), mime_type, data.len());
    EncodedImage { data, mime_type }
}

/// Detect the image format from magic bytes.
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    image::guess_format(bytes).ok().map(|f| f.to_mime_type())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([200, 10, 10])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .expect("png encode");
        buf
    }

    #[test]
    fn sniffs_png() {
        assert_eq!(sniff_mime(&png_bytes()), Some("image/png"));
        assert_eq!(sniff_mime(b"<html></html>"), None);
    }

    #[test]
    fn encode_prefers_sniffed_type() {
        let image = DocumentImage::new(png_bytes(), "image/jpeg", "test");
        let encoded = encode_image(&image);
        assert_eq!(encoded.mime_type, "image/png");
        let decoded = STANDARD.decode(&encoded.data).expect("valid base64");
        assert_eq!(decoded, image.bytes);
    }

    #[test]
    fn encode_falls_back_to_declared_type() {
        let image = DocumentImage::new(vec![1, 2, 3], "image/heic", "test");
        assert_eq!(encode_image(&image).mime_type, "image/heic");
    }

    #[test]
    fn data_uris() {
        let encoded = EncodedImage {
            data: "QUJD".into(),
            mime_type: "image/jpeg".into(),
        };
        assert_eq!(encoded.data_uri(), "data:image/jpeg;base64,QUJD");
        assert_eq!(
            encoded.inline_data_uri(),
            "data:image/jpeg;base64,QUJD#transform=inline"
        );
        assert_eq!(
            encoded.ocr_part(),
            ImagePart::Url("data:image/jpeg;base64,QUJD#transform=inline".into())
        );
    }
}
