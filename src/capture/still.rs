//! Encoded still images leaving the capture stage.

use crate::data_url::{serde_base64, DataUrl};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbaImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// JPEG quality for stills taken from the live stream.
pub const STREAM_JPEG_QUALITY: u8 = 95;
/// JPEG quality for re-encoded uploads.
pub const UPLOAD_JPEG_QUALITY: u8 = 90;

const JPEG_MIME: &str = "image/jpeg";

/// Where a still came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureSource {
    Camera,
    Upload,
    Sample,
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("JPEG encoding failed: {0}")]
    Jpeg(#[from] image::ImageError),
}

/// An encoded still image ready for submission. Immutable once created.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedImage {
    #[serde(with = "serde_base64")]
    bytes: Vec<u8>,
    mime_type: String,
    width: u32,
    height: u32,
    source: CaptureSource,
}

impl CapturedImage {
    /// Encodes RGBA pixels as JPEG at the given quality.
    pub fn encode_jpeg(
        image: &RgbaImage,
        quality: u8,
        source: CaptureSource,
    ) -> Result<Self, EncodeError> {
        // JPEG carries no alpha channel.
        let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, quality).encode_image(&rgb)?;

        Ok(Self {
            bytes,
            mime_type: JPEG_MIME.to_string(),
            width: image.width(),
            height: image.height(),
            source,
        })
    }

    /// Wraps already-encoded bytes, e.g. a bundled demo sample.
    pub fn from_encoded(
        bytes: Vec<u8>,
        mime_type: impl Into<String>,
        width: u32,
        height: u32,
        source: CaptureSource,
    ) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
            width,
            height,
            source,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn source(&self) -> CaptureSource {
        self.source
    }

    pub fn to_data_url(&self) -> String {
        DataUrl::encode(&self.mime_type, &self.bytes)
    }
}

impl std::fmt::Debug for CapturedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturedImage")
            .field("mime_type", &self.mime_type)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("source", &self.source)
            .field("encoded_bytes", &self.bytes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jpeg_encoding_decodes_back() {
        let image = RgbaImage::from_pixel(32, 24, image::Rgba([200, 150, 120, 255]));
        let still =
            CapturedImage::encode_jpeg(&image, STREAM_JPEG_QUALITY, CaptureSource::Camera).unwrap();

        assert_eq!(still.mime_type(), "image/jpeg");
        assert_eq!(&still.bytes()[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(still.bytes()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
    }

    #[test]
    fn test_serde_keeps_bytes() {
        let still = CapturedImage::from_encoded(vec![1, 2, 3], "image/png", 1, 1, CaptureSource::Sample);
        let json = serde_json::to_string(&still).unwrap();
        assert!(json.contains("\"AQID\""));

        let back: CapturedImage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, still);
    }
}
