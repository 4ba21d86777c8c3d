//! File-upload path.
//!
//! Uploaded photos skip framing validation entirely. They are decoded,
//! shrunk so that neither side exceeds [`MAX_UPLOAD_DIMENSION`], and
//! re-encoded as JPEG.

use super::still::{CaptureSource, CapturedImage, EncodeError, UPLOAD_JPEG_QUALITY};
use crate::resample::{resample_to_vec, ResampleError};
use image::RgbaImage;
use std::path::Path;
use thiserror::Error;

/// Largest width or height an uploaded photo keeps.
pub const MAX_UPLOAD_DIMENSION: u32 = 1200;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed to read upload: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to decode upload: {0}")]
    Decode(#[from] image::ImageError),
    #[error(transparent)]
    Resample(#[from] ResampleError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Target size for an upload: unchanged when both sides fit the cap,
/// otherwise the longer side becomes the cap and the other keeps the ratio.
pub fn fit_within(width: u32, height: u32, max_dim: u32) -> (u32, u32) {
    if width <= max_dim && height <= max_dim {
        return (width, height);
    }
    if width > height {
        let h = (height as f64 * max_dim as f64 / width as f64).round() as u32;
        (max_dim, h.max(1))
    } else {
        let w = (width as f64 * max_dim as f64 / height as f64).round() as u32;
        (w.max(1), max_dim)
    }
}

/// Decodes, bounds and re-encodes an uploaded photo.
pub fn prepare_upload(encoded: &[u8]) -> Result<CapturedImage, UploadError> {
    let decoded = image::load_from_memory(encoded)?.to_rgba8();
    let (src_w, src_h) = decoded.dimensions();
    let (dst_w, dst_h) = fit_within(src_w, src_h, MAX_UPLOAD_DIMENSION);

    let bounded = if (dst_w, dst_h) == (src_w, src_h) {
        decoded
    } else {
        tracing::debug!(src_w, src_h, dst_w, dst_h, "Downscaling upload");
        let pixels = resample_to_vec(decoded.as_raw(), src_w, src_h, dst_w, dst_h, None)?;
        RgbaImage::from_raw(dst_w, dst_h, pixels).ok_or(ResampleError::BadBuffer {
            width: dst_w,
            height: dst_h,
            reason: "resampled buffer size mismatch".to_string(),
        })?
    };

    let still = CapturedImage::encode_jpeg(&bounded, UPLOAD_JPEG_QUALITY, CaptureSource::Upload)?;
    tracing::info!(
        width = still.width(),
        height = still.height(),
        bytes = still.bytes().len(),
        "Prepared uploaded photo"
    );
    Ok(still)
}

/// Reads and prepares an uploaded photo from disk.
pub fn prepare_upload_file(path: impl AsRef<Path>) -> Result<CapturedImage, UploadError> {
    let encoded = std::fs::read(path)?;
    prepare_upload(&encoded)
}
