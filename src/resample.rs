//! RGBA resampling shared by the analyzer, the upload path and the
//! print post-processor.
//!
//! Wraps `fast_image_resize` with bilinear convolution. An optional source
//! crop is applied in the same pass, so crop + scale never materialises an
//! intermediate image.

use fast_image_resize::images::{Image, ImageRef};
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use thiserror::Error;

/// Errors from the resampling backend.
#[derive(Debug, Error)]
pub enum ResampleError {
    #[error("image has zero width or height")]
    EmptyImage,
    #[error("pixel buffer does not match {width}x{height}: {reason}")]
    BadBuffer {
        width: u32,
        height: u32,
        reason: String,
    },
    #[error("resize failed: {0}")]
    Resize(String),
}

/// A source rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

/// Resamples `src` (RGBA, `src_w` x `src_h`) into `dst` (RGBA, `dst_w` x `dst_h`).
///
/// When `crop` is given, only that region of the source is mapped onto the
/// full destination.
pub fn resample_rgba(
    src: &[u8],
    src_w: u32,
    src_h: u32,
    dst: &mut [u8],
    dst_w: u32,
    dst_h: u32,
    crop: Option<CropRect>,
) -> Result<(), ResampleError> {
    if src_w == 0 || src_h == 0 || dst_w == 0 || dst_h == 0 {
        return Err(ResampleError::EmptyImage);
    }

    let src_image =
        ImageRef::new(src_w, src_h, src, PixelType::U8x4).map_err(|e| ResampleError::BadBuffer {
            width: src_w,
            height: src_h,
            reason: e.to_string(),
        })?;
    let mut dst_image = Image::from_slice_u8(dst_w, dst_h, dst, PixelType::U8x4).map_err(|e| {
        ResampleError::BadBuffer {
            width: dst_w,
            height: dst_h,
            reason: e.to_string(),
        }
    })?;

    let mut options =
        ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear));
    if let Some(rect) = crop {
        options = options.crop(
            rect.left as f64,
            rect.top as f64,
            rect.width as f64,
            rect.height as f64,
        );
    }

    Resizer::new()
        .resize(&src_image, &mut dst_image, &options)
        .map_err(|e| ResampleError::Resize(e.to_string()))
}

/// Allocating variant of [`resample_rgba`].
pub fn resample_to_vec(
    src: &[u8],
    src_w: u32,
    src_h: u32,
    dst_w: u32,
    dst_h: u32,
    crop: Option<CropRect>,
) -> Result<Vec<u8>, ResampleError> {
    let mut dst = vec![0u8; dst_w as usize * dst_h as usize * 4];
    resample_rgba(src, src_w, src_h, &mut dst, dst_w, dst_h, crop)?;
    Ok(dst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_color_survives_downscale() {
        let src = [10u8, 20, 30, 255].repeat(64 * 48);
        let out = resample_to_vec(&src, 64, 48, 16, 12, None).unwrap();

        assert_eq!(out.len(), 16 * 12 * 4);
        assert!(out.chunks_exact(4).all(|p| p == [10, 20, 30, 255]));
    }

    #[test]
    fn test_crop_selects_region() {
        // Left half black, right half white.
        let mut src = Vec::with_capacity(40 * 10 * 4);
        for _y in 0..10 {
            for x in 0..40 {
                let v = if x < 20 { 0 } else { 255 };
                src.extend_from_slice(&[v, v, v, 255]);
            }
        }
        let crop = CropRect {
            left: 24,
            top: 0,
            width: 12,
            height: 10,
        };
        let out = resample_to_vec(&src, 40, 10, 6, 5, Some(crop)).unwrap();
        assert!(out.chunks_exact(4).all(|p| p[0] == 255));
    }

    #[test]
    fn test_zero_sized_destination_rejected() {
        let src = vec![0u8; 4 * 4 * 4];
        assert!(matches!(
            resample_to_vec(&src, 4, 4, 0, 4, None),
            Err(ResampleError::EmptyImage)
        ));
    }

    #[test]
    fn test_short_buffer_rejected() {
        let src = vec![0u8; 10];
        assert!(matches!(
            resample_to_vec(&src, 4, 4, 2, 2, None),
            Err(ResampleError::BadBuffer { .. })
        ));
    }
}
