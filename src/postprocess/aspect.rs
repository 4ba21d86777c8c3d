//! Crop-to-ratio, 300 DPI upscale and resolution stamping.
//!
//! Processing is best-effort: a result that cannot be decoded or
//! re-encoded is handed back unchanged, so a bad image never blocks the
//! user from picking a variation.

use super::png::{set_density, ChunkError, PhysicalDensity};
use super::spec::{spec_for, DocumentType, PhotoSpec, TARGET_DPI};
use crate::data_url::DataUrl;
use crate::resample::{resample_to_vec, CropRect, ResampleError};
use image::{ImageFormat, ImageReader, RgbaImage};
use std::io::Cursor;
use std::sync::Arc;
use thiserror::Error;

pub const PNG_MIME: &str = "image/png";

#[derive(Debug, Error)]
pub enum PostProcessError {
    #[error("failed to decode source image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("failed to read source image: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Resample(#[from] ResampleError),
    #[error("failed to stamp resolution: {0}")]
    Chunk(#[from] ChunkError),
}

/// What a source image needs to become print-accurate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropPlan {
    /// Centered horizontal crop keeping the full source height.
    pub crop: CropRect,
    pub output_width: u32,
    pub output_height: u32,
}

impl CropPlan {
    /// Plans the crop for a `src_w` x `src_h` source, or `None` when the
    /// source is already no wider than the target ratio.
    pub fn for_source(src_w: u32, src_h: u32, spec: &PhotoSpec) -> Option<Self> {
        if src_w == 0 || src_h == 0 {
            return None;
        }
        let src_ratio = src_w as f64 / src_h as f64;
        if src_ratio <= spec.ratio {
            return None;
        }

        let crop_width = (src_h as f64 * spec.ratio).round() as u32;
        let offset = ((src_w - crop_width) as f64 / 2.0).round() as u32;
        let (output_width, output_height) = spec.pixel_dimensions();

        Some(Self {
            crop: CropRect {
                left: offset,
                top: 0,
                width: crop_width.max(1),
                height: src_h,
            },
            output_width,
            output_height,
        })
    }
}

/// Outcome of one post-processing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Processed {
    /// Cropped, upscaled and stamped PNG.
    Stamped(Vec<u8>),
    /// Input returned as-is: square spec, unknown type or no crop needed.
    Unchanged,
    /// Input returned as-is because processing failed.
    Fallback,
}

/// Deterministic print post-processor.
#[derive(Debug, Clone, Copy, Default)]
pub struct AspectPostProcessor;

impl AspectPostProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Produces the print-ready bytes for `image`. Never fails: anything
    /// that cannot be processed comes back unchanged.
    pub async fn process(&self, image: Vec<u8>, document_type: DocumentType) -> Vec<u8> {
        let spec = document_type.spec();
        Self::process_with(image, move |bytes| Self::run(bytes, &spec)).await
    }

    /// Runs `pipeline` on the blocking pool. The source stays shared with
    /// the caller so a panicked or cancelled task still yields it.
    async fn process_with<F>(image: Vec<u8>, pipeline: F) -> Vec<u8>
    where
        F: FnOnce(&[u8]) -> Processed + Send + 'static,
    {
        let image: Arc<[u8]> = image.into();
        let source = Arc::clone(&image);
        match tokio::task::spawn_blocking(move || pipeline(&source)).await {
            Ok(Processed::Stamped(png)) => png,
            Ok(Processed::Unchanged | Processed::Fallback) => image.to_vec(),
            Err(e) => {
                tracing::warn!(error = %e, "Post-processing task did not complete");
                image.to_vec()
            }
        }
    }

    /// Blocking form of [`process`](Self::process).
    pub fn process_blocking(&self, image: &[u8], document_type: DocumentType) -> Vec<u8> {
        Self::resolve(image.to_vec(), Self::run(image, &document_type.spec()))
    }

    /// Data URL form, for document types given as text. Unknown types and
    /// undecodable URLs return the input string.
    pub fn process_data_url(&self, data_url: &str, document_type: &str) -> String {
        let Some(spec) = spec_for(document_type) else {
            return data_url.to_string();
        };
        let parsed = match DataUrl::parse(data_url) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(error = %e, "Unreadable data URL, leaving as-is");
                return data_url.to_string();
            }
        };
        match Self::run(&parsed.bytes, &spec) {
            Processed::Stamped(png) => DataUrl::encode(PNG_MIME, &png),
            Processed::Unchanged | Processed::Fallback => data_url.to_string(),
        }
    }

    fn resolve(original: Vec<u8>, outcome: Processed) -> Vec<u8> {
        match outcome {
            Processed::Stamped(png) => png,
            Processed::Unchanged | Processed::Fallback => original,
        }
    }

    /// Runs the pipeline and reports what happened.
    pub fn run(image: &[u8], spec: &PhotoSpec) -> Processed {
        if spec.is_square() {
            return Processed::Unchanged;
        }
        match Self::try_run(image, spec) {
            Ok(Some(png)) => Processed::Stamped(png),
            Ok(None) => Processed::Unchanged,
            Err(e) => {
                tracing::warn!(error = %e, "Post-processing failed, keeping original image");
                Processed::Fallback
            }
        }
    }

    fn try_run(image: &[u8], spec: &PhotoSpec) -> Result<Option<Vec<u8>>, PostProcessError> {
        // Dimensions first: most already-correct inputs never need a full decode.
        let (src_w, src_h) = ImageReader::new(Cursor::new(image))
            .with_guessed_format()?
            .into_dimensions()?;
        let Some(plan) = CropPlan::for_source(src_w, src_h, spec) else {
            tracing::debug!(src_w, src_h, ratio = spec.ratio, "No crop needed");
            return Ok(None);
        };

        let source = image::load_from_memory(image)?.to_rgba8();
        let pixels = resample_to_vec(
            source.as_raw(),
            src_w,
            src_h,
            plan.output_width,
            plan.output_height,
            Some(plan.crop),
        )?;
        let output = RgbaImage::from_raw(plan.output_width, plan.output_height, pixels)
            .ok_or(ResampleError::BadBuffer {
                width: plan.output_width,
                height: plan.output_height,
                reason: "resampled buffer size mismatch".to_string(),
            })?;

        let mut encoded = Cursor::new(Vec::new());
        output.write_to(&mut encoded, ImageFormat::Png)?;
        let stamped = set_density(encoded.get_ref(), PhysicalDensity::from_dpi(TARGET_DPI))?;

        tracing::debug!(
            src_w,
            src_h,
            crop_left = plan.crop.left,
            crop_width = plan.crop.width,
            out_w = plan.output_width,
            out_h = plan.output_height,
            "Cropped and stamped for print"
        );
        Ok(Some(stamped))
    }
}
