//! Per-tick framing analysis.
//!
//! Each tick down-samples the current frame into a small scratch buffer and
//! measures how much of the oval guide is covered by skin tone and where
//! that skin sits. The work is bounded by the fixed analysis width, so a
//! tick costs the same regardless of camera resolution.

use super::skin::{is_skin, GuideOval};
use super::verdict::{FramingReport, FramingVerdict};
use crate::capture::Frame;
use crate::resample::{resample_rgba, ResampleError};

/// Width of the analysis buffer in pixels.
pub const ANALYSIS_WIDTH: u32 = 160;
/// Tallest analysis buffer. Taller sources are squashed to fit.
pub const MAX_ANALYSIS_HEIGHT: u32 = ANALYSIS_WIDTH * 4;

/// Minimum skin share of the oval for a face to count as present.
pub const FACE_DETECTED_RATIO: f64 = 0.15;
/// Lower bound (exclusive) of a well-framed skin share.
pub const GOOD_FRAMING_MIN: f64 = 0.20;
/// Upper bound (exclusive) of a well-framed skin share.
pub const GOOD_FRAMING_MAX: f64 = 0.75;
/// Allowed centroid offset as a fraction of each oval radius.
pub const CENTER_TOLERANCE: f64 = 0.4;

/// Scratch RGBA buffer reused across analysis ticks.
///
/// Contents are overwritten on every call to [`FrameAnalyzer::analyze`].
#[derive(Debug, Default, Clone)]
pub struct FrameBuffer {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a buffer from existing RGBA samples.
    ///
    /// Returns `None` when `data` does not hold exactly `width * height` samples.
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if data.len() != width as usize * height as usize * 4 {
            return None;
        }
        Some(Self {
            data,
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_rgba(&self) -> &[u8] {
        &self.data
    }

    fn reshape(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.data.resize(width as usize * height as usize * 4, 0);
    }

    #[inline]
    fn rgb(&self, x: u32, y: u32) -> (u8, u8, u8) {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        (self.data[i], self.data[i + 1], self.data[i + 2])
    }
}

/// Analysis dimensions for a source frame: fixed width, height keeping the
/// source aspect ratio, between one row and [`MAX_ANALYSIS_HEIGHT`].
pub fn analysis_dimensions(src_width: u32, src_height: u32) -> (u32, u32) {
    let scale = ANALYSIS_WIDTH as f64 / src_width as f64;
    let height = (src_height as f64 * scale)
        .round()
        .clamp(1.0, MAX_ANALYSIS_HEIGHT as f64) as u32;
    (ANALYSIS_WIDTH, height)
}

/// Stateless framing analyzer.
pub struct FrameAnalyzer;

impl FrameAnalyzer {
    /// Analyzes one frame. Never fails: a frame that cannot be sampled
    /// yields the all-false verdict.
    pub fn analyze(frame: Option<&Frame>, scratch: &mut FrameBuffer) -> FramingVerdict {
        Self::report(frame, scratch).verdict
    }

    /// Like [`analyze`](Self::analyze) but keeps the measurements.
    pub fn report(frame: Option<&Frame>, scratch: &mut FrameBuffer) -> FramingReport {
        let Some(frame) = frame.filter(|f| f.is_valid()) else {
            return FramingReport::empty();
        };

        if let Err(e) = Self::downsample(frame, scratch) {
            tracing::warn!(error = %e, sequence = frame.sequence(), "Frame down-sampling failed");
            return FramingReport::empty();
        }

        Self::measure(scratch)
    }

    /// Down-samples `frame` into `scratch` at the analysis width.
    pub fn downsample(frame: &Frame, scratch: &mut FrameBuffer) -> Result<(), ResampleError> {
        let (width, height) = analysis_dimensions(frame.width(), frame.height());
        scratch.reshape(width, height);

        if (frame.width(), frame.height()) == (width, height) {
            scratch.data.copy_from_slice(frame.pixels());
            return Ok(());
        }

        resample_rgba(
            frame.pixels(),
            frame.width(),
            frame.height(),
            &mut scratch.data,
            width,
            height,
            None,
        )
    }

    /// Measures an already down-sampled buffer.
    pub fn measure(buffer: &FrameBuffer) -> FramingReport {
        let oval = GuideOval::for_buffer(buffer.width, buffer.height);

        let mut total_oval = 0u64;
        let mut skin_in_oval = 0u64;
        let mut skin_sum_x = 0f64;
        let mut skin_sum_y = 0f64;

        for y in 0..buffer.height {
            for x in 0..buffer.width {
                if !oval.contains(x as f64, y as f64) {
                    continue;
                }
                total_oval += 1;

                let (r, g, b) = buffer.rgb(x, y);
                if is_skin(r, g, b) {
                    skin_in_oval += 1;
                    skin_sum_x += x as f64;
                    skin_sum_y += y as f64;
                }
            }
        }

        if total_oval == 0 {
            return FramingReport::empty();
        }

        let skin_ratio = skin_in_oval as f64 / total_oval as f64;
        let face_detected = skin_ratio > FACE_DETECTED_RATIO;

        if !face_detected || skin_in_oval == 0 {
            return FramingReport {
                skin_ratio: Some(skin_ratio),
                ..FramingReport::empty()
            };
        }

        let centroid_x = skin_sum_x / skin_in_oval as f64;
        let centroid_y = skin_sum_y / skin_in_oval as f64;

        let centered = (centroid_x - oval.cx).abs() < oval.rx * CENTER_TOLERANCE
            && (centroid_y - oval.cy).abs() < oval.ry * CENTER_TOLERANCE;
        let good_framing = skin_ratio > GOOD_FRAMING_MIN && skin_ratio < GOOD_FRAMING_MAX;

        FramingReport {
            verdict: FramingVerdict {
                face_detected,
                centered,
                good_framing,
            },
            skin_ratio: Some(skin_ratio),
            centroid: Some((centroid_x, centroid_y)),
        }
    }
}
