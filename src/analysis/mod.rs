//! Live framing analysis.
//!
//! A fast, local heuristic that decides whether the live frame shows a
//! face that is present, centered and sensibly sized inside the oval
//! guide. It gates the capture action only; it is not face recognition
//! and makes no biometric-quality claims.

mod analyzer;
mod skin;
mod verdict;

pub use analyzer::{
    analysis_dimensions, FrameAnalyzer, FrameBuffer, ANALYSIS_WIDTH, CENTER_TOLERANCE,
    FACE_DETECTED_RATIO, GOOD_FRAMING_MAX, GOOD_FRAMING_MIN, MAX_ANALYSIS_HEIGHT,
};
pub use skin::{is_skin, GuideOval, GUIDE_RADIUS_X, GUIDE_RADIUS_Y};
pub use verdict::{FramingReport, FramingVerdict};
