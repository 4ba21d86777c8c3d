//! Framing verdict produced by each analysis tick.

use serde::{Deserialize, Serialize};

/// Three-part framing judgment that gates the capture action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FramingVerdict {
    /// Enough skin tone inside the guide oval.
    pub face_detected: bool,
    /// The skin centroid sits near the oval center.
    pub centered: bool,
    /// The face fills a plausible share of the oval.
    pub good_framing: bool,
}

impl FramingVerdict {
    /// The safe default: nothing detected.
    pub const NONE: Self = Self {
        face_detected: false,
        centered: false,
        good_framing: false,
    };

    /// Every check passing, as used by the fixed-sample demo mode.
    pub const ALL: Self = Self {
        face_detected: true,
        centered: true,
        good_framing: true,
    };

    /// Capture is permitted only when all three checks pass.
    pub fn allows_capture(&self) -> bool {
        self.face_detected && self.centered && self.good_framing
    }
}

/// Detailed measurements behind a verdict, for logging and metrics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FramingReport {
    pub verdict: FramingVerdict,
    /// Skin pixels inside the oval over all pixels inside the oval.
    pub skin_ratio: Option<f64>,
    /// Mean position of skin pixels inside the oval, in buffer coordinates.
    pub centroid: Option<(f64, f64)>,
}

impl FramingReport {
    pub(crate) fn empty() -> Self {
        Self {
            verdict: FramingVerdict::NONE,
            skin_ratio: None,
            centroid: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_requires_all_checks() {
        assert!(FramingVerdict::ALL.allows_capture());
        assert!(!FramingVerdict::NONE.allows_capture());

        let almost = FramingVerdict {
            centered: false,
            ..FramingVerdict::ALL
        };
        assert!(!almost.allows_capture());
    }

    #[test]
    fn test_serializes_camel_case() {
        let json = serde_json::to_string(&FramingVerdict::ALL).unwrap();
        assert_eq!(
            json,
            r#"{"faceDetected":true,"centered":true,"goodFraming":true}"#
        );
    }
}
