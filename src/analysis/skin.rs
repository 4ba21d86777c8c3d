//! Skin-tone classification and the oval guide region.

/// RGB skin-tone heuristic.
///
/// Tolerant of lighting and complexion rather than precise; it only needs
/// to separate a face from a typical backdrop inside the guide oval.
#[inline]
pub fn is_skin(r: u8, g: u8, b: u8) -> bool {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    r > 60
        && g > 40
        && b > 20
        && r > g
        && r > b
        && (r - g) > 10
        && (r - g).abs() < 130
        && (r - b) > 15
}

/// Horizontal radius of the guide oval as a fraction of buffer width.
pub const GUIDE_RADIUS_X: f64 = 0.28;
/// Vertical radius of the guide oval as a fraction of buffer height.
pub const GUIDE_RADIUS_Y: f64 = 0.32;

/// The on-screen oval guide, mapped into analysis-buffer coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuideOval {
    pub cx: f64,
    pub cy: f64,
    pub rx: f64,
    pub ry: f64,
}

impl GuideOval {
    /// The guide centered in a `width` x `height` buffer.
    pub fn for_buffer(width: u32, height: u32) -> Self {
        let (w, h) = (width as f64, height as f64);
        Self {
            cx: w / 2.0,
            cy: h / 2.0,
            rx: w * GUIDE_RADIUS_X,
            ry: h * GUIDE_RADIUS_Y,
        }
    }

    /// Normalized-distance membership test. Degenerate ovals contain nothing.
    #[inline]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        if self.rx <= 0.0 || self.ry <= 0.0 {
            return false;
        }
        let dx = (x - self.cx) / self.rx;
        let dy = (y - self.cy) / self.ry;
        dx * dx + dy * dy <= 1.0
    }
}
