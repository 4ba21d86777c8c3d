//! Camera abstraction for frame capture.
//!
//! This module provides a trait-based abstraction over video sources,
//! allowing the capture controller to run against synthetic scenes in
//! tests and against a still image in the CLI.

use super::{CaptureConfig, Frame};
use image::{Rgba, RgbaImage};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during camera operations.
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera device not found: {0}")]
    DeviceNotFound(String),
    #[error("failed to open camera: {0}")]
    OpenFailed(String),
    #[error("failed to configure camera: {0}")]
    ConfigFailed(String),
    #[error("failed to capture frame: {0}")]
    CaptureFailed(String),
    #[error("camera not initialized")]
    NotInitialized,
}

/// Trait for video sources.
pub trait Camera: Send {
    /// Opens and initializes the camera with the given configuration.
    fn open(&mut self, config: &CaptureConfig) -> Result<(), CameraError>;

    /// Captures a single full-resolution frame.
    fn capture(&mut self) -> Result<Frame, CameraError>;

    /// Checks if the camera is currently open.
    fn is_open(&self) -> bool;

    /// Stops the stream and releases the device.
    fn close(&mut self);
}

/// What the mock camera shows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockScene {
    /// A skin-toned oval centered in the frame. `coverage` is the share of
    /// the on-screen guide oval that the face fills.
    Face { coverage: f64 },
    /// An empty backdrop.
    Empty,
    /// Frames that never decode, as a stream that is still warming up.
    NoSignal,
}

/// Open/close bookkeeping shared between a [`MockCamera`] and a test.
#[derive(Debug, Default)]
pub struct MockLifecycle {
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl MockLifecycle {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Streams opened but not yet released.
    pub fn active(&self) -> usize {
        self.opened().saturating_sub(self.closed())
    }
}

const SKIN: Rgba<u8> = Rgba([205, 150, 120, 255]);
const BACKDROP: Rgba<u8> = Rgba([40, 60, 90, 255]);

/// Mock camera for testing that renders synthetic scenes.
#[derive(Debug)]
pub struct MockCamera {
    config: Option<CaptureConfig>,
    scene: MockScene,
    sequence: u64,
    lifecycle: Arc<MockLifecycle>,
}

impl Default for MockCamera {
    fn default() -> Self {
        Self::with_scene(MockScene::Face { coverage: 0.45 })
    }
}

impl MockCamera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scene(scene: MockScene) -> Self {
        Self {
            config: None,
            scene,
            sequence: 0,
            lifecycle: Arc::new(MockLifecycle::default()),
        }
    }

    /// Handle for observing stream acquisition and release.
    pub fn lifecycle(&self) -> Arc<MockLifecycle> {
        Arc::clone(&self.lifecycle)
    }

    fn render(&self, width: u32, height: u32) -> RgbaImage {
        let mut image = RgbaImage::from_pixel(width, height, BACKDROP);
        let MockScene::Face { coverage } = self.scene else {
            return image;
        };

        // Concentric with the guide oval; area scales with the square of the radii.
        let scale = coverage.clamp(0.0, 4.0).sqrt();
        let cx = width as f64 / 2.0;
        let cy = height as f64 / 2.0;
        let rx = width as f64 * 0.28 * scale;
        let ry = height as f64 * 0.32 * scale;
        if rx <= 0.0 || ry <= 0.0 {
            return image;
        }

        for (x, y, pixel) in image.enumerate_pixels_mut() {
            let dx = (x as f64 + 0.5 - cx) / rx;
            let dy = (y as f64 + 0.5 - cy) / ry;
            if dx * dx + dy * dy <= 1.0 {
                *pixel = SKIN;
            }
        }
        image
    }
}

impl Camera for MockCamera {
    fn open(&mut self, config: &CaptureConfig) -> Result<(), CameraError> {
        config
            .validate()
            .map_err(|e| CameraError::ConfigFailed(e.to_string()))?;
        self.config = Some(config.clone());
        self.sequence = 0;
        self.lifecycle.opened.fetch_add(1, Ordering::SeqCst);
        tracing::info!(scene = ?self.scene, "MockCamera opened");
        Ok(())
    }

    fn capture(&mut self) -> Result<Frame, CameraError> {
        let config = self.config.as_ref().ok_or(CameraError::NotInitialized)?;
        self.sequence += 1;

        if self.scene == MockScene::NoSignal {
            return Ok(Frame::new(Vec::new(), 0, 0, self.sequence));
        }

        let image = self.render(config.width, config.height);
        Ok(Frame::from_image(image, self.sequence))
    }

    fn is_open(&self) -> bool {
        self.config.is_some()
    }

    fn close(&mut self) {
        if self.config.take().is_some() {
            self.lifecycle.closed.fetch_add(1, Ordering::SeqCst);
            tracing::info!("MockCamera closed");
        }
    }
}

/// A camera that replays one still image for every frame.
///
/// Used by the CLI to drive the live framing loop from a photo on disk.
#[derive(Debug)]
pub struct StillCamera {
    image: RgbaImage,
    open: bool,
    sequence: u64,
}

impl StillCamera {
    pub fn new(image: RgbaImage) -> Self {
        Self {
            image,
            open: false,
            sequence: 0,
        }
    }

    /// Decodes an image file into a still source.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CameraError> {
        let path = path.as_ref();
        let image = image::open(path)
            .map_err(|e| CameraError::DeviceNotFound(format!("{}: {}", path.display(), e)))?;
        Ok(Self::new(image.to_rgba8()))
    }
}

impl Camera for StillCamera {
    fn open(&mut self, _config: &CaptureConfig) -> Result<(), CameraError> {
        if self.image.width() == 0 || self.image.height() == 0 {
            return Err(CameraError::OpenFailed("still image is empty".to_string()));
        }
        self.open = true;
        self.sequence = 0;
        tracing::info!(
            width = self.image.width(),
            height = self.image.height(),
            "StillCamera opened"
        );
        Ok(())
    }

    fn capture(&mut self) -> Result<Frame, CameraError> {
        if !self.open {
            return Err(CameraError::NotInitialized);
        }
        self.sequence += 1;
        Ok(Frame::from_image(self.image.clone(), self.sequence))
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) {
        self.open = false;
    }
}
