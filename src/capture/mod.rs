//! Camera input, still capture and the upload path.
//!
//! The [`CaptureController`] owns the video stream for as long as framing
//! is being validated and produces exactly one [`CapturedImage`] per
//! capture, either from the stream or from an uploaded file.

mod camera;
mod config;
mod controller;
#[cfg(feature = "camera")]
mod device;
mod frame;
mod still;
mod upload;

pub use camera::{Camera, CameraError, MockCamera, MockLifecycle, MockScene, StillCamera};
pub use config::{CaptureConfig, ConfigError, FileConfig, JobConfig, OutputConfig};
pub use controller::{CaptureController, CaptureError, CaptureState, LiveStatus};
#[cfg(feature = "camera")]
pub use device::DeviceCamera;
pub use frame::{Frame, BYTES_PER_PIXEL};
pub use still::{
    CaptureSource, CapturedImage, EncodeError, STREAM_JPEG_QUALITY, UPLOAD_JPEG_QUALITY,
};
pub use upload::{
    fit_within, prepare_upload, prepare_upload_file, UploadError, MAX_UPLOAD_DIMENSION,
};
