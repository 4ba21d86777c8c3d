//! Physical camera input through nokhwa.
//!
//! nokhwa device handles are not `Send` on every backend, so the device
//! lives on its own thread and frames are requested over a channel.

use super::{Camera, CameraError, CaptureConfig, Frame};
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};
use std::sync::mpsc;
use std::thread::JoinHandle;

type FrameReply = mpsc::Sender<Result<Frame, CameraError>>;

struct DeviceThread {
    requests: mpsc::Sender<FrameReply>,
    handle: JoinHandle<()>,
}

/// A webcam or other capture device.
#[derive(Default)]
pub struct DeviceCamera {
    thread: Option<DeviceThread>,
}

impl DeviceCamera {
    pub fn new() -> Self {
        Self::default()
    }
}

fn open_device(config: &CaptureConfig) -> Result<nokhwa::Camera, CameraError> {
    let format = RequestedFormat::new::<RgbAFormat>(RequestedFormatType::Closest(
        CameraFormat::new(
            Resolution::new(config.width, config.height),
            FrameFormat::MJPEG,
            config.fps,
        ),
    ));
    let mut device = nokhwa::Camera::new(CameraIndex::Index(config.device_id), format)
        .map_err(|e| CameraError::DeviceNotFound(e.to_string()))?;
    device
        .open_stream()
        .map_err(|e| CameraError::OpenFailed(e.to_string()))?;
    Ok(device)
}

fn grab(device: &mut nokhwa::Camera, sequence: u64) -> Result<Frame, CameraError> {
    let buffer = device
        .frame()
        .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;
    let decoded = buffer
        .decode_image::<RgbAFormat>()
        .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;
    let (width, height) = (decoded.width(), decoded.height());
    Ok(Frame::new(decoded.into_raw(), width, height, sequence))
}

impl Camera for DeviceCamera {
    fn open(&mut self, config: &CaptureConfig) -> Result<(), CameraError> {
        if self.thread.is_some() {
            return Ok(());
        }
        config
            .validate()
            .map_err(|e| CameraError::ConfigFailed(e.to_string()))?;

        let (requests, request_rx) = mpsc::channel::<FrameReply>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let device_id = config.device_id;
        let config = config.clone();

        let handle = std::thread::Builder::new()
            .name("camera".to_string())
            .spawn(move || {
                let mut device = match open_device(&config) {
                    Ok(device) => {
                        let _ = ready_tx.send(Ok(()));
                        device
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                let mut sequence = 0;
                // Ends when the camera handle drops its sender.
                while let Ok(reply) = request_rx.recv() {
                    let _ = reply.send(grab(&mut device, sequence));
                    sequence += 1;
                }
                if let Err(e) = device.stop_stream() {
                    tracing::warn!(error = %e, "Failed to stop camera stream");
                }
                tracing::debug!(frames = sequence, "Camera thread finished");
            })
            .map_err(|e| CameraError::OpenFailed(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                tracing::info!(device_id, "Camera opened");
                self.thread = Some(DeviceThread { requests, handle });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => Err(CameraError::OpenFailed(
                "camera thread exited during open".to_string(),
            )),
        }
    }

    fn capture(&mut self) -> Result<Frame, CameraError> {
        let thread = self.thread.as_ref().ok_or(CameraError::NotInitialized)?;
        let (reply_tx, reply_rx) = mpsc::channel();
        thread
            .requests
            .send(reply_tx)
            .map_err(|_| CameraError::CaptureFailed("camera thread stopped".to_string()))?;
        reply_rx
            .recv()
            .map_err(|_| CameraError::CaptureFailed("camera thread stopped".to_string()))?
    }

    fn is_open(&self) -> bool {
        self.thread.is_some()
    }

    fn close(&mut self) {
        if let Some(DeviceThread { requests, handle }) = self.thread.take() {
            drop(requests);
            if handle.join().is_err() {
                tracing::warn!("Camera thread panicked");
            }
        }
    }
}

impl Drop for DeviceCamera {
    fn drop(&mut self) {
        self.close();
    }
}
