//! Capture lifecycle: stream ownership, the framing loop and still capture.
//!
//! ```text
//! idle ──start──▶ streaming ──first decodable frame──▶ validating ──capture──▶ captured
//!   ▲                 │                                    │                     │
//!   └─────stop────────┴────────────────────────────────────┘◀──────retake────────┘
//! ```
//!
//! The camera stream is held by a [`StreamGuard`] whose `Drop` stops it, so
//! every way out of streaming (capture, upload, stop, retake, drop of the
//! controller, a failed capture) releases the device.

use super::camera::{Camera, CameraError};
use super::config::CaptureConfig;
use super::still::{CaptureSource, CapturedImage, EncodeError, STREAM_JPEG_QUALITY};
use super::upload::{prepare_upload, UploadError};
use crate::analysis::{FrameAnalyzer, FrameBuffer, FramingVerdict};
use crate::metrics::PipelineMetrics;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

type SharedCamera = Arc<Mutex<Box<dyn Camera>>>;

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    /// Stream acquired, no decodable frame analysed yet ("camera loading").
    Streaming,
    /// Framing verdicts are being produced.
    Validating,
    Captured,
}

/// Latest output of the framing loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiveStatus {
    pub verdict: FramingVerdict,
    /// At least one frame of this stream decoded.
    pub has_signal: bool,
    /// Ticks completed on this stream.
    pub ticks: u64,
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error("capture requires a running tokio runtime")]
    NoRuntime,
    #[error("operation not allowed while {0:?}")]
    InvalidState(CaptureState),
    #[error("framing checks have not all passed")]
    NotReady,
    #[error("camera returned an undecodable frame")]
    EmptyFrame,
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Upload(#[from] UploadError),
}

/// Holds the camera stream open; closing it on drop.
struct StreamGuard {
    camera: SharedCamera,
}

impl StreamGuard {
    fn acquire(camera: &SharedCamera, config: &CaptureConfig) -> Result<Self, CameraError> {
        camera.lock().open(config)?;
        Ok(Self {
            camera: Arc::clone(camera),
        })
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.camera.lock().close();
        tracing::debug!("Camera stream released");
    }
}

/// The single outstanding framing timer for one stream.
struct AnalyzerLoop {
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl AnalyzerLoop {
    fn spawn(
        camera: SharedCamera,
        config: &CaptureConfig,
        status_tx: watch::Sender<LiveStatus>,
        metrics: Option<Arc<PipelineMetrics>>,
    ) -> Result<Self, CaptureError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| CaptureError::NoRuntime)?;
        let interval = config.analysis_interval();
        let (stop_tx, mut stop_rx) = oneshot::channel();

        let handle = runtime.spawn(async move {
            let mut scratch = FrameBuffer::new();
            let mut status = LiveStatus::default();

            loop {
                // A tick always finishes before the next one is scheduled.
                // Device reads block, so grab and analysis run off the
                // async workers.
                let tick = tokio::task::spawn_blocking({
                    let camera = Arc::clone(&camera);
                    let mut buffer = std::mem::take(&mut scratch);
                    move || {
                        let grabbed = camera.lock().capture();
                        let frame = match grabbed {
                            Ok(frame) => Some(frame),
                            Err(e) => {
                                tracing::debug!(error = %e, "No frame for analysis tick");
                                None
                            }
                        };
                        let has_signal = frame.as_ref().is_some_and(|f| f.is_valid());
                        let report = FrameAnalyzer::report(frame.as_ref(), &mut buffer);
                        (has_signal, report, buffer)
                    }
                });
                let (has_signal, report) = match tick.await {
                    Ok((has_signal, report, buffer)) => {
                        scratch = buffer;
                        (has_signal, report)
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Framing tick failed");
                        (false, FrameAnalyzer::report(None, &mut scratch))
                    }
                };

                if let Some(m) = &metrics {
                    m.record_frame(&report);
                }

                status.ticks += 1;
                status.has_signal |= has_signal;
                if status.verdict != report.verdict {
                    tracing::debug!(verdict = ?report.verdict, skin_ratio = ?report.skin_ratio, "Framing changed");
                }
                status.verdict = report.verdict;
                status_tx.send_replace(status);

                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            tracing::trace!(ticks = status.ticks, "Framing loop ended");
        });

        Ok(Self {
            stop: Some(stop_tx),
            handle,
        })
    }

    fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.handle.abort();
    }
}

impl Drop for AnalyzerLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Owns the camera, the framing loop and the resulting still.
pub struct CaptureController {
    config: CaptureConfig,
    camera: SharedCamera,
    phase: CaptureState,
    stream: Option<StreamGuard>,
    analyzer: Option<AnalyzerLoop>,
    status_tx: watch::Sender<LiveStatus>,
    captured: Option<CapturedImage>,
    demo_sample: Option<CapturedImage>,
    on_complete: Option<Box<dyn FnMut(CapturedImage) + Send>>,
    metrics: Option<Arc<PipelineMetrics>>,
}

impl CaptureController {
    pub fn new(camera: Box<dyn Camera>, config: CaptureConfig) -> Self {
        let (status_tx, _) = watch::channel(LiveStatus::default());
        Self {
            config,
            camera: Arc::new(Mutex::new(camera)),
            phase: CaptureState::Idle,
            stream: None,
            analyzer: None,
            status_tx,
            captured: None,
            demo_sample: None,
            on_complete: None,
            metrics: None,
        }
    }

    /// Runs on a fixed sample instead of the camera: framing always passes
    /// and retake never restarts a stream.
    pub fn with_demo_sample(mut self, sample: CapturedImage) -> Self {
        self.demo_sample = Some(sample);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Registers the callback that receives the confirmed still.
    pub fn on_complete(&mut self, callback: impl FnMut(CapturedImage) + Send + 'static) {
        self.on_complete = Some(Box::new(callback));
    }

    pub fn is_demo(&self) -> bool {
        self.demo_sample.is_some()
    }

    pub fn state(&self) -> CaptureState {
        match self.phase {
            CaptureState::Streaming if self.status_tx.borrow().has_signal => {
                CaptureState::Validating
            }
            phase => phase,
        }
    }

    /// Latest framing verdict.
    pub fn verdict(&self) -> FramingVerdict {
        if self.is_demo() {
            return FramingVerdict::ALL;
        }
        self.status_tx.borrow().verdict
    }

    /// Whether the capture action should be enabled.
    pub fn can_capture(&self) -> bool {
        matches!(self.state(), CaptureState::Validating) && self.verdict().allows_capture()
    }

    /// Subscribes to live framing status updates.
    pub fn subscribe(&self) -> watch::Receiver<LiveStatus> {
        self.status_tx.subscribe()
    }

    pub fn captured(&self) -> Option<&CapturedImage> {
        self.captured.as_ref()
    }

    /// Acquires the stream and starts the framing loop.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if let Some(sample) = &self.demo_sample {
            self.captured = Some(sample.clone());
            self.phase = CaptureState::Captured;
            return Ok(());
        }
        if self.phase != CaptureState::Idle {
            return Err(CaptureError::InvalidState(self.state()));
        }

        self.status_tx.send_replace(LiveStatus::default());
        let guard = StreamGuard::acquire(&self.camera, &self.config)?;
        let analyzer = AnalyzerLoop::spawn(
            Arc::clone(&self.camera),
            &self.config,
            self.status_tx.clone(),
            self.metrics.clone(),
        )?;

        self.stream = Some(guard);
        self.analyzer = Some(analyzer);
        self.phase = CaptureState::Streaming;
        tracing::info!(interval_ms = self.config.analysis_interval_ms, "Camera streaming");
        Ok(())
    }

    /// Stops the framing loop and releases the stream. Idempotent.
    pub fn stop(&mut self) {
        self.release_stream();
        if self.phase != CaptureState::Captured {
            self.phase = CaptureState::Idle;
        }
    }

    fn release_stream(&mut self) {
        // Loop first. A grab already in progress finishes under the camera
        // lock before the guard can close the device.
        if let Some(mut analyzer) = self.analyzer.take() {
            analyzer.stop();
        }
        if self.stream.take().is_some() {
            tracing::info!("Camera stream stopped");
        }
    }

    /// Draws the current sample into a full-resolution still.
    ///
    /// Refused unless the latest verdict passes every check. The stream is
    /// released whether or not encoding succeeds.
    pub fn capture(&mut self) -> Result<&CapturedImage, CaptureError> {
        if self.is_demo() {
            return self.captured.as_ref().ok_or(CaptureError::InvalidState(self.phase));
        }
        match self.state() {
            CaptureState::Validating => {}
            CaptureState::Streaming => return Err(CaptureError::NotReady),
            state => return Err(CaptureError::InvalidState(state)),
        }
        if !self.verdict().allows_capture() {
            return Err(CaptureError::NotReady);
        }

        if let Some(mut analyzer) = self.analyzer.take() {
            analyzer.stop();
        }
        let result = self.grab_still();
        self.release_stream();

        match result {
            Ok(still) => {
                tracing::info!(
                    width = still.width(),
                    height = still.height(),
                    bytes = still.bytes().len(),
                    "Photo captured"
                );
                if let Some(m) = &self.metrics {
                    m.record_capture(still.source());
                }
                self.phase = CaptureState::Captured;
                Ok(self.captured.insert(still))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Capture failed, stream released");
                self.phase = CaptureState::Idle;
                Err(e)
            }
        }
    }

    fn grab_still(&self) -> Result<CapturedImage, CaptureError> {
        let frame = self.camera.lock().capture()?;
        let image = frame.to_image().ok_or(CaptureError::EmptyFrame)?;
        Ok(CapturedImage::encode_jpeg(
            &image,
            STREAM_JPEG_QUALITY,
            CaptureSource::Camera,
        )?)
    }

    /// Accepts an uploaded photo. Uploads are never framing-validated.
    pub fn upload(&mut self, encoded: &[u8]) -> Result<&CapturedImage, CaptureError> {
        let still = prepare_upload(encoded)?;
        self.release_stream();
        if let Some(m) = &self.metrics {
            m.record_capture(still.source());
        }
        self.phase = CaptureState::Captured;
        Ok(self.captured.insert(still))
    }

    /// Discards the still and, outside demo mode, restarts the stream.
    pub fn retake(&mut self) -> Result<(), CaptureError> {
        self.captured = None;
        self.release_stream();
        self.phase = CaptureState::Idle;
        self.start()
    }

    /// Hands the still to the completion callback and returns it.
    pub fn confirm(&mut self) -> Option<CapturedImage> {
        let still = self.captured.clone()?;
        if let Some(callback) = self.on_complete.as_mut() {
            callback(still.clone());
        }
        Some(still)
    }

    /// Waits until framing allows capture, or the status channel closes.
    pub async fn ready(&self) -> bool {
        if self.is_demo() {
            return true;
        }
        let mut rx = self.subscribe();
        let ready = rx
            .wait_for(|s| s.has_signal && s.verdict.allows_capture())
            .await
            .is_ok();
        ready
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        self.release_stream();
    }
}
