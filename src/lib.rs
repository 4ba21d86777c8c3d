//! Passport Photo Pipeline Library
//!
//! Client-side processing for identity-document photos: live framing
//! validation, still capture and upload, remote variation generation, and
//! print preparation at exact physical size.
//!
//! # Architecture
//!
//! ```text
//! capture ──▶ analysis (framing gate)
//!    │
//!    ▼
//!   job ──▶ postprocess ──▶ flow (selection, delivery)
//! ```
//!
//! # Design Principles
//!
//! - **Degrade, don't fail**: the analyzer falls back to an all-false
//!   verdict, the post-processor to the original bytes, and the job client
//!   reports status instead of returning errors
//! - **Scoped camera**: the stream is released on every exit from streaming
//! - **No face recognition**: framing is a fast heuristic that gates the
//!   capture button, nothing more
//!
//! # Example
//!
//! ```no_run
//! use passport_photo::{
//!     analysis::{FrameAnalyzer, FrameBuffer},
//!     capture::{Camera, CaptureConfig, MockCamera},
//!     postprocess::{AspectPostProcessor, DocumentType},
//! };
//!
//! let mut camera = MockCamera::new();
//! camera.open(&CaptureConfig::default()).unwrap();
//!
//! let frame = camera.capture().unwrap();
//! let mut scratch = FrameBuffer::new();
//! let verdict = FrameAnalyzer::analyze(Some(&frame), &mut scratch);
//! println!("capture allowed: {}", verdict.allows_capture());
//!
//! let generated = std::fs::read("variation-1.png").unwrap();
//! let print_ready = AspectPostProcessor::new().process_blocking(&generated, DocumentType::Passport);
//! std::fs::write("variation-1-print.png", print_ready).unwrap();
//! ```

#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod analysis;
pub mod capture;
pub mod data_url;
pub mod flow;
pub mod job;
pub mod metrics;
pub mod postprocess;
pub mod resample;

// Re-export commonly used types at crate root
pub use analysis::{FrameAnalyzer, FramingVerdict};
pub use capture::{Camera, CaptureConfig, CaptureController, CapturedImage, FileConfig, MockCamera};
pub use flow::{FlowCoordinator, FlowState, FlowStore};
pub use job::{JobOutcome, JobStatus, VariationJobClient, VariationResult};
pub use postprocess::{AspectPostProcessor, DocumentType, PhotoSpec};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
