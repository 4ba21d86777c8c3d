//! Prometheus metrics for the photo pipeline.
//!
//! # Metrics Exposed
//!
//! ## Framing
//! - `passport_photo_analyzer_ticks_total` - Analysis ticks run
//! - `passport_photo_skin_ratio` - Skin share of the guide oval at the latest tick
//! - `passport_photo_capture_ready` - Latest verdict allows capture (1/0)
//! - `passport_photo_captures_total{source}` - Stills captured
//!
//! ## Jobs
//! - `passport_photo_jobs_submitted_total` - Jobs submitted
//! - `passport_photo_variations_received_total` - Distinct variations received
//! - `passport_photo_job_outcomes_total{outcome}` - Finished jobs by outcome
//!
//! ## Post-processing
//! - `passport_photo_variations_stamped_total` - Variations cropped and stamped
//! - `passport_photo_variations_passthrough_total` - Variations left unchanged
//! - `passport_photo_postprocess_fallbacks_total` - Failures that kept the original
//!
//! With the `metrics` feature, [`MetricsServer`] exposes the registry on
//! `/metrics`.

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, PipelineMetrics};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, ServerError};
