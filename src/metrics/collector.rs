//! Metrics collection and registry.

use crate::analysis::FramingReport;
use crate::capture::CaptureSource;
use crate::job::JobOutcome;
use prometheus::{Encoder, Gauge, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// Prometheus registry for the photo pipeline.
///
/// Shared behind an `Arc`; every recorder takes `&self`.
pub struct PipelineMetrics {
    registry: Registry,

    // Framing
    analyzer_ticks: IntCounter,
    skin_ratio: Gauge,
    capture_ready: IntGauge,
    captures_total: IntCounterVec,

    // Jobs
    jobs_submitted: IntCounter,
    variations_received: IntCounter,
    job_outcomes: IntCounterVec,

    // Post-processing
    variations_stamped: IntCounter,
    variations_passthrough: IntCounter,
    postprocess_fallbacks: IntCounter,
}

impl PipelineMetrics {
    /// Creates a new registry with all pipeline metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let analyzer_ticks = IntCounter::new(
            "passport_photo_analyzer_ticks_total",
            "Framing analysis ticks run",
        )?;
        let skin_ratio = Gauge::new(
            "passport_photo_skin_ratio",
            "Skin-tone share of the guide oval at the latest tick",
        )?;
        let capture_ready = IntGauge::new(
            "passport_photo_capture_ready",
            "Whether the latest verdict allows capture (1=yes, 0=no)",
        )?;
        let captures_total = IntCounterVec::new(
            Opts::new("passport_photo_captures_total", "Stills captured, by source"),
            &["source"],
        )?;

        let jobs_submitted = IntCounter::new(
            "passport_photo_jobs_submitted_total",
            "Generation jobs submitted",
        )?;
        let variations_received = IntCounter::new(
            "passport_photo_variations_received_total",
            "Distinct variations received from the generation service",
        )?;
        let job_outcomes = IntCounterVec::new(
            Opts::new("passport_photo_job_outcomes_total", "Finished jobs, by outcome"),
            &["outcome"],
        )?;

        let variations_stamped = IntCounter::new(
            "passport_photo_variations_stamped_total",
            "Variations cropped, upscaled and stamped for print",
        )?;
        let variations_passthrough = IntCounter::new(
            "passport_photo_variations_passthrough_total",
            "Variations returned unchanged by post-processing",
        )?;
        let postprocess_fallbacks = IntCounter::new(
            "passport_photo_postprocess_fallbacks_total",
            "Post-processing failures that fell back to the original image",
        )?;

        registry.register(Box::new(analyzer_ticks.clone()))?;
        registry.register(Box::new(skin_ratio.clone()))?;
        registry.register(Box::new(capture_ready.clone()))?;
        registry.register(Box::new(captures_total.clone()))?;
        registry.register(Box::new(jobs_submitted.clone()))?;
        registry.register(Box::new(variations_received.clone()))?;
        registry.register(Box::new(job_outcomes.clone()))?;
        registry.register(Box::new(variations_stamped.clone()))?;
        registry.register(Box::new(variations_passthrough.clone()))?;
        registry.register(Box::new(postprocess_fallbacks.clone()))?;

        Ok(Self {
            registry,
            analyzer_ticks,
            skin_ratio,
            capture_ready,
            captures_total,
            jobs_submitted,
            variations_received,
            job_outcomes,
            variations_stamped,
            variations_passthrough,
            postprocess_fallbacks,
        })
    }

    /// Records one framing analysis tick.
    pub fn record_frame(&self, report: &FramingReport) {
        self.analyzer_ticks.inc();
        self.skin_ratio.set(report.skin_ratio.unwrap_or(0.0));
        self.capture_ready
            .set(if report.verdict.allows_capture() { 1 } else { 0 });
    }

    pub fn record_capture(&self, source: CaptureSource) {
        let label = match source {
            CaptureSource::Camera => "camera",
            CaptureSource::Upload => "upload",
            CaptureSource::Sample => "sample",
        };
        self.captures_total.with_label_values(&[label]).inc();
    }

    pub fn record_job_submitted(&self) {
        self.jobs_submitted.inc();
    }

    pub fn record_variations_received(&self, count: u64) {
        self.variations_received.inc_by(count);
    }

    pub fn record_job_outcome(&self, outcome: &JobOutcome) {
        if matches!(outcome, JobOutcome::InProgress) {
            return;
        }
        self.job_outcomes
            .with_label_values(&[outcome.as_str()])
            .inc();
    }

    pub fn record_postprocess(&self, stamped: bool, fell_back: bool) {
        if stamped {
            self.variations_stamped.inc();
        } else {
            self.variations_passthrough.inc();
        }
        if fell_back {
            self.postprocess_fallbacks.inc();
        }
    }

    /// Total analyzer ticks so far.
    pub fn analyzer_ticks(&self) -> u64 {
        self.analyzer_ticks.get()
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::FramingVerdict;

    #[test]
    fn test_registry_creation() {
        let metrics = PipelineMetrics::new();
        assert!(metrics.is_ok());
    }

    #[test]
    fn test_frame_recording() {
        let metrics = PipelineMetrics::new().unwrap();
        let report = FramingReport {
            verdict: FramingVerdict::ALL,
            skin_ratio: Some(0.5),
            centroid: Some((80.0, 60.0)),
        };
        metrics.record_frame(&report);
        metrics.record_frame(&report);

        let output = metrics.encode().unwrap();
        assert_eq!(metrics.analyzer_ticks(), 2);
        assert!(output.contains("passport_photo_analyzer_ticks_total 2"));
        assert!(output.contains("passport_photo_skin_ratio 0.5"));
        assert!(output.contains("passport_photo_capture_ready 1"));
    }

    #[test]
    fn test_labelled_counters() {
        let metrics = PipelineMetrics::new().unwrap();
        metrics.record_capture(CaptureSource::Upload);
        metrics.record_job_outcome(&JobOutcome::PartialSuccess {
            warning: "short".to_string(),
        });
        metrics.record_job_outcome(&JobOutcome::InProgress);
        metrics.record_postprocess(false, true);

        let output = metrics.encode().unwrap();
        assert!(output.contains("passport_photo_captures_total{source=\"upload\"} 1"));
        assert!(output.contains("passport_photo_job_outcomes_total{outcome=\"partial\"} 1"));
        assert!(!output.contains("outcome=\"in_progress\""));
        assert!(output.contains("passport_photo_postprocess_fallbacks_total 1"));
        assert!(output.contains("passport_photo_variations_passthrough_total 1"));
    }

    #[test]
    fn test_metrics_encode() {
        let metrics = PipelineMetrics::new().unwrap();
        let output = metrics.encode().unwrap();

        assert!(output.contains("passport_photo_analyzer_ticks_total"));
        assert!(output.contains("passport_photo_jobs_submitted_total"));
        assert!(output.contains("passport_photo_variations_stamped_total"));
    }
}
