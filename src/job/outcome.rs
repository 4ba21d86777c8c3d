//! What a job's state means for the caller, and progress estimates.

use super::types::JobStatus;
use std::time::Duration;

/// Expected time for one variation to arrive.
pub const EXPECTED_VARIATION_TIME: Duration = Duration::from_secs(30);

/// Caller-facing reading of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    InProgress,
    /// Every expected variation arrived.
    Completed,
    /// Usable output exists, but the job ended short or reported an error.
    PartialSuccess { warning: String },
    /// Nothing usable arrived. The caller should offer a retry.
    Fatal { message: String, retry: bool },
}

impl JobOutcome {
    /// Classifies a job from its status and result count.
    ///
    /// A timeout or failure with at least one result is partial success;
    /// only zero results is fatal.
    pub fn classify(
        status: JobStatus,
        completed: usize,
        total: usize,
        error: Option<&str>,
    ) -> Self {
        let shortfall = || format!("Only {completed} of {total} variations were generated");

        match status {
            JobStatus::Pending | JobStatus::Processing => Self::InProgress,
            _ if completed == 0 => Self::Fatal {
                message: match (status, error) {
                    (JobStatus::Timeout, _) => "Processing is taking too long".to_string(),
                    (_, Some(error)) => error.to_string(),
                    _ => "Can't process right now".to_string(),
                },
                retry: true,
            },
            JobStatus::Completed if completed >= total && error.is_none() => Self::Completed,
            _ => Self::PartialSuccess {
                warning: error.map(str::to_string).unwrap_or_else(shortfall),
            },
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }

    /// Results exist and may be shown.
    pub fn has_output(&self) -> bool {
        matches!(self, Self::Completed | Self::PartialSuccess { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::PartialSuccess { .. } => "partial",
            Self::Fatal { .. } => "fatal",
        }
    }
}

/// Share of expected variations received, in percent.
pub fn completion_percent(completed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (completed.min(total) as f64 / total as f64) * 100.0
}

/// Estimated progress of a variation still being generated, in percent.
///
/// Fills to 90% over [`EXPECTED_VARIATION_TIME`], then creeps up by 10%
/// per further minute without ever reaching 100%.
pub fn estimated_variation_progress(elapsed: Duration) -> f64 {
    let seconds = elapsed.as_secs() as f64;
    let expected = EXPECTED_VARIATION_TIME.as_secs() as f64;
    if seconds < expected {
        seconds / expected * 90.0
    } else {
        90.0 + ((seconds - expected) / 60.0 * 10.0).min(9.0)
    }
}
