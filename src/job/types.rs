//! Job status, generated variations and their compliance assessments.

use crate::data_url::{serde_base64, DataUrl};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle of one generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Timeout,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Timeout)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote verdict on whether a variation meets identity-photo standards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    Accept,
    Review,
    Reject,
    #[serde(other)]
    Unknown,
}

impl Recommendation {
    /// Short badge text shown over a variation.
    pub fn badge_label(&self) -> &'static str {
        match self {
            Self::Accept => "ICAO OK",
            Self::Review => "Review",
            Self::Reject => "Failed",
            Self::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceCheck {
    pub pass: bool,
    pub detail: String,
}

/// Compliance assessment attached to a variation by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceAssessment {
    pub recommendation: Recommendation,
    pub confidence_score: f64,
    #[serde(default)]
    pub checks: BTreeMap<String, ComplianceCheck>,
    #[serde(default)]
    pub issues: Vec<String>,
}

impl ComplianceAssessment {
    /// "All checks passed", or the number of reported issues.
    pub fn issue_summary(&self) -> String {
        match self.issues.len() {
            0 => "All checks passed".to_string(),
            1 => "1 issue".to_string(),
            n => format!("{n} issues"),
        }
    }

    pub fn failed_checks(&self) -> impl Iterator<Item = (&str, &ComplianceCheck)> {
        self.checks
            .iter()
            .filter(|(_, check)| !check.pass)
            .map(|(name, check)| (name.as_str(), check))
    }
}

/// One generated candidate photo, keyed by its 1-based variation id.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct VariationResult {
    pub variation_id: u32,
    #[serde(with = "serde_base64")]
    pub image: Vec<u8>,
    pub filename: String,
    pub mime_type: String,
    pub photo_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliance: Option<ComplianceAssessment>,
}

impl VariationResult {
    pub fn to_data_url(&self) -> String {
        DataUrl::encode(&self.mime_type, &self.image)
    }
}

impl fmt::Debug for VariationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariationResult")
            .field("variation_id", &self.variation_id)
            .field("bytes", &self.image.len())
            .field("filename", &self.filename)
            .field("mime_type", &self.mime_type)
            .field("photo_type", &self.photo_type)
            .field("compliance", &self.compliance.as_ref().map(|c| c.recommendation))
            .finish()
    }
}

/// Bearer token attached to submissions. Never empty.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            None
        } else {
            Some(Self(token.trim().to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(***)")
    }
}

/// Everything a submission carries to the service.
#[derive(Clone)]
pub struct JobRequest {
    pub image: Vec<u8>,
    pub mime_type: String,
    pub photo_type: String,
    pub include_shoulders: bool,
    pub token: AuthToken,
}

impl fmt::Debug for JobRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRequest")
            .field("bytes", &self.image.len())
            .field("mime_type", &self.mime_type)
            .field("photo_type", &self.photo_type)
            .field("include_shoulders", &self.include_shoulders)
            .finish_non_exhaustive()
    }
}

/// One status report from the service.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub results: Vec<VariationResult>,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminality() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Timeout.is_terminal());
        assert_eq!(
            serde_json::from_str::<JobStatus>("\"timeout\"").unwrap(),
            JobStatus::Timeout
        );
    }

    #[test]
    fn test_compliance_from_wire() {
        let json = r#"{
            "recommendation": "REVIEW",
            "confidence_score": 72.5,
            "checks": {
                "background": {"pass": true, "detail": "Plain white"},
                "head_size": {"pass": false, "detail": "Head too small"}
            },
            "issues": ["Head too small"]
        }"#;
        let assessment: ComplianceAssessment = serde_json::from_str(json).unwrap();
        assert_eq!(assessment.recommendation.badge_label(), "Review");
        assert_eq!(assessment.issue_summary(), "1 issue");
        let failed: Vec<_> = assessment.failed_checks().map(|(name, _)| name).collect();
        assert_eq!(failed, vec!["head_size"]);
    }

    #[test]
    fn test_unknown_recommendation_and_summary() {
        let assessment: ComplianceAssessment =
            serde_json::from_str(r#"{"recommendation": "MAYBE", "confidence_score": 10}"#)
                .unwrap();
        assert_eq!(assessment.recommendation, Recommendation::Unknown);
        assert_eq!(assessment.recommendation.badge_label(), "Unknown");
        assert_eq!(assessment.issue_summary(), "All checks passed");

        let many = ComplianceAssessment {
            issues: vec!["a".into(), "b".into(), "c".into()],
            ..assessment
        };
        assert_eq!(many.issue_summary(), "3 issues");
        assert_eq!(Recommendation::Accept.badge_label(), "ICAO OK");
        assert_eq!(Recommendation::Reject.badge_label(), "Failed");
    }

    #[test]
    fn test_auth_token_rejects_blank() {
        assert!(AuthToken::new("   ").is_none());
        let token = AuthToken::new(" abc ").unwrap();
        assert_eq!(token.as_str(), "abc");
        assert_eq!(format!("{token:?}"), "AuthToken(***)");
    }
}
