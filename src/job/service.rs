//! Transport to the remote generation service.

use super::types::{
    AuthToken, ComplianceAssessment, JobRequest, JobStatus, JobUpdate, VariationResult,
};
use crate::data_url::DataUrl;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Per-request HTTP timeout. The job deadline is enforced separately.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("not authorized: {0}")]
    Unauthorized(String),
    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("request failed: {0}")]
    Network(String),
    #[error("malformed response: {0}")]
    Decode(String),
}

/// Acknowledgement of a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTicket {
    pub job_id: String,
    pub status: JobStatus,
}

/// Request/poll contract of the generation service.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Sends the photo. Called once per job.
    async fn submit(&self, request: &JobRequest) -> Result<JobTicket, ServiceError>;

    /// Fetches the current status and whatever variations are ready.
    async fn poll(&self, ticket: &JobTicket, token: &AuthToken) -> Result<JobUpdate, ServiceError>;
}

#[derive(Debug, Serialize)]
struct SubmitBody<'a> {
    image_base64: String,
    mime_type: &'a str,
    photo_type: &'a str,
    include_shoulders: bool,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: JobStatus,
    #[serde(default)]
    results: Vec<VariationPayload>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VariationPayload {
    variation_id: u32,
    image_base64: String,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    photo_type: String,
    #[serde(default)]
    icao_compliance: Option<ComplianceAssessment>,
}

impl VariationPayload {
    fn into_result(self) -> Result<VariationResult, ServiceError> {
        let decoded = DataUrl::parse(&self.image_base64).map_err(|e| {
            ServiceError::Decode(format!("variation {}: {e}", self.variation_id))
        })?;
        let mime_type = self.mime_type.unwrap_or(decoded.mime_type);
        let filename = self
            .filename
            .unwrap_or_else(|| format!("variation-{}.png", self.variation_id));

        Ok(VariationResult {
            variation_id: self.variation_id,
            image: decoded.bytes,
            filename,
            mime_type,
            photo_type: self.photo_type,
            compliance: self.icao_compliance,
        })
    }
}

/// JSON-over-HTTP implementation of [`GenerationService`].
pub struct HttpGenerationService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGenerationService {
    pub fn new(base_url: &str) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ServiceError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn check_response(
        &self,
        resp: reqwest::Response,
    ) -> Result<reqwest::Response, ServiceError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_else(|e| {
            warn!("failed to read error body: {e}");
            String::new()
        });
        match status.as_u16() {
            401 | 403 => Err(ServiceError::Unauthorized(body)),
            code => Err(ServiceError::Status { status: code, body }),
        }
    }
}

#[async_trait]
impl GenerationService for HttpGenerationService {
    async fn submit(&self, request: &JobRequest) -> Result<JobTicket, ServiceError> {
        debug!(
            bytes = request.image.len(),
            photo_type = %request.photo_type,
            "Submitting generation job"
        );

        let body = SubmitBody {
            image_base64: B64.encode(&request.image),
            mime_type: &request.mime_type,
            photo_type: &request.photo_type,
            include_shoulders: request.include_shoulders,
        };
        let resp = self
            .client
            .post(format!("{}/jobs", self.base_url))
            .bearer_auth(request.token.as_str())
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::Network(format!("submit failed: {e}")))?;

        let resp = self.check_response(resp).await?;
        resp.json()
            .await
            .map_err(|e| ServiceError::Decode(format!("submit response: {e}")))
    }

    async fn poll(&self, ticket: &JobTicket, token: &AuthToken) -> Result<JobUpdate, ServiceError> {
        let resp = self
            .client
            .get(format!("{}/jobs/{}", self.base_url, ticket.job_id))
            .bearer_auth(token.as_str())
            .send()
            .await
            .map_err(|e| ServiceError::Network(format!("poll failed: {e}")))?;

        let resp = self.check_response(resp).await?;
        let body: StatusBody = resp
            .json()
            .await
            .map_err(|e| ServiceError::Decode(format!("status response: {e}")))?;

        let mut results = Vec::with_capacity(body.results.len());
        for payload in body.results {
            match payload.into_result() {
                Ok(result) => results.push(result),
                // One bad entry should not hide the others.
                Err(e) => warn!("Skipping variation: {e}"),
            }
        }

        Ok(JobUpdate {
            status: Some(body.status),
            results,
            error: body.error,
        })
    }
}
