//! Remote variation generation.
//!
//! A [`VariationJobClient`] submits one captured photo to a
//! [`GenerationService`] and exposes the growing set of variations plus a
//! job status. It never returns errors to the caller: failures show up as
//! [`JobStatus::Failed`] or [`JobStatus::Timeout`] with a message, and
//! [`JobOutcome`] tells the caller whether what arrived is usable.

mod client;
mod outcome;
mod service;
mod types;

pub use client::{JobSnapshot, VariationJobClient};
pub use outcome::{
    completion_percent, estimated_variation_progress, JobOutcome, EXPECTED_VARIATION_TIME,
};
pub use service::{GenerationService, HttpGenerationService, JobTicket, ServiceError};
pub use types::{
    AuthToken, ComplianceAssessment, ComplianceCheck, JobRequest, JobStatus, JobUpdate,
    Recommendation, VariationResult,
};
