//! Per-mode submission strategies.

use crate::client::{BiometricClient, ClientError};
use crate::types::{Descriptor, FailureReason, Mode, Outcome};
use async_trait::async_trait;
use std::sync::Arc;

pub const NOT_RECOGNIZED: &str = "face not recognized";

/// Strategy for dispatching an accepted descriptor to the backend.
#[async_trait]
pub trait Submitter: Send + Sync {
    /// Returns the success outcome, or the failure to surface for retry.
    async fn submit(&self, descriptor: &Descriptor) -> Result<Outcome, FailureReason>;
}

/// Registers the descriptor against a known subject.
pub struct EnrollSubmitter {
    client: Arc<dyn BiometricClient>,
    subject_id: String,
}

impl EnrollSubmitter {
    pub fn new(client: Arc<dyn BiometricClient>, subject_id: impl Into<String>) -> Self {
        Self {
            client,
            subject_id: subject_id.into(),
        }
    }
}

#[async_trait]
impl Submitter for EnrollSubmitter {
    async fn submit(&self, descriptor: &Descriptor) -> Result<Outcome, FailureReason> {
        let result = self
            .client
            .enroll(&self.subject_id, descriptor)
            .await
            .map_err(failure_from_client)?;
        tracing::info!(
            subject_id = %self.subject_id,
            message = result.message.as_deref().unwrap_or(""),
            "face enrolled"
        );
        Ok(Outcome::Enrolled {
            subject_id: self.subject_id.clone(),
            descriptor: descriptor.clone(),
        })
    }
}

/// Identifies the descriptor among all enrolled subjects.
pub struct VerifySubmitter {
    client: Arc<dyn BiometricClient>,
}

impl VerifySubmitter {
    pub fn new(client: Arc<dyn BiometricClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Submitter for VerifySubmitter {
    async fn submit(&self, descriptor: &Descriptor) -> Result<Outcome, FailureReason> {
        let result = self
            .client
            .verify(descriptor)
            .await
            .map_err(failure_from_client)?;

        if !result.matched {
            tracing::info!("face not recognized");
            return Err(FailureReason::SubmissionRejected(NOT_RECOGNIZED.to_string()));
        }

        // A match without an identity cannot be reported as recognized.
        let subject_id = result.subject_id.ok_or_else(|| {
            FailureReason::SubmissionError("match response is missing the employee".to_string())
        })?;
        let display_name = result.display_name.unwrap_or_else(|| subject_id.clone());

        tracing::info!(%subject_id, %display_name, "face recognized");
        Ok(Outcome::Recognized {
            subject_id,
            display_name,
        })
    }
}

/// Pick the strategy for `mode`.
pub fn submitter_for(mode: &Mode, client: Arc<dyn BiometricClient>) -> Box<dyn Submitter> {
    match mode {
        Mode::Enroll { subject_id } => Box::new(EnrollSubmitter::new(client, subject_id.clone())),
        Mode::Verify => Box::new(VerifySubmitter::new(client)),
    }
}

/// Business-level negatives become `SubmissionRejected`; everything else
/// that kept the request from completing becomes `SubmissionError`.
pub fn failure_from_client(err: ClientError) -> FailureReason {
    match err {
        ClientError::Rejected(message) => FailureReason::SubmissionRejected(message),
        other => FailureReason::SubmissionError(other.to_string()),
    }
}
