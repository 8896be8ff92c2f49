//! Backend capability for storing and matching descriptors.

use crate::types::Descriptor;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ClientError {
    /// The backend processed the request and said no.
    #[error("{0}")]
    Rejected(String),
    /// Non-success status that is not a business-level rejection.
    #[error("server returned {status}: {message}")]
    Server { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Successful enrollment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrollResult {
    pub message: Option<String>,
}

/// Verification answer. `matched == false` is a normal negative, not an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VerifyResult {
    pub matched: bool,
    pub subject_id: Option<String>,
    pub display_name: Option<String>,
    pub message: Option<String>,
}

/// Enrollment and verification endpoints. Implementations never retry.
#[async_trait]
pub trait BiometricClient: Send + Sync {
    async fn enroll(
        &self,
        subject_id: &str,
        descriptor: &Descriptor,
    ) -> Result<EnrollResult, ClientError>;

    async fn verify(&self, descriptor: &Descriptor) -> Result<VerifyResult, ClientError>;
}
