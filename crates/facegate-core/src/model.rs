//! Face model capability consumed by the capture workflow.
//!
//! The detection and descriptor-extraction algorithm lives outside this
//! crate. A session loads the model once and then asks it, per captured
//! frame, whether exactly one face is present.

use crate::media::CapturedFrame;
use crate::types::Detection;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model not found: {0}")]
    NotFound(String),
    #[error("model load failed: {0}")]
    LoadFailed(String),
    #[error("model not loaded")]
    NotLoaded,
    #[error("inference failed: {0}")]
    InferenceFailed(String),
}

/// Face detection + descriptor extraction.
#[async_trait]
pub trait FaceModel: Send + Sync {
    /// Load weights. Must be idempotent: a second call on a loaded model is a no-op.
    async fn load(&self) -> Result<(), ModelError>;

    /// Detect faces in `frame` and return a descriptor only when exactly one is present.
    async fn detect_single_face(&self, frame: &CapturedFrame) -> Result<Detection, ModelError>;
}
