//! facegate-core — Face capture workflow.
//!
//! Loads a face model, holds one camera stream per session, enforces a
//! single-face rule on every capture, and dispatches the descriptor to an
//! enrollment or verification backend.

pub mod client;
pub mod config;
pub mod controller;
pub mod host;
pub mod media;
pub mod model;
pub mod submit;
pub mod types;

#[cfg(test)]
mod testing;

pub use client::{BiometricClient, ClientError, EnrollResult, VerifyResult};
pub use config::WorkflowConfig;
pub use controller::{CaptureController, ControlError};
pub use host::WorkflowHost;
pub use media::{
    CapturedFrame, FacingMode, MediaError, MediaSource, MediaStream, StreamConstraints,
    StreamGuard,
};
pub use model::{FaceModel, ModelError};
pub use types::{Descriptor, Detection, FailureReason, Mode, Outcome, SessionState};
