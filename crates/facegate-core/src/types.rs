use serde::{Deserialize, Serialize};
use std::fmt;

/// Face descriptor produced by the face model (typically 128 or 512 values).
///
/// Opaque to the workflow: it is carried from detection to submission
/// without being reinterpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Descriptor {
    values: Vec<f32>,
}

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<Vec<f32>> for Descriptor {
    fn from(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}

/// Result of running the face model on one captured frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    None,
    Single(Descriptor),
    /// More than one face; carries the number of faces found.
    Multiple(usize),
}

/// What the session does with an accepted descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Register the face against an existing subject (employee).
    Enroll { subject_id: String },
    /// Identify the face against every enrolled subject.
    Verify,
}

impl Mode {
    pub fn enroll(subject_id: impl Into<String>) -> Self {
        Mode::Enroll {
            subject_id: subject_id.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Mode::Enroll { .. } => "enroll",
            Mode::Verify => "verify",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a capture attempt (or the whole session) failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    ModelLoadError(String),
    CameraUnavailable(String),
    NoFaceDetected,
    MultipleFacesDetected(usize),
    /// The camera failed to deliver a still frame.
    CaptureError(String),
    /// The backend answered with a business-level negative.
    SubmissionRejected(String),
    /// The request did not complete (transport, server, or decode failure).
    SubmissionError(String),
}

impl FailureReason {
    /// Terminal failures end the session; the host must reopen it.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FailureReason::ModelLoadError(_) | FailureReason::CameraUnavailable(_)
        )
    }

    pub fn is_retryable(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::ModelLoadError(msg) => {
                write!(f, "failed to load face recognition models: {msg}")
            }
            FailureReason::CameraUnavailable(msg) => write!(f, "camera unavailable: {msg}"),
            FailureReason::NoFaceDetected => {
                f.write_str("no face detected, position your face in the frame and try again")
            }
            FailureReason::MultipleFacesDetected(count) => write!(
                f,
                "{count} faces detected, make sure only one person is in the frame"
            ),
            FailureReason::CaptureError(msg) => write!(f, "failed to capture image: {msg}"),
            FailureReason::SubmissionRejected(msg) => f.write_str(msg),
            FailureReason::SubmissionError(msg) => write!(f, "request failed: {msg}"),
        }
    }
}

/// Terminal result of one capture cycle, reported to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Enrolled {
        subject_id: String,
        descriptor: Descriptor,
    },
    Recognized {
        subject_id: String,
        display_name: String,
    },
    Rejected {
        reason: FailureReason,
    },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Outcome::Rejected { .. })
    }
}

/// Session state as observed by the host.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Initializing,
    ModelLoading,
    CameraStarting,
    Ready,
    Capturing,
    Detecting,
    Submitting,
    Succeeded(Outcome),
    Failed(FailureReason),
    /// The host closed the session; the stream has been released.
    Closed,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Initializing => "initializing",
            SessionState::ModelLoading => "model_loading",
            SessionState::CameraStarting => "camera_starting",
            SessionState::Ready => "ready",
            SessionState::Capturing => "capturing",
            SessionState::Detecting => "detecting",
            SessionState::Submitting => "submitting",
            SessionState::Succeeded(_) => "succeeded",
            SessionState::Failed(_) => "failed",
            SessionState::Closed => "closed",
        }
    }

    /// A capture/detect/submit cycle is in flight.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            SessionState::Capturing | SessionState::Detecting | SessionState::Submitting
        )
    }

    pub fn error_message(&self) -> Option<String> {
        match self {
            SessionState::Failed(reason) => Some(reason.to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_failures() {
        assert!(FailureReason::ModelLoadError("x".into()).is_terminal());
        assert!(FailureReason::CameraUnavailable("x".into()).is_terminal());
        assert!(FailureReason::NoFaceDetected.is_retryable());
        assert!(FailureReason::MultipleFacesDetected(2).is_retryable());
        assert!(FailureReason::CaptureError("x".into()).is_retryable());
        assert!(FailureReason::SubmissionRejected("x".into()).is_retryable());
        assert!(FailureReason::SubmissionError("x".into()).is_retryable());
    }

    #[test]
    fn test_busy_states() {
        assert!(SessionState::Capturing.is_busy());
        assert!(SessionState::Detecting.is_busy());
        assert!(SessionState::Submitting.is_busy());
        assert!(!SessionState::Ready.is_busy());
        assert!(!SessionState::Failed(FailureReason::NoFaceDetected).is_busy());
    }

    #[test]
    fn test_error_message_only_when_failed() {
        assert_eq!(SessionState::Ready.error_message(), None);
        let msg = SessionState::Failed(FailureReason::MultipleFacesDetected(3))
            .error_message()
            .unwrap();
        assert!(msg.contains("3 faces"), "got {msg}");
    }

    #[test]
    fn test_descriptor_serializes_as_flat_array() {
        let d = Descriptor::new(vec![0.5, -1.0]);
        assert_eq!(serde_json::to_string(&d).unwrap(), "[0.5,-1.0]");
    }
}
