//! Capture session state machine.
//!
//! Drives one session from model loading through camera start, then runs
//! user-triggered capture cycles (grab one frame, require exactly one face,
//! submit the descriptor) until the host closes it. Closing cancels any
//! in-flight cycle and releases the camera; a cancelled cycle never touches
//! session state again. A `start` or `capture` future dropped by its caller
//! settles the session into `Failed` instead of leaving it mid-step.

use crate::client::BiometricClient;
use crate::config::WorkflowConfig;
use crate::media::{CapturedFrame, MediaError, MediaSource, StreamGuard};
use crate::model::FaceModel;
use crate::submit::{submitter_for, Submitter};
use crate::types::{Detection, FailureReason, Mode, Outcome, SessionState};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Operation not valid for the session's current state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControlError {
    #[error("session already started")]
    AlreadyStarted,
    #[error("a capture is already in progress")]
    Busy,
    #[error("session not ready for capture (state: {0})")]
    NotReady(&'static str),
    #[error("failure is terminal; close and reopen the session")]
    NotRetryable,
    #[error("session closed")]
    Closed,
    #[error("{0}")]
    Terminal(FailureReason),
}

/// Owns one session: its state, its camera stream, and its submission strategy.
pub struct CaptureController {
    id: Uuid,
    mode: Mode,
    config: WorkflowConfig,
    model: Arc<dyn FaceModel>,
    media: Arc<dyn MediaSource>,
    submitter: Box<dyn Submitter>,
    state: watch::Sender<SessionState>,
    stream: Arc<Mutex<Option<StreamGuard>>>,
    cancel: CancellationToken,
}

impl CaptureController {
    pub fn new(
        mode: Mode,
        config: WorkflowConfig,
        model: Arc<dyn FaceModel>,
        media: Arc<dyn MediaSource>,
        client: Arc<dyn BiometricClient>,
    ) -> Self {
        let submitter = submitter_for(&mode, client);
        let (state, _) = watch::channel(SessionState::Initializing);
        let id = Uuid::new_v4();
        tracing::info!(session = %id, %mode, "capture session created");
        Self {
            id,
            mode,
            config,
            model,
            media,
            submitter,
            state,
            stream: Arc::new(Mutex::new(None)),
            cancel: CancellationToken::new(),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.id
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Watch state changes (for rendering).
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// The single user-visible error, if the session is in `Failed`.
    pub fn error_message(&self) -> Option<String> {
        self.state.borrow().error_message()
    }

    /// The recorded outcome once the session has succeeded.
    pub fn outcome(&self) -> Option<Outcome> {
        match &*self.state.borrow() {
            SessionState::Succeeded(outcome) => Some(outcome.clone()),
            _ => None,
        }
    }

    /// Whether the capture trigger should be enabled.
    pub fn can_capture(&self) -> bool {
        matches!(*self.state.borrow(), SessionState::Ready)
    }

    /// Load the model, then start the camera. Ends in `Ready` or a terminal `Failed`.
    pub async fn start(&self) -> Result<(), ControlError> {
        let mut current = "";
        let claimed = self.state.send_if_modified(|state| {
            current = state.name();
            if *state == SessionState::Initializing && !self.cancel.is_cancelled() {
                *state = SessionState::ModelLoading;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(match current {
                "closed" => ControlError::Closed,
                _ => ControlError::AlreadyStarted,
            });
        }
        let _step = StepGuard {
            controller: self,
            abandoned: abandoned_start,
        };
        tracing::info!(session = %self.id, "loading face model");

        let loaded = self
            .cancellable(bounded(self.config.model_load_timeout, self.model.load()))
            .await?;
        match loaded {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return self.fail_terminal(FailureReason::ModelLoadError(e.to_string())),
            Err(elapsed) => {
                return self.fail_terminal(FailureReason::ModelLoadError(format!(
                    "timed out after {elapsed:?}"
                )))
            }
        }

        self.set_state(SessionState::CameraStarting)?;
        let constraints = &self.config.constraints;
        let started = self
            .cancellable(bounded(
                self.config.camera_start_timeout,
                StreamGuard::acquire(self.media.as_ref(), constraints),
            ))
            .await?;
        let guard = match started {
            Ok(Ok(guard)) => guard,
            Ok(Err(e)) => {
                return self.fail_terminal(FailureReason::CameraUnavailable(e.to_string()))
            }
            Err(elapsed) => {
                return self.fail_terminal(FailureReason::CameraUnavailable(format!(
                    "timed out after {elapsed:?}"
                )))
            }
        };

        {
            let mut slot = self.stream.lock().await;
            if self.cancel.is_cancelled() {
                // `close` already ran and found no stream; `guard` stops on drop.
                return Err(ControlError::Closed);
            }
            *slot = Some(guard);
        }

        tracing::info!(
            session = %self.id,
            width = constraints.width,
            height = constraints.height,
            "camera ready"
        );
        self.set_state(SessionState::Ready)
    }

    /// Run one capture cycle. Only valid in `Ready`.
    ///
    /// Returns the success outcome, or `Outcome::Rejected` when the attempt
    /// failed in a retryable way (the session is then in `Failed` and awaits
    /// [`retry`](Self::retry)).
    pub async fn capture(&self) -> Result<Outcome, ControlError> {
        let mut refused = None;
        let claimed = self.state.send_if_modified(|state| {
            if *state == SessionState::Ready && !self.cancel.is_cancelled() {
                *state = SessionState::Capturing;
                return true;
            }
            refused = Some(if state.is_busy() {
                ControlError::Busy
            } else if *state == SessionState::Closed || self.cancel.is_cancelled() {
                ControlError::Closed
            } else {
                ControlError::NotReady(state.name())
            });
            false
        });
        if !claimed {
            let err = refused.unwrap_or(ControlError::Busy);
            tracing::debug!(session = %self.id, error = %err, "capture trigger ignored");
            return Err(err);
        }
        let _step = StepGuard {
            controller: self,
            abandoned: abandoned_capture,
        };
        tracing::debug!(session = %self.id, "capturing frame");

        let frame = match self.cancellable(self.spawn_grab()).await? {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(e))) => return self.reject(FailureReason::CaptureError(e.to_string())),
            Ok(None) => return Err(ControlError::Closed),
            Err(e) => {
                return self.reject(FailureReason::CaptureError(format!(
                    "frame grab task failed: {e}"
                )))
            }
        };

        self.set_state(SessionState::Detecting)?;
        let detection = self
            .cancellable(self.model.detect_single_face(&frame))
            .await?;
        drop(frame);

        let descriptor = match detection {
            Ok(Detection::Single(descriptor)) => descriptor,
            Ok(Detection::None) => return self.reject(FailureReason::NoFaceDetected),
            Ok(Detection::Multiple(count)) => {
                return self.reject(FailureReason::MultipleFacesDetected(count))
            }
            Err(e) => {
                return self.reject(FailureReason::CaptureError(format!(
                    "face detection failed: {e}"
                )))
            }
        };
        tracing::debug!(session = %self.id, dim = descriptor.len(), "single face detected");

        self.set_state(SessionState::Submitting)?;
        let submitted = self.cancellable(self.submitter.submit(&descriptor)).await?;
        match submitted {
            Ok(outcome) => {
                self.set_state(SessionState::Succeeded(outcome.clone()))?;
                tracing::info!(session = %self.id, mode = %self.mode, "capture session succeeded");
                Ok(outcome)
            }
            Err(reason) => self.reject(reason),
        }
    }

    /// Return from a retryable failure to `Ready`. The camera stays open.
    pub fn retry(&self) -> Result<(), ControlError> {
        let mut refused = None;
        let applied = self.state.send_if_modified(|state| match state {
            SessionState::Failed(reason) if reason.is_retryable() => {
                *state = SessionState::Ready;
                true
            }
            SessionState::Failed(_) => {
                refused = Some(ControlError::NotRetryable);
                false
            }
            SessionState::Closed => {
                refused = Some(ControlError::Closed);
                false
            }
            other => {
                refused = Some(ControlError::NotReady(other.name()));
                false
            }
        });
        if !applied {
            return Err(refused.unwrap_or(ControlError::NotRetryable));
        }
        tracing::debug!(session = %self.id, "retry requested");
        Ok(())
    }

    /// Tear the session down. Cancels any in-flight step and releases the
    /// camera before returning. Idempotent.
    pub async fn close(&self) {
        self.cancel.cancel();
        let released = self.stream.lock().await.take();
        if let Some(mut guard) = released {
            guard.stop();
        }
        let changed = self.state.send_if_modified(|state| {
            if *state == SessionState::Closed {
                false
            } else {
                *state = SessionState::Closed;
                true
            }
        });
        if changed {
            tracing::info!(session = %self.id, "capture session closed");
        }
    }

    /// Grab one frame on a spawned task. The task, not the caller's future,
    /// holds the stream lock, so `close` is never blocked by a capture
    /// future that stopped being polled. `None` means the session closed.
    fn spawn_grab(&self) -> JoinHandle<Option<Result<CapturedFrame, MediaError>>> {
        let stream = self.stream.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let mut slot = stream.lock().await;
            let guard = slot.as_mut()?;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                grabbed = guard.grab_frame() => Some(grabbed),
            }
        })
    }

    /// Race `fut` against session teardown.
    async fn cancellable<F: Future>(&self, fut: F) -> Result<F::Output, ControlError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ControlError::Closed),
            out = fut => Ok(out),
        }
    }

    /// Apply a transition unless the session has been torn down.
    fn set_state(&self, next: SessionState) -> Result<(), ControlError> {
        let mut from = "";
        let to = next.name();
        let applied = self.state.send_if_modified(|state| {
            if *state == SessionState::Closed || self.cancel.is_cancelled() {
                return false;
            }
            from = state.name();
            *state = next;
            true
        });
        if !applied {
            return Err(ControlError::Closed);
        }
        tracing::debug!(session = %self.id, from, to, "state transition");
        Ok(())
    }

    fn fail_terminal(&self, reason: FailureReason) -> Result<(), ControlError> {
        tracing::warn!(session = %self.id, error = %reason, "capture session failed");
        self.set_state(SessionState::Failed(reason.clone()))?;
        Err(ControlError::Terminal(reason))
    }

    fn reject(&self, reason: FailureReason) -> Result<Outcome, ControlError> {
        tracing::warn!(session = %self.id, error = %reason, "capture attempt rejected");
        self.set_state(SessionState::Failed(reason.clone()))?;
        Ok(Outcome::Rejected { reason })
    }
}

/// Settles the session if a `start` or `capture` future is dropped mid-step.
///
/// Normal returns leave the state outside the step's phases, so the guard
/// only acts when the caller abandoned the future (timeout, `select!`).
struct StepGuard<'a> {
    controller: &'a CaptureController,
    abandoned: fn(&SessionState) -> Option<FailureReason>,
}

impl Drop for StepGuard<'_> {
    fn drop(&mut self) {
        let ctl = self.controller;
        if ctl.cancel.is_cancelled() {
            return;
        }
        let abandoned = self.abandoned;
        let mut settled = None;
        ctl.state.send_if_modified(|state| match abandoned(state) {
            Some(reason) => {
                settled = Some(reason.clone());
                *state = SessionState::Failed(reason);
                true
            }
            None => false,
        });
        if let Some(reason) = settled {
            tracing::warn!(session = %ctl.id, error = %reason, "step abandoned by caller");
        }
    }
}

fn abandoned_start(state: &SessionState) -> Option<FailureReason> {
    match state {
        SessionState::ModelLoading => Some(FailureReason::ModelLoadError(
            "model load cancelled".into(),
        )),
        SessionState::CameraStarting => Some(FailureReason::CameraUnavailable(
            "camera start cancelled".into(),
        )),
        _ => None,
    }
}

fn abandoned_capture(state: &SessionState) -> Option<FailureReason> {
    state
        .is_busy()
        .then(|| FailureReason::CaptureError("capture cancelled".into()))
}

/// Apply an optional deadline; `Err` carries the limit that elapsed.
async fn bounded<F: Future>(limit: Option<Duration>, fut: F) -> Result<F::Output, Duration> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| limit),
        None => Ok(fut.await),
    }
}
