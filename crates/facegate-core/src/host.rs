//! Embedding surface for the capture workflow.
//!
//! The host opens a session for a mode, forwards the user's capture and retry
//! triggers, and reports outcomes through a callback. Successful outcomes are
//! held for a short confirmation delay so the user sees the result before the
//! surrounding UI moves on; that timing lives here, outside the state machine.

use crate::client::BiometricClient;
use crate::config::WorkflowConfig;
use crate::controller::{CaptureController, ControlError};
use crate::media::MediaSource;
use crate::model::FaceModel;
use crate::types::{Mode, Outcome, SessionState};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

type OutcomeCallback = Arc<dyn Fn(Outcome) + Send + Sync>;

/// An outcome waiting out the confirmation delay. Delivered at most once.
struct PendingOutcome {
    slot: Arc<Mutex<Option<Outcome>>>,
    timer: JoinHandle<()>,
}

/// Hosts at most one capture session at a time.
pub struct WorkflowHost {
    config: WorkflowConfig,
    model: Arc<dyn FaceModel>,
    media: Arc<dyn MediaSource>,
    client: Arc<dyn BiometricClient>,
    on_outcome: OutcomeCallback,
    session: Mutex<Option<Arc<CaptureController>>>,
    pending: Mutex<Option<PendingOutcome>>,
}

impl WorkflowHost {
    pub fn new(
        config: WorkflowConfig,
        model: Arc<dyn FaceModel>,
        media: Arc<dyn MediaSource>,
        client: Arc<dyn BiometricClient>,
        on_outcome: impl Fn(Outcome) + Send + Sync + 'static,
    ) -> Self {
        Self {
            config,
            model,
            media,
            client,
            on_outcome: Arc::new(on_outcome),
            session: Mutex::new(None),
            pending: Mutex::new(None),
        }
    }

    /// Open a new session for `mode` and bring it to `Ready`.
    ///
    /// The new session replaces any open one in a single swap, and the
    /// replaced session is closed before this one starts. On a terminal
    /// failure the session stays attached (so its error can be shown) until
    /// [`close`](Self::close).
    pub async fn open(&self, mode: Mode) -> Result<Uuid, ControlError> {
        let controller = Arc::new(CaptureController::new(
            mode,
            self.config.clone(),
            self.model.clone(),
            self.media.clone(),
            self.client.clone(),
        ));
        let id = controller.session_id();
        let replaced = lock(&self.session).replace(controller.clone());
        if let Some(replaced) = replaced {
            replaced.close().await;
        }
        self.flush();

        controller.start().await?;
        Ok(id)
    }

    /// Forward the capture trigger to the open session.
    pub async fn capture(&self) -> Result<Outcome, ControlError> {
        let controller = self.current().ok_or(ControlError::Closed)?;
        let outcome = controller.capture().await?;
        if outcome.is_success() {
            self.hold(outcome.clone());
        } else {
            (self.on_outcome)(outcome.clone());
        }
        Ok(outcome)
    }

    pub fn retry(&self) -> Result<(), ControlError> {
        self.current().ok_or(ControlError::Closed)?.retry()
    }

    /// Close the open session. Returns once the camera has been released.
    /// An outcome still in its confirmation delay is delivered immediately.
    pub async fn close(&self) {
        let controller = lock(&self.session).take();
        if let Some(controller) = controller {
            controller.close().await;
        }
        self.flush();
    }

    pub fn is_open(&self) -> bool {
        lock(&self.session).is_some()
    }

    /// State of the open session, or `Closed` when none is open.
    pub fn state(&self) -> SessionState {
        self.current()
            .map(|c| c.state())
            .unwrap_or(SessionState::Closed)
    }

    pub fn error_message(&self) -> Option<String> {
        self.current().and_then(|c| c.error_message())
    }

    pub fn subscribe(&self) -> Option<watch::Receiver<SessionState>> {
        self.current().map(|c| c.subscribe())
    }

    fn current(&self) -> Option<Arc<CaptureController>> {
        lock(&self.session).clone()
    }

    /// Deliver `outcome` after the confirmation delay.
    fn hold(&self, outcome: Outcome) {
        self.flush();

        let slot = Arc::new(Mutex::new(Some(outcome)));
        let delay = self.config.confirmation_delay;
        let timer = tokio::spawn({
            let slot = slot.clone();
            let on_outcome = self.on_outcome.clone();
            async move {
                tokio::time::sleep(delay).await;
                let outcome = lock(&slot).take();
                if let Some(outcome) = outcome {
                    on_outcome(outcome);
                }
            }
        });
        *lock(&self.pending) = Some(PendingOutcome { slot, timer });
    }

    /// Deliver a held outcome now, if the timer has not already.
    fn flush(&self) {
        let Some(pending) = lock(&self.pending).take() else {
            return;
        };
        pending.timer.abort();
        let outcome = lock(&pending.slot).take();
        if let Some(outcome) = outcome {
            (self.on_outcome)(outcome);
        }
    }
}

impl Drop for WorkflowHost {
    fn drop(&mut self) {
        if let Some(pending) = lock(&self.pending).take() {
            pending.timer.abort();
        }
    }
}

/// Lock a std mutex, recovering the data if a callback panicked while holding it.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
