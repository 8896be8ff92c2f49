//! In-memory fakes for the workflow's external capabilities.
//!
//! Every fake yields once per call so that watchers of the session state get
//! scheduled between transitions.

use crate::client::{BiometricClient, ClientError, EnrollResult, VerifyResult};
use crate::media::{CapturedFrame, MediaError, MediaSource, MediaStream, StreamConstraints};
use crate::model::{FaceModel, ModelError};
use crate::types::{Descriptor, Detection};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

/// Blocks callers until [`Gate::release`] when closed.
struct Gate {
    closed: AtomicBool,
    permits: Semaphore,
}

impl Default for Gate {
    fn default() -> Self {
        Self {
            closed: AtomicBool::new(false),
            permits: Semaphore::new(0),
        }
    }
}

impl Gate {
    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn release(&self) {
        self.permits.add_permits(1);
    }

    async fn pass(&self) {
        if self.closed.load(Ordering::SeqCst) {
            if let Ok(permit) = self.permits.acquire().await {
                permit.forget();
            }
        }
    }
}

#[derive(Default)]
struct MediaCounters {
    starts: AtomicUsize,
    stops: AtomicUsize,
    grabs: AtomicUsize,
    fail_next_grab: AtomicBool,
    grab_gate: Gate,
}

/// Camera that hands out synthetic frames and counts start/stop calls.
#[derive(Default)]
pub struct FakeMediaSource {
    counters: Arc<MediaCounters>,
    denied: AtomicBool,
    hang: AtomicBool,
    gate: Gate,
}

impl FakeMediaSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse `start` as if the user denied camera permission.
    pub fn deny(&self) {
        self.denied.store(true, Ordering::SeqCst);
    }

    /// Never complete `start`.
    pub fn hang(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }

    /// Hold `start` until [`release`](Self::release).
    pub fn gate(&self) {
        self.gate.close();
    }

    pub fn release(&self) {
        self.gate.release();
    }

    /// Hold every frame grab until [`release_grab`](Self::release_grab).
    pub fn gate_grabs(&self) {
        self.counters.grab_gate.close();
    }

    pub fn release_grab(&self) {
        self.counters.grab_gate.release();
    }

    pub fn fail_next_grab(&self) {
        self.counters.fail_next_grab.store(true, Ordering::SeqCst);
    }

    /// Successful starts.
    pub fn starts(&self) -> usize {
        self.counters.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.counters.stops.load(Ordering::SeqCst)
    }

    pub fn grabs(&self) -> usize {
        self.counters.grabs.load(Ordering::SeqCst)
    }

    /// Streams started and not yet stopped.
    pub fn active(&self) -> usize {
        self.starts() - self.stops()
    }
}

#[async_trait]
impl MediaSource for FakeMediaSource {
    async fn start(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn MediaStream>, MediaError> {
        tokio::task::yield_now().await;
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.gate.pass().await;
        if self.denied.load(Ordering::SeqCst) {
            return Err(MediaError::PermissionDenied("user denied camera access".into()));
        }
        self.counters.starts.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeStream {
            counters: self.counters.clone(),
            width: constraints.width,
            height: constraints.height,
            stopped: false,
        }))
    }
}

struct FakeStream {
    counters: Arc<MediaCounters>,
    width: u32,
    height: u32,
    stopped: bool,
}

#[async_trait]
impl MediaStream for FakeStream {
    async fn grab_frame(&mut self) -> Result<CapturedFrame, MediaError> {
        tokio::task::yield_now().await;
        self.counters.grab_gate.pass().await;
        if self.stopped {
            return Err(MediaError::Stopped);
        }
        let sequence = self.counters.grabs.fetch_add(1, Ordering::SeqCst) as u32;
        if self.counters.fail_next_grab.swap(false, Ordering::SeqCst) {
            return Err(MediaError::CaptureFailed("buffer dequeue timed out".into()));
        }
        Ok(CapturedFrame {
            data: vec![128; (self.width * self.height) as usize],
            width: self.width,
            height: self.height,
            sequence,
        })
    }

    fn stop(&mut self) {
        assert!(!self.stopped, "stream stopped twice");
        self.stopped = true;
        self.counters.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Face model that replays scripted detections, then falls back to a single face.
#[derive(Default)]
pub struct FakeModel {
    script: Mutex<VecDeque<Detection>>,
    load_calls: AtomicUsize,
    detect_calls: AtomicUsize,
    fail_load: AtomicBool,
    hang_load: AtomicBool,
    gate: Gate,
}

impl FakeModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// The descriptor returned for an unscripted detection.
    pub fn descriptor() -> Descriptor {
        Descriptor::new(vec![0.25; 128])
    }

    pub fn push(&self, detection: Detection) {
        self.script.lock().unwrap().push_back(detection);
    }

    pub fn fail_load(&self) {
        self.fail_load.store(true, Ordering::SeqCst);
    }

    pub fn hang_load(&self) {
        self.hang_load.store(true, Ordering::SeqCst);
    }

    /// Hold detection until [`release`](Self::release).
    pub fn gate(&self) {
        self.gate.close();
    }

    pub fn release(&self) {
        self.gate.release();
    }

    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    pub fn detect_calls(&self) -> usize {
        self.detect_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FaceModel for FakeModel {
    async fn load(&self) -> Result<(), ModelError> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.hang_load.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(ModelError::NotFound("/models/face_recognition".into()));
        }
        Ok(())
    }

    async fn detect_single_face(&self, _frame: &CapturedFrame) -> Result<Detection, ModelError> {
        self.detect_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.gate.pass().await;
        let scripted = self.script.lock().unwrap().pop_front();
        Ok(scripted.unwrap_or_else(|| Detection::Single(Self::descriptor())))
    }
}

/// Backend that records calls and answers with configurable replies.
pub struct FakeClient {
    enroll_calls: Mutex<Vec<String>>,
    verify_calls: AtomicUsize,
    enroll_reply: Mutex<Result<EnrollResult, ClientError>>,
    verify_reply: Mutex<Result<VerifyResult, ClientError>>,
}

impl FakeClient {
    pub fn new() -> Self {
        Self {
            enroll_calls: Mutex::new(Vec::new()),
            verify_calls: AtomicUsize::new(0),
            enroll_reply: Mutex::new(Ok(EnrollResult {
                message: Some("Face registered successfully".into()),
            })),
            verify_reply: Mutex::new(Ok(VerifyResult {
                matched: true,
                subject_id: Some("emp-1".into()),
                display_name: Some("Ada Lovelace".into()),
                message: None,
            })),
        }
    }

    pub fn set_enroll_reply(&self, reply: Result<EnrollResult, ClientError>) {
        *self.enroll_reply.lock().unwrap() = reply;
    }

    pub fn set_verify_reply(&self, reply: Result<VerifyResult, ClientError>) {
        *self.verify_reply.lock().unwrap() = reply;
    }

    /// Subject ids passed to `enroll`, in call order.
    pub fn enroll_calls(&self) -> Vec<String> {
        self.enroll_calls.lock().unwrap().clone()
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BiometricClient for FakeClient {
    async fn enroll(
        &self,
        subject_id: &str,
        _descriptor: &Descriptor,
    ) -> Result<EnrollResult, ClientError> {
        self.enroll_calls.lock().unwrap().push(subject_id.to_string());
        tokio::task::yield_now().await;
        self.enroll_reply.lock().unwrap().clone()
    }

    async fn verify(&self, _descriptor: &Descriptor) -> Result<VerifyResult, ClientError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.verify_reply.lock().unwrap().clone()
    }
}
