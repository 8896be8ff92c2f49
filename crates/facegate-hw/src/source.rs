//! `MediaSource` backed by a V4L2 device.
//!
//! Each started stream owns a dedicated OS thread that opens the device,
//! keeps the mmap stream live, and serves frame requests over a channel.
//! Stopping the stream closes the channel and joins the thread, so the
//! device is closed by the time `stop` returns. Dequeues are bounded, which
//! bounds how long `stop` can wait; past that the thread is left to finish
//! on its own.

use crate::camera::{select_device, Camera, CameraError, DEQUEUE_TIMEOUT, MAX_DARK_SKIPS};
use async_trait::async_trait;
use facegate_core::{CapturedFrame, MediaError, MediaSource, MediaStream, StreamConstraints};
use std::sync::mpsc::{self as std_mpsc, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Frames discarded after the stream starts (AGC/AE stabilisation).
const WARMUP_FRAMES: usize = 3;
/// Longest `stop` waits: one grab in flight, dark-frame skips included.
const STOP_TIMEOUT: Duration =
    Duration::from_secs(DEQUEUE_TIMEOUT.as_secs() * (MAX_DARK_SKIPS as u64 + 2));

enum StreamRequest {
    Grab {
        reply: oneshot::Sender<Result<CapturedFrame, CameraError>>,
    },
}

/// Opens V4L2 cameras on demand.
#[derive(Debug, Clone, Default)]
pub struct V4lMediaSource;

impl V4lMediaSource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaSource for V4lMediaSource {
    async fn start(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn MediaStream>, MediaError> {
        let device_path = match &constraints.device {
            Some(path) => path.clone(),
            None => {
                let devices = tokio::task::spawn_blocking(Camera::list_devices)
                    .await
                    .map_err(|e| MediaError::CaptureFailed(format!("device scan failed: {e}")))?;
                let chosen =
                    select_device(&devices, constraints.facing).ok_or(CameraError::NoDevices)?;
                tracing::info!(device = %chosen.path, name = %chosen.name, "selected camera");
                chosen.path.clone()
            }
        };

        let (width, height) = (constraints.width, constraints.height);
        let (ready_tx, ready_rx) = oneshot::channel();
        let (tx, rx) = mpsc::channel::<StreamRequest>(1);
        let (exit_tx, exit_rx) = std_mpsc::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("facegate-camera".into())
            .spawn({
                let device_path = device_path.clone();
                move || run_stream(&device_path, width, height, rx, ready_tx, exit_tx)
            })
            .map_err(|e| MediaError::CaptureFailed(format!("failed to spawn camera thread: {e}")))?;

        let failure = match ready_rx.await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.into()),
            Err(_) => Some(MediaError::CaptureFailed("camera thread exited".into())),
        };
        if let Some(err) = failure {
            // The thread is already on its way out after reporting.
            if !join_within(thread, &exit_rx, STOP_TIMEOUT) {
                tracing::warn!(device = %device_path, "camera thread did not exit after failed start");
            }
            return Err(err);
        }

        Ok(Box::new(V4lStream {
            device_path,
            tx: Some(tx),
            thread: Some((thread, exit_rx)),
        }))
    }
}

/// Live stream handle; the camera thread runs until this is stopped or dropped.
pub struct V4lStream {
    device_path: String,
    tx: Option<mpsc::Sender<StreamRequest>>,
    thread: Option<(JoinHandle<()>, std_mpsc::Receiver<()>)>,
}

#[async_trait]
impl MediaStream for V4lStream {
    async fn grab_frame(&mut self) -> Result<CapturedFrame, MediaError> {
        let tx = self.tx.as_ref().ok_or(MediaError::Stopped)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(StreamRequest::Grab { reply: reply_tx })
            .await
            .map_err(|_| MediaError::CaptureFailed("camera thread exited".into()))?;
        let frame = reply_rx
            .await
            .map_err(|_| MediaError::CaptureFailed("camera thread exited".into()))??;
        Ok(frame)
    }

    fn stop(&mut self) {
        // Closing the channel ends the thread's request loop.
        self.tx.take();
        if let Some((thread, exited)) = self.thread.take() {
            if !join_within(thread, &exited, STOP_TIMEOUT) {
                tracing::warn!(
                    device = %self.device_path,
                    waited = ?STOP_TIMEOUT,
                    "camera thread still busy; releasing in background"
                );
            }
        }
    }
}

/// Join `thread` once it signals exit (by dropping its end of `exited`),
/// waiting at most `limit`. Returns false if it is still running, in which
/// case it is left detached.
fn join_within(thread: JoinHandle<()>, exited: &std_mpsc::Receiver<()>, limit: Duration) -> bool {
    match exited.recv_timeout(limit) {
        Err(RecvTimeoutError::Timeout) => false,
        Ok(()) | Err(RecvTimeoutError::Disconnected) => {
            if thread.join().is_err() {
                tracing::warn!("camera thread panicked");
            }
            true
        }
    }
}

/// Camera thread body: open, warm up, report readiness, then serve grabs.
fn run_stream(
    device_path: &str,
    width: u32,
    height: u32,
    mut rx: mpsc::Receiver<StreamRequest>,
    ready: oneshot::Sender<Result<(), CameraError>>,
    exited: std_mpsc::Sender<()>,
) {
    let camera = match Camera::open(device_path, width, height) {
        Ok(camera) => camera,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    let mut stream = match camera.stream() {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    tracing::debug!(count = WARMUP_FRAMES, "discarding warmup frames");
    for _ in 0..WARMUP_FRAMES {
        let _ = camera.next_frame(&mut stream);
    }

    if ready.send(Ok(())).is_err() {
        // The starter gave up (timeout or session closed); release immediately.
        tracing::info!(device = device_path, "camera start abandoned; releasing device");
        return;
    }
    tracing::info!(device = device_path, "camera stream live");

    while let Some(request) = rx.blocking_recv() {
        match request {
            StreamRequest::Grab { reply } => {
                let result = camera.next_frame(&mut stream);
                if let Err(e) = &result {
                    tracing::warn!(device = device_path, error = %e, "frame grab failed");
                }
                let _ = reply.send(result);
            }
        }
    }

    drop(stream);
    drop(camera);
    tracing::info!(device = device_path, "camera released");
    drop(exited);
}
