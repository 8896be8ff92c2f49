//! Camera stream capability and the guard that guarantees its release.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("camera not found: {0}")]
    NotFound(String),
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("camera busy")]
    Busy,
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("stream stopped")]
    Stopped,
}

/// Which camera to prefer when several are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FacingMode {
    /// Front camera, facing the person at the screen.
    #[default]
    User,
    Environment,
}

/// Parameters requested when the stream is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConstraints {
    pub width: u32,
    pub height: u32,
    pub facing: FacingMode,
    /// Explicit device to open; `None` lets the source pick one for `facing`.
    pub device: Option<String>,
}

impl Default for StreamConstraints {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            facing: FacingMode::User,
            device: None,
        }
    }
}

/// A still grayscale frame taken from the live stream.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Grayscale pixel data (width * height bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub sequence: u32,
}

impl CapturedFrame {
    /// Average pixel brightness (0.0–255.0).
    pub fn avg_brightness(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().map(|&b| b as f32).sum::<f32>() / self.data.len() as f32
    }
}

/// Acquires live camera streams.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn start(&self, constraints: &StreamConstraints)
        -> Result<Box<dyn MediaStream>, MediaError>;
}

/// A live camera stream. Holds the hardware until `stop` is called.
#[async_trait]
pub trait MediaStream: Send {
    async fn grab_frame(&mut self) -> Result<CapturedFrame, MediaError>;

    /// Release the camera. Called at most once, by [`StreamGuard`].
    fn stop(&mut self);
}

/// Owns a started stream and stops it exactly once: on an explicit
/// [`stop`](Self::stop) or, failing that, on drop.
pub struct StreamGuard {
    stream: Option<Box<dyn MediaStream>>,
}

impl StreamGuard {
    pub fn new(stream: Box<dyn MediaStream>) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    /// Start a stream from `source` and wrap it.
    pub async fn acquire(
        source: &dyn MediaSource,
        constraints: &StreamConstraints,
    ) -> Result<Self, MediaError> {
        let stream = source.start(constraints).await?;
        tracing::debug!(
            width = constraints.width,
            height = constraints.height,
            "media stream started"
        );
        Ok(Self::new(stream))
    }

    pub async fn grab_frame(&mut self) -> Result<CapturedFrame, MediaError> {
        match self.stream.as_mut() {
            Some(stream) => stream.grab_frame().await,
            None => Err(MediaError::Stopped),
        }
    }

    pub fn is_active(&self) -> bool {
        self.stream.is_some()
    }

    /// Idempotent.
    pub fn stop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            tracing::debug!("media stream stopped");
        }
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.stop();
    }
}
