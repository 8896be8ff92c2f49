use crate::media::StreamConstraints;
use std::time::Duration;

/// Tunables for one capture session.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Camera request sent to the media source.
    pub constraints: StreamConstraints,
    /// Upper bound on `FaceModel::load`; `None` waits indefinitely.
    pub model_load_timeout: Option<Duration>,
    /// Upper bound on `MediaSource::start` (includes a pending permission prompt).
    pub camera_start_timeout: Option<Duration>,
    /// Pause between a successful submission and the host callback.
    pub confirmation_delay: Duration,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            constraints: StreamConstraints::default(),
            model_load_timeout: Some(Duration::from_secs(30)),
            camera_start_timeout: Some(Duration::from_secs(10)),
            confirmation_delay: Duration::from_millis(1500),
        }
    }
}
