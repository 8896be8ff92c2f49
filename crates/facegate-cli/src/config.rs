use anyhow::{Context, Result};
use facegate_client::ClientConfig;
use facegate_core::{FacingMode, StreamConstraints, WorkflowConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// CLI configuration: optional TOML file, then `FACEGATE_*` overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub camera: CameraConfig,
    pub workflow: WorkflowSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub url: String,
    /// Never printed; see [`Config::redacted`].
    pub token: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:5000/api".to_string(),
            token: None,
            request_timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// V4L2 device path; unset means pick by `facing`.
    pub device: Option<String>,
    pub facing: Facing,
    pub width: u32,
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: None,
            facing: Facing::User,
            width: 640,
            height: 480,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    User,
    Environment,
}

impl From<Facing> for FacingMode {
    fn from(facing: Facing) -> Self {
        match facing {
            Facing::User => FacingMode::User,
            Facing::Environment => FacingMode::Environment,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowSettings {
    /// 0 disables the bound.
    pub model_load_timeout_secs: u64,
    /// 0 disables the bound.
    pub camera_start_timeout_secs: u64,
    pub confirmation_delay_ms: u64,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            model_load_timeout_secs: 30,
            camera_start_timeout_secs: 10,
            confirmation_delay_ms: 1500,
        }
    }
}

impl Config {
    /// Load from `$FACEGATE_CONFIG` (if set) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var_os("FACEGATE_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Override fields from `FACEGATE_*` variables; unparsable values are ignored.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("FACEGATE_API_URL") {
            self.api.url = url;
        }
        if let Some(token) = var("FACEGATE_API_TOKEN").filter(|t| !t.is_empty()) {
            self.api.token = Some(token);
        }
        if let Some(device) = var("FACEGATE_CAMERA_DEVICE").filter(|d| !d.is_empty()) {
            self.camera.device = Some(device);
        }

        let api = &mut self.api;
        let camera = &mut self.camera;
        let workflow = &mut self.workflow;
        parse_into(&var, "FACEGATE_REQUEST_TIMEOUT_SECS", &mut api.request_timeout_secs);
        parse_into(&var, "FACEGATE_FRAME_WIDTH", &mut camera.width);
        parse_into(&var, "FACEGATE_FRAME_HEIGHT", &mut camera.height);
        parse_into(
            &var,
            "FACEGATE_MODEL_LOAD_TIMEOUT_SECS",
            &mut workflow.model_load_timeout_secs,
        );
        parse_into(
            &var,
            "FACEGATE_CAMERA_START_TIMEOUT_SECS",
            &mut workflow.camera_start_timeout_secs,
        );
        parse_into(
            &var,
            "FACEGATE_CONFIRMATION_DELAY_MS",
            &mut workflow.confirmation_delay_ms,
        );
    }

    pub fn workflow_config(&self) -> WorkflowConfig {
        WorkflowConfig {
            constraints: self.stream_constraints(),
            model_load_timeout: nonzero_secs(self.workflow.model_load_timeout_secs),
            camera_start_timeout: nonzero_secs(self.workflow.camera_start_timeout_secs),
            confirmation_delay: Duration::from_millis(self.workflow.confirmation_delay_ms),
        }
    }

    pub fn stream_constraints(&self) -> StreamConstraints {
        StreamConstraints {
            width: self.camera.width,
            height: self.camera.height,
            facing: self.camera.facing.into(),
            device: self.camera.device.clone(),
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.api.url.clone(),
            token: self.api.token.clone(),
            timeout: Duration::from_secs(self.api.request_timeout_secs),
        }
    }

    /// Copy safe to print: the API token is masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.api.token.is_some() {
            copy.api.token = Some("***".to_string());
        }
        copy
    }
}

/// Config file named by `$FACEGATE_CONFIG`, if any.
pub fn config_path() -> Option<PathBuf> {
    std::env::var_os("FACEGATE_CONFIG").map(PathBuf::from)
}

fn parse_into<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut T,
) {
    match var(key).map(|v| v.trim().parse::<T>()) {
        Some(Ok(value)) => *slot = value,
        Some(Err(_)) => tracing::warn!(key, "ignoring unparsable value"),
        None => {}
    }
}

fn nonzero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}
