mod config;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use config::Config;
use facegate_client::HttpBiometricClient;
use facegate_core::submit::{submitter_for, Submitter};
use facegate_core::{BiometricClient, Descriptor, MediaSource, Mode, Outcome, StreamGuard};
use facegate_hw::{Camera, V4lMediaSource};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "facegate", about = "facegate camera, backend and configuration diagnostics")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List V4L2 capture devices
    Devices,
    /// Open the configured camera, grab one frame, and report on it
    Probe {
        /// Device path (overrides configuration)
        #[arg(short, long)]
        device: Option<String>,
        /// Write the grabbed frame as a grayscale PNG
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Submit a stored descriptor (JSON array of numbers) to the backend
    Submit {
        /// Descriptor file
        descriptor: PathBuf,
        /// Register the face for this employee instead of recognizing it
        #[arg(long, value_name = "EMPLOYEE_ID")]
        enroll: Option<String>,
    },
    /// Print the effective configuration as JSON
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Devices => list_devices().await,
        Commands::Probe { device, save } => probe(&config, device, save).await,
        Commands::Submit { descriptor, enroll } => submit(&config, descriptor, enroll).await,
        Commands::Config => {
            if let Some(path) = config::config_path() {
                eprintln!("config file: {}", path.display());
            }
            println!("{}", serde_json::to_string_pretty(&config.redacted())?);
            Ok(())
        }
    }
}

async fn list_devices() -> Result<()> {
    let devices = tokio::task::spawn_blocking(Camera::list_devices).await?;
    if devices.is_empty() {
        println!("no capture devices found");
        return Ok(());
    }
    for dev in &devices {
        println!("{}  {}  (driver: {}, bus: {})", dev.path, dev.name, dev.driver, dev.bus);
    }
    Ok(())
}

async fn probe(config: &Config, device: Option<String>, save: Option<PathBuf>) -> Result<()> {
    let workflow = config.workflow_config();
    let mut constraints = workflow.constraints;
    if device.is_some() {
        constraints.device = device;
    }

    let source = V4lMediaSource::new();
    let source: &dyn MediaSource = &source;
    let acquire = StreamGuard::acquire(source, &constraints);
    let started = match workflow.camera_start_timeout {
        Some(limit) => tokio::time::timeout(limit, acquire)
            .await
            .with_context(|| format!("camera did not start within {limit:?}"))?,
        None => acquire.await,
    };
    let mut guard = started.context("failed to start camera")?;

    let grabbed = guard.grab_frame().await;
    guard.stop();
    let frame = grabbed.context("failed to grab frame")?;

    println!(
        "frame #{}: {}x{}, avg brightness {:.1}",
        frame.sequence,
        frame.width,
        frame.height,
        frame.avg_brightness()
    );

    if let Some(path) = save {
        let Some(img) = image::GrayImage::from_raw(frame.width, frame.height, frame.data) else {
            bail!("frame buffer does not match {}x{}", frame.width, frame.height);
        };
        img.save(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("saved {}", path.display());
    }
    Ok(())
}

async fn submit(config: &Config, path: PathBuf, enroll: Option<String>) -> Result<()> {
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let descriptor: Descriptor = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a JSON number array", path.display()))?;
    if descriptor.is_empty() {
        bail!("descriptor in {} is empty", path.display());
    }

    let mode = match enroll {
        Some(subject_id) => Mode::enroll(subject_id),
        None => Mode::Verify,
    };
    let client: Arc<dyn BiometricClient> =
        Arc::new(HttpBiometricClient::new(&config.client_config())?);
    tracing::info!(%mode, dim = descriptor.len(), url = %config.api.url, "submitting descriptor");

    match submitter_for(&mode, client).submit(&descriptor).await {
        Ok(Outcome::Enrolled { subject_id, .. }) => println!("enrolled {subject_id}"),
        Ok(Outcome::Recognized {
            subject_id,
            display_name,
        }) => println!("recognized {display_name} ({subject_id})"),
        Ok(Outcome::Rejected { reason }) | Err(reason) => bail!("{reason}"),
    }
    Ok(())
}
