//! V4L2 camera capture via the `v4l` crate.

use crate::frame;
use facegate_core::{CapturedFrame, FacingMode, MediaError};
use std::io;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// Fraction of near-black pixels above which a frame counts as dark.
const DARK_FRAME_THRESHOLD: f32 = 0.95;
/// Extra dequeues allowed per grab while the sensor is still dark.
pub(crate) const MAX_DARK_SKIPS: usize = 3;
const STREAM_BUFFERS: u32 = 4;
/// Upper bound on a single buffer dequeue; a stalled driver fails the grab.
pub(crate) const DEQUEUE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("no video capture devices found")]
    NoDevices,
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
}

impl From<CameraError> for MediaError {
    fn from(err: CameraError) -> Self {
        match err {
            CameraError::DeviceNotFound(path) => MediaError::NotFound(path),
            CameraError::NoDevices => MediaError::NotFound("no video capture devices".into()),
            CameraError::PermissionDenied(msg) => MediaError::PermissionDenied(msg),
            CameraError::DeviceBusy => MediaError::Busy,
            other => MediaError::CaptureFailed(other.to_string()),
        }
    }
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel, extract Y channel).
    Yuyv,
    /// 8-bit grayscale (1 byte/pixel).
    Grey,
    /// 16-bit little-endian grayscale (2 bytes/pixel).
    Y16,
}

/// V4L2 camera device handle.
pub struct Camera {
    device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub fourcc: FourCC,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open a V4L2 device and request `width`×`height`.
    ///
    /// The driver may negotiate a different size; the negotiated one is
    /// stored in `width`/`height`.
    pub fn open(device_path: &str, width: u32, height: u32) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| open_error(device_path, e))?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;
        if !caps
            .capabilities
            .contains(v4l::capability::Flags::VIDEO_CAPTURE)
        {
            return Err(CameraError::StreamingNotSupported);
        }
        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = width;
        fmt.height = height;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;

        let fourcc = negotiated.fourcc;
        let pixel_format = if fourcc == FourCC::new(b"YUYV") {
            PixelFormat::Yuyv
        } else if fourcc == FourCC::new(b"GREY") {
            PixelFormat::Grey
        } else if fourcc == FourCC::new(b"Y16 ") || fourcc == FourCC::new(b"Y16\0") {
            PixelFormat::Y16
        } else {
            return Err(CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {fourcc:?} (need YUYV, GREY, or Y16)"
            )));
        };

        tracing::info!(
            requested_width = width,
            requested_height = height,
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?fourcc,
            "negotiated format"
        );

        Ok(Self {
            device,
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
            fourcc,
            pixel_format,
        })
    }

    /// Start memory-mapped streaming. The stream stays live until dropped.
    pub fn stream(&self) -> Result<MmapStream<'_>, CameraError> {
        let mut stream =
            MmapStream::with_buffers(&self.device, BufType::VideoCapture, STREAM_BUFFERS)
                .map_err(|e| {
                    CameraError::CaptureFailed(format!("failed to create mmap stream: {e}"))
                })?;
        stream.set_timeout(DEQUEUE_TIMEOUT);
        Ok(stream)
    }

    /// Dequeue the next frame as grayscale, skipping a few dark frames while
    /// auto-exposure settles. The last frame is returned even if still dark.
    pub fn next_frame(&self, stream: &mut MmapStream<'_>) -> Result<CapturedFrame, CameraError> {
        let mut skipped = 0usize;
        loop {
            let (buf, meta) = stream.next().map_err(|e| {
                CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}"))
            })?;
            let sequence = meta.sequence;
            let gray = self.buf_to_grayscale(buf)?;

            if frame::is_dark_frame(&gray, DARK_FRAME_THRESHOLD) && skipped < MAX_DARK_SKIPS {
                skipped += 1;
                tracing::debug!(seq = sequence, "skipping dark frame");
                continue;
            }

            return Ok(CapturedFrame {
                data: gray,
                width: self.width,
                height: self.height,
                sequence,
            });
        }
    }

    fn buf_to_grayscale(&self, buf: &[u8]) -> Result<Vec<u8>, CameraError> {
        let converted = match self.pixel_format {
            PixelFormat::Yuyv => frame::yuyv_to_grayscale(buf, self.width, self.height),
            PixelFormat::Grey => frame::grey_to_grayscale(buf, self.width, self.height),
            PixelFormat::Y16 => frame::y16_to_grayscale(buf, self.width, self.height),
        };
        converted.map_err(|e| CameraError::CaptureFailed(e.to_string()))
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..16 {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps
                .capabilities
                .contains(v4l::capability::Flags::VIDEO_CAPTURE)
            {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}

fn open_error(device_path: &str, e: io::Error) -> CameraError {
    if e.kind() == io::ErrorKind::PermissionDenied {
        CameraError::PermissionDenied(format!("{device_path}: {e}"))
    } else if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
        CameraError::DeviceBusy
    } else {
        CameraError::DeviceNotFound(format!("{device_path}: {e}"))
    }
}

const USER_FACING_HINTS: [&str; 5] = ["front", "user", "integrated", "webcam", "facetime"];
const ENVIRONMENT_FACING_HINTS: [&str; 4] = ["rear", "back", "world", "environment"];

/// Pick the device whose name best matches `facing`.
///
/// Falls back to the first non-IR device, then to the first device at all.
pub fn select_device(devices: &[DeviceInfo], facing: FacingMode) -> Option<&DeviceInfo> {
    let hints: &[&str] = match facing {
        FacingMode::User => &USER_FACING_HINTS,
        FacingMode::Environment => &ENVIRONMENT_FACING_HINTS,
    };
    let lower = |d: &DeviceInfo| d.name.to_lowercase();

    devices
        .iter()
        .find(|d| {
            let name = lower(d);
            hints.iter().any(|h| name.contains(h))
        })
        .or_else(|| {
            devices
                .iter()
                .find(|d| !lower(d).split_whitespace().any(|w| w == "ir"))
        })
        .or_else(|| devices.first())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev(path: &str, name: &str) -> DeviceInfo {
        DeviceInfo {
            path: path.into(),
            name: name.into(),
            driver: "uvcvideo".into(),
            bus: "usb-0000:00:14.0-5".into(),
        }
    }

    #[test]
    fn test_select_user_facing_by_name() {
        let devices = vec![
            dev("/dev/video0", "Logitech C920"),
            dev("/dev/video2", "Integrated Camera: Integrated C"),
        ];
        let chosen = select_device(&devices, FacingMode::User).unwrap();
        assert_eq!(chosen.path, "/dev/video2");
    }

    #[test]
    fn test_select_skips_ir_camera_without_hint() {
        let devices = vec![
            dev("/dev/video0", "USB2.0 IR Camera"),
            dev("/dev/video2", "USB2.0 HD UVC"),
        ];
        let chosen = select_device(&devices, FacingMode::User).unwrap();
        assert_eq!(chosen.path, "/dev/video2");
    }

    #[test]
    fn test_select_environment_facing() {
        let devices = vec![
            dev("/dev/video0", "Front Camera"),
            dev("/dev/video1", "Rear Camera"),
        ];
        let chosen = select_device(&devices, FacingMode::Environment).unwrap();
        assert_eq!(chosen.path, "/dev/video1");
    }

    #[test]
    fn test_select_falls_back_to_first() {
        let devices = vec![dev("/dev/video4", "IR Camera")];
        assert_eq!(
            select_device(&devices, FacingMode::User).unwrap().path,
            "/dev/video4"
        );
        assert!(select_device(&[], FacingMode::User).is_none());
    }

    #[test]
    fn test_open_missing_device() {
        let err = Camera::open("/dev/video-does-not-exist", 640, 480)
            .err()
            .unwrap();
        assert!(matches!(err, CameraError::DeviceNotFound(_)));
        assert!(matches!(MediaError::from(err), MediaError::NotFound(_)));
    }

    #[test]
    fn test_error_mapping_to_media() {
        assert!(matches!(
            MediaError::from(CameraError::DeviceBusy),
            MediaError::Busy
        ));
        assert!(matches!(
            MediaError::from(CameraError::PermissionDenied("/dev/video0".into())),
            MediaError::PermissionDenied(_)
        ));
        assert!(matches!(
            MediaError::from(CameraError::StreamingNotSupported),
            MediaError::CaptureFailed(_)
        ));
    }
}
