//! facegate-hw — Camera access for the capture workflow.
//!
//! Implements `facegate_core::MediaSource` on top of V4L2: device selection,
//! format negotiation, grayscale conversion, and a per-stream capture thread.

pub mod camera;
pub mod frame;
pub mod source;

pub use camera::{select_device, Camera, CameraError, DeviceInfo, PixelFormat};
pub use source::{V4lMediaSource, V4lStream};
