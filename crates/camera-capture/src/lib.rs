//! Camera Capture Library for the Driver Monitor
//!
//! Provides webcam frame acquisition behind the [`FrameSource`] trait.
//! Supports:
//! - V4L2 devices (`/dev/videoN`, feature `v4l2`), 640x480 requested
//! - Synthetic `stub://` sources for tests and demos

pub mod frame;
pub mod source;
#[cfg(feature = "v4l2")]
pub mod v4l2;

pub use frame::{PixelFormat, VideoFrame};
pub use source::{open_source, FrameSource, SyntheticSource};

use thiserror::Error;

/// Camera error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to open camera: {0}")]
    Open(String),

    #[error("Invalid format: {0}")]
    Format(String),

    #[error("Streaming error: {0}")]
    Stream(String),

    #[error("Capture timeout")]
    Timeout,

    #[error("Frame decode failed: {0}")]
    Decode(String),
}

/// Camera configuration
#[derive(Debug, Clone)]
pub struct CameraConfig {
    /// Device path (e.g., "/dev/video0" or "stub://synthetic")
    pub device: String,
    /// Requested capture width (advisory)
    pub width: u32,
    /// Requested capture height (advisory)
    pub height: u32,
    /// Target FPS, 0 leaves the device default
    pub fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            width: 640,
            height: 480,
            fps: 0,
        }
    }
}

impl CameraConfig {
    /// Config for a synthetic source that yields `frames` frames, or forever when `None`
    pub fn synthetic(frames: Option<u64>) -> Self {
        let device = match frames {
            Some(n) => format!("stub://synthetic?frames={}", n),
            None => "stub://synthetic".to_string(),
        };
        Self {
            device,
            ..Default::default()
        }
    }

    /// Whether this config selects the synthetic source
    pub fn is_synthetic(&self) -> bool {
        self.device.starts_with("stub://")
    }
}
