//! Frame sources
//!
//! A [`FrameSource`] owns the capture device for its whole lifetime and
//! releases it on drop.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::info;

use crate::{CameraConfig, CameraError, PixelFormat, VideoFrame};

/// Blocking source of video frames.
pub trait FrameSource {
    /// Read the next frame.
    ///
    /// `Ok(None)` means the source is exhausted and will never yield again.
    /// `Err` is a failed read; the caller may try again on the next tick.
    fn read_frame(&mut self) -> Result<Option<VideoFrame>, CameraError>;

    /// Human readable name of the underlying device
    fn describe(&self) -> String;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn read_frame(&mut self) -> Result<Option<VideoFrame>, CameraError> {
        (**self).read_frame()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// errno for a device that no longer exists (Linux)
const ENODEV: i32 = 19;

/// Whether a read error means the device is gone, e.g. an unplugged webcam.
///
/// Sources report this as exhaustion rather than a retryable failure.
pub fn is_device_gone(err: &std::io::Error) -> bool {
    err.raw_os_error() == Some(ENODEV)
}

/// Open the source selected by `config.device`.
pub fn open_source(config: &CameraConfig) -> Result<Box<dyn FrameSource>, CameraError> {
    if config.is_synthetic() {
        return Ok(Box::new(SyntheticSource::new(config)?));
    }

    open_device(config)
}

#[cfg(feature = "v4l2")]
fn open_device(config: &CameraConfig) -> Result<Box<dyn FrameSource>, CameraError> {
    Ok(Box::new(crate::v4l2::V4l2Camera::open(config)?))
}

#[cfg(not(feature = "v4l2"))]
fn open_device(config: &CameraConfig) -> Result<Box<dyn FrameSource>, CameraError> {
    Err(CameraError::Open(format!(
        "{}: built without the `v4l2` feature",
        config.device
    )))
}

/// Synthetic source producing a moving gradient.
///
/// Device strings look like `stub://synthetic?frames=30&fail_every=5`:
/// `frames` bounds the number of frames before exhaustion and `fail_every`
/// makes every n-th read fail with a timeout.
#[derive(Debug)]
pub struct SyntheticSource {
    device: String,
    width: u32,
    height: u32,
    max_frames: Option<u64>,
    fail_every: Option<u64>,
    reads: u64,
    frames: u64,
}

impl SyntheticSource {
    pub fn new(config: &CameraConfig) -> Result<Self, CameraError> {
        if config.width == 0 || config.height == 0 {
            return Err(CameraError::Open(format!(
                "invalid synthetic resolution {}x{}",
                config.width, config.height
            )));
        }

        let mut max_frames = None;
        let mut fail_every = None;
        if let Some((_, query)) = config.device.split_once('?') {
            for pair in query.split('&') {
                let (key, value) = pair
                    .split_once('=')
                    .ok_or_else(|| CameraError::Open(format!("bad stub option `{}`", pair)))?;
                let value: u64 = value
                    .parse()
                    .map_err(|_| CameraError::Open(format!("bad stub value `{}`", pair)))?;
                match key {
                    "frames" => max_frames = Some(value),
                    "fail_every" if value > 0 => fail_every = Some(value),
                    _ => return Err(CameraError::Open(format!("unknown stub option `{}`", key))),
                }
            }
        }

        info!(
            "Opened synthetic camera {} ({}x{})",
            config.device, config.width, config.height
        );

        Ok(Self {
            device: config.device.clone(),
            width: config.width,
            height: config.height,
            max_frames,
            fail_every,
            reads: 0,
            frames: 0,
        })
    }

    /// Frames produced so far
    pub fn frames_captured(&self) -> u64 {
        self.frames
    }

    fn generate(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity((self.width * self.height * 3) as usize);
        let shift = self.frames as u32;
        for y in 0..self.height {
            for x in 0..self.width {
                data.push(((x + shift) % 256) as u8);
                data.push(((y + shift) % 256) as u8);
                data.push(((x + y) % 256) as u8);
            }
        }
        data
    }
}

impl FrameSource for SyntheticSource {
    fn read_frame(&mut self) -> Result<Option<VideoFrame>, CameraError> {
        if self.max_frames.is_some_and(|max| self.frames >= max) {
            return Ok(None);
        }

        self.reads += 1;
        if self.fail_every.is_some_and(|n| self.reads % n == 0) {
            return Err(CameraError::Timeout);
        }

        let timestamp_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);

        let frame = VideoFrame {
            data: self.generate(),
            width: self.width,
            height: self.height,
            format: PixelFormat::Rgb24,
            timestamp_ns,
            sequence: self.frames as u32,
        };
        self.frames += 1;
        Ok(Some(frame))
    }

    fn describe(&self) -> String {
        format!("{} ({}x{})", self.device, self.width, self.height)
    }
}
