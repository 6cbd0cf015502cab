//! V4L2 webcam source.
//!
//! Requests packed RGB at the configured resolution. Devices that refuse
//! RGB3 but offer MJPG are decoded per frame; anything else fails to open.

use ouroboros::self_referencing;
use tracing::{info, warn};

use crate::frame::decode_mjpeg;
use crate::source::is_device_gone;
use crate::{CameraConfig, CameraError, FrameSource, PixelFormat, VideoFrame};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WireFormat {
    Rgb3,
    Mjpg,
}

#[self_referencing]
struct StreamState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

/// Webcam opened through V4L2, released on drop
pub struct V4l2Camera {
    device_path: String,
    state: StreamState,
    wire_format: WireFormat,
    width: u32,
    height: u32,
    sequence: u32,
    disconnected: bool,
}

impl V4l2Camera {
    /// Open the device and start streaming
    pub fn open(config: &CameraConfig) -> Result<Self, CameraError> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&config.device)
            .map_err(|e| CameraError::Open(format!("{}: {}", config.device, e)))?;

        let mut format = device
            .format()
            .map_err(|e| CameraError::Format(e.to_string()))?;
        format.width = config.width;
        format.height = config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                warn!("Failed to set RGB3 on {}: {}", config.device, err);
                device
                    .format()
                    .map_err(|e| CameraError::Format(e.to_string()))?
            }
        };

        let wire_format = if format.fourcc == v4l::FourCC::new(b"RGB3") {
            WireFormat::Rgb3
        } else if format.fourcc == v4l::FourCC::new(b"MJPG") {
            WireFormat::Mjpg
        } else {
            return Err(CameraError::Format(format!(
                "unsupported pixel format {}",
                format.fourcc
            )));
        };

        if config.fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(config.fps);
            if let Err(err) = device.set_params(&params) {
                warn!("Failed to set fps on {}: {}", config.device, err);
            }
        }

        let state = StreamState::try_new(device, |device| {
            v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                .map_err(|e| CameraError::Stream(e.to_string()))
        })?;

        info!(
            "Opened camera {} ({}x{}, {:?})",
            config.device, format.width, format.height, wire_format
        );

        Ok(Self {
            device_path: config.device.clone(),
            state,
            wire_format,
            width: format.width,
            height: format.height,
            sequence: 0,
            disconnected: false,
        })
    }
}

impl FrameSource for V4l2Camera {
    fn read_frame(&mut self) -> Result<Option<VideoFrame>, CameraError> {
        use v4l::io::traits::CaptureStream;

        if self.disconnected {
            return Ok(None);
        }

        let read = self
            .state
            .with_stream_mut(|stream| {
                stream.next().map(|(buf, meta)| {
                    let timestamp_ns = (meta.timestamp.sec as u64)
                        .saturating_mul(1_000_000_000)
                        .saturating_add(meta.timestamp.usec as u64 * 1_000);
                    (buf.to_vec(), timestamp_ns)
                })
            });
        let (buf, timestamp_ns) = match read {
            Ok(read) => read,
            Err(e) if is_device_gone(&e) => {
                warn!("Camera {} disconnected", self.device_path);
                self.disconnected = true;
                return Ok(None);
            }
            Err(e) => return Err(CameraError::Stream(e.to_string())),
        };

        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);

        let frame = match self.wire_format {
            WireFormat::Rgb3 => VideoFrame {
                data: buf,
                width: self.width,
                height: self.height,
                format: PixelFormat::Rgb24,
                timestamp_ns,
                sequence,
            },
            WireFormat::Mjpg => decode_mjpeg(&buf, timestamp_ns, sequence)?,
        };

        frame.validate()?;
        Ok(Some(frame))
    }

    fn describe(&self) -> String {
        format!("{} ({}x{})", self.device_path, self.width, self.height)
    }
}
