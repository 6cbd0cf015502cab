//! Video frame types and processing

use crate::CameraError;

/// Channel order of a packed 3-byte pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb24,
    Bgr24,
}

/// Decoded 8-bit, 3-channel video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Packed pixel data (width * height * 3)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Channel order of `data`
    pub format: PixelFormat,
    /// Capture timestamp (nanoseconds)
    pub timestamp_ns: u64,
    /// Frame sequence number
    pub sequence: u32,
}

impl VideoFrame {
    /// Create a new RGB video frame from raw data
    pub fn new(data: Vec<u8>, width: u32, height: u32, timestamp_ns: u64, sequence: u32) -> Self {
        Self {
            data,
            width,
            height,
            format: PixelFormat::Rgb24,
            timestamp_ns,
            sequence,
        }
    }

    /// Create a frame filled with a single color given in `format` order
    pub fn filled(width: u32, height: u32, format: PixelFormat, pixel: [u8; 3]) -> Self {
        let data = pixel
            .iter()
            .copied()
            .cycle()
            .take((width * height * 3) as usize)
            .collect();
        Self {
            data,
            width,
            height,
            format,
            timestamp_ns: 0,
            sequence: 0,
        }
    }

    /// Expected buffer length for the frame dimensions
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    /// Check that dimensions are non-zero and the buffer matches them
    pub fn validate(&self) -> Result<(), CameraError> {
        if self.width == 0 || self.height == 0 {
            return Err(CameraError::Format(format!(
                "empty frame {}x{}",
                self.width, self.height
            )));
        }
        if self.data.len() != self.expected_len() {
            return Err(CameraError::Format(format!(
                "buffer of {} bytes does not match {}x{}x3",
                self.data.len(),
                self.width,
                self.height
            )));
        }
        Ok(())
    }

    /// Get pixel at (x, y) in the frame's own channel order
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y * self.width + x) * 3) as usize;
        self.data.get(idx..idx + 3).map(|p| [p[0], p[1], p[2]])
    }

    /// Return the frame converted to `target` channel order
    pub fn to_format(&self, target: PixelFormat) -> VideoFrame {
        let mut out = self.clone();
        out.convert_in_place(target);
        out
    }

    /// Swap channel order in place when `target` differs from the current format
    pub fn convert_in_place(&mut self, target: PixelFormat) {
        if self.format == target {
            return;
        }
        for pixel in self.data.chunks_exact_mut(3) {
            pixel.swap(0, 2);
        }
        self.format = target;
    }
}

/// Decode an MJPEG frame to RGB
pub fn decode_mjpeg(mjpeg_data: &[u8], timestamp_ns: u64, sequence: u32) -> Result<VideoFrame, CameraError> {
    use image::ImageFormat;

    let img = image::load_from_memory_with_format(mjpeg_data, ImageFormat::Jpeg)
        .map_err(|e| CameraError::Decode(e.to_string()))?;
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();

    Ok(VideoFrame::new(rgb.into_raw(), width, height, timestamp_ns, sequence))
}
