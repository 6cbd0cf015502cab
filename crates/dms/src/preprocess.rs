//! Frame preprocessing for the behavior classifier

use camera_capture::{PixelFormat, VideoFrame};
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;

use crate::DmsError;

/// Classifier input of shape `[1, height, width, 3]`, values in `[0, 1]`
#[derive(Debug, Clone)]
pub struct InputTensor {
    data: Array4<f32>,
}

impl InputTensor {
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn array(&self) -> &Array4<f32> {
        &self.data
    }

    /// Contiguous values in `[batch, y, x, channel]` order
    pub fn as_slice(&self) -> Option<&[f32]> {
        self.data.as_slice()
    }
}

/// Converts camera frames into the classifier's input layout
#[derive(Debug, Clone)]
pub struct FramePreprocessor {
    width: u32,
    height: u32,
    channel_order: PixelFormat,
}

impl FramePreprocessor {
    /// Preprocessor for an RGB-trained model with the given input size
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            channel_order: PixelFormat::Rgb24,
        }
    }

    /// Override the channel order the model was trained on
    pub fn with_channel_order(mut self, channel_order: PixelFormat) -> Self {
        self.channel_order = channel_order;
        self
    }

    pub fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Reorder channels, resize, rescale by 1/255 and add the batch axis
    pub fn preprocess(&self, frame: &VideoFrame) -> Result<InputTensor, DmsError> {
        frame
            .validate()
            .map_err(|e| DmsError::InvalidFrame(e.to_string()))?;

        let ordered = frame.to_format(self.channel_order);
        let img = RgbImage::from_raw(ordered.width, ordered.height, ordered.data)
            .ok_or_else(|| DmsError::ImageProcessing("Failed to create image buffer".into()))?;

        let resized = if img.dimensions() == (self.width, self.height) {
            img
        } else {
            imageops::resize(&img, self.width, self.height, FilterType::Triangle)
        };

        let mut data = Array4::<f32>::zeros((1, self.height as usize, self.width as usize, 3));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                data[[0, y as usize, x as usize, c]] = pixel[c] as f32 / 255.0;
            }
        }

        Ok(InputTensor { data })
    }
}

impl Default for FramePreprocessor {
    fn default() -> Self {
        Self::new(224, 224)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_output_shape() {
        let frame = VideoFrame::filled(640, 480, PixelFormat::Rgb24, [255, 128, 0]);
        let tensor = FramePreprocessor::default().preprocess(&frame).unwrap();

        assert_eq!(tensor.shape(), &[1usize, 224, 224, 3]);
        assert!(tensor.as_slice().is_some());
    }

    #[test]
    fn test_bgr_frame_is_reordered() {
        let frame = VideoFrame::filled(8, 8, PixelFormat::Bgr24, [0, 0, 255]);
        let tensor = FramePreprocessor::new(4, 4).preprocess(&frame).unwrap();

        let px = tensor.array();
        assert_eq!(px[[0, 2, 2, 0]], 1.0);
        assert_eq!(px[[0, 2, 2, 2]], 0.0);
    }

    #[test]
    fn test_rescale() {
        let frame = VideoFrame::filled(224, 224, PixelFormat::Rgb24, [0, 51, 255]);
        let tensor = FramePreprocessor::default().preprocess(&frame).unwrap();

        let px = tensor.array();
        assert_eq!(px[[0, 100, 100, 0]], 0.0);
        assert!((px[[0, 100, 100, 1]] - 0.2).abs() < 1e-6);
        assert_eq!(px[[0, 100, 100, 2]], 1.0);
    }

    #[test]
    fn test_malformed_frame_fails_fast() {
        let frame = VideoFrame::new(vec![0; 100], 640, 480, 0, 0);
        assert!(matches!(
            FramePreprocessor::default().preprocess(&frame),
            Err(DmsError::InvalidFrame(_))
        ));

        let empty = VideoFrame::new(vec![], 0, 0, 0, 0);
        assert!(FramePreprocessor::default().preprocess(&empty).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_shape_and_range(
            width in 1u32..96,
            height in 1u32..96,
            seed in any::<u8>(),
        ) {
            let data = (0..(width * height * 3))
                .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
                .collect();
            let frame = VideoFrame::new(data, width, height, 0, 0);
            let tensor = FramePreprocessor::default().preprocess(&frame).unwrap();

            prop_assert_eq!(tensor.shape(), &[1usize, 224, 224, 3]);
            prop_assert!(tensor.array().iter().all(|v| (0.0..=1.0).contains(v)));
        }
    }
}
