//! Face detection

use std::path::Path;

use camera_capture::{PixelFormat, VideoFrame};
use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use tract_onnx::prelude::*;
use tracing::{debug, info};

use crate::DmsError;

/// Face bounding box in frame pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceBbox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl FaceBbox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection over union with another box
    pub fn iou(&self, other: &FaceBbox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }

        let intersection = (x2 - x1) * (y2 - y1);
        let union = self.area() + other.area() - intersection;
        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

/// Face detector yielding zero or more boxes per frame.
///
/// An empty result means no face is visible; it is not an error.
pub trait FaceDetector {
    fn detect(&self, frame: &VideoFrame) -> Result<Vec<FaceBbox>, DmsError>;
}

/// Greedy non-maximum suppression, highest confidence first
pub fn non_max_suppression(mut boxes: Vec<FaceBbox>, iou_threshold: f32) -> Vec<FaceBbox> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<FaceBbox> = Vec::with_capacity(boxes.len());
    for candidate in boxes {
        if kept.iter().all(|k| k.iou(&candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}

const ULTRAFACE_WIDTH: u32 = 320;
const ULTRAFACE_HEIGHT: u32 = 240;

/// Face detector for UltraFace-style ONNX models.
///
/// Input is `[1, 3, 240, 320]` RGB normalized as `(p - 127) / 128`.
/// Outputs are `scores [1, N, 2]` (background, face) and `boxes [1, N, 4]`
/// holding normalized corner coordinates.
pub struct OnnxFaceDetector {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl OnnxFaceDetector {
    pub fn new(
        path: impl AsRef<Path>,
        confidence_threshold: f32,
        iou_threshold: f32,
    ) -> Result<Self, DmsError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(DmsError::ModelLoad(format!(
                "face model not found: {}",
                path.display()
            )));
        }

        info!("Loading face detection model from {}", path.display());
        let input_shape = [1, 3, ULTRAFACE_HEIGHT as usize, ULTRAFACE_WIDTH as usize];
        let model = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|model| model.with_input_fact(0, f32::fact(input_shape).into()))
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|e| DmsError::ModelLoad(e.to_string()))?;

        Ok(Self {
            model,
            confidence_threshold,
            iou_threshold,
        })
    }

    fn input_tensor(&self, frame: &VideoFrame) -> Result<Tensor, DmsError> {
        frame
            .validate()
            .map_err(|e| DmsError::InvalidFrame(e.to_string()))?;

        let rgb = frame.to_format(PixelFormat::Rgb24);
        let img = RgbImage::from_raw(rgb.width, rgb.height, rgb.data)
            .ok_or_else(|| DmsError::ImageProcessing("Failed to create image buffer".into()))?;
        let resized = imageops::resize(&img, ULTRAFACE_WIDTH, ULTRAFACE_HEIGHT, FilterType::Triangle);

        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, ULTRAFACE_HEIGHT as usize, ULTRAFACE_WIDTH as usize),
            |(_, c, y, x)| (resized.get_pixel(x as u32, y as u32)[c] as f32 - 127.0) / 128.0,
        );
        Ok(input.into())
    }
}

impl FaceDetector for OnnxFaceDetector {
    fn detect(&self, frame: &VideoFrame) -> Result<Vec<FaceBbox>, DmsError> {
        let input = self.input_tensor(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| DmsError::Inference(e.to_string()))?;
        if outputs.len() < 2 {
            return Err(DmsError::Inference(format!(
                "face model produced {} outputs, expected scores and boxes",
                outputs.len()
            )));
        }

        let scores = outputs[0]
            .to_array_view::<f32>()
            .and_then(|view| Ok(view.into_dimensionality::<tract_ndarray::Ix3>()?))
            .map_err(|e| DmsError::Inference(e.to_string()))?;
        let boxes = outputs[1]
            .to_array_view::<f32>()
            .and_then(|view| Ok(view.into_dimensionality::<tract_ndarray::Ix3>()?))
            .map_err(|e| DmsError::Inference(e.to_string()))?;

        let faces = decode_faces(
            scores,
            boxes,
            (frame.width as f32, frame.height as f32),
            self.confidence_threshold,
            self.iou_threshold,
        )?;
        debug!("Detected {} face(s)", faces.len());
        Ok(faces)
    }
}

/// Turn UltraFace `scores [1,N,2]` and normalized `boxes [1,N,4]` into
/// frame-pixel detections. Scores at or above `confidence_threshold` are kept.
pub fn decode_faces(
    scores: tract_ndarray::ArrayView3<f32>,
    boxes: tract_ndarray::ArrayView3<f32>,
    (frame_w, frame_h): (f32, f32),
    confidence_threshold: f32,
    iou_threshold: f32,
) -> Result<Vec<FaceBbox>, DmsError> {
    let anchors = scores.shape()[1];
    if scores.shape()[2] != 2 || boxes.shape()[1] != anchors || boxes.shape()[2] != 4 {
        return Err(DmsError::Inference(format!(
            "unexpected face output shapes {:?} and {:?}",
            scores.shape(),
            boxes.shape()
        )));
    }

    let mut candidates = Vec::new();
    for i in 0..anchors {
        let confidence = scores[[0, i, 1]];
        if confidence < confidence_threshold {
            continue;
        }
        let x1 = boxes[[0, i, 0]].clamp(0.0, 1.0) * frame_w;
        let y1 = boxes[[0, i, 1]].clamp(0.0, 1.0) * frame_h;
        let x2 = boxes[[0, i, 2]].clamp(0.0, 1.0) * frame_w;
        let y2 = boxes[[0, i, 3]].clamp(0.0, 1.0) * frame_h;
        if x2 <= x1 || y2 <= y1 {
            continue;
        }
        candidates.push(FaceBbox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence,
        });
    }

    Ok(non_max_suppression(candidates, iou_threshold))
}

/// Detector returning canned boxes, scaled to each frame
#[derive(Debug, Clone, Default)]
pub struct StubFaceDetector {
    /// Boxes in normalized frame coordinates
    faces: Vec<FaceBbox>,
}

impl StubFaceDetector {
    /// Never finds a face
    pub fn none() -> Self {
        Self::default()
    }

    /// One face in the middle of the frame
    pub fn centered() -> Self {
        Self {
            faces: vec![FaceBbox {
                x: 0.3,
                y: 0.2,
                width: 0.4,
                height: 0.5,
                confidence: 0.95,
            }],
        }
    }

    /// Fixed boxes given in normalized `[0, 1]` coordinates
    pub fn with_faces(faces: Vec<FaceBbox>) -> Self {
        Self { faces }
    }
}

impl FaceDetector for StubFaceDetector {
    fn detect(&self, frame: &VideoFrame) -> Result<Vec<FaceBbox>, DmsError> {
        let w = frame.width as f32;
        let h = frame.height as f32;
        Ok(self
            .faces
            .iter()
            .map(|f| FaceBbox {
                x: f.x * w,
                y: f.y * h,
                width: f.width * w,
                height: f.height * h,
                confidence: f.confidence,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x: f32, y: f32, w: f32, h: f32, confidence: f32) -> FaceBbox {
        FaceBbox {
            x,
            y,
            width: w,
            height: h,
            confidence,
        }
    }

    #[test]
    fn test_iou() {
        let a = bbox(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = bbox(5.0, 0.0, 10.0, 10.0, 1.0);
        let c = bbox(20.0, 20.0, 5.0, 5.0, 1.0);

        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);
        assert_eq!(a.iou(&c), 0.0);
    }

    #[test]
    fn test_nms_keeps_best_of_overlapping() {
        let boxes = vec![
            bbox(0.0, 0.0, 10.0, 10.0, 0.6),
            bbox(1.0, 1.0, 10.0, 10.0, 0.9),
            bbox(50.0, 50.0, 10.0, 10.0, 0.7),
        ];
        let kept = non_max_suppression(boxes, 0.3);

        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].confidence, 0.7);
    }

    #[test]
    fn test_stub_scales_to_frame() {
        let frame = VideoFrame::filled(640, 480, PixelFormat::Rgb24, [0, 0, 0]);
        let faces = StubFaceDetector::centered().detect(&frame).unwrap();

        assert_eq!(faces.len(), 1);
        assert!((faces[0].x - 192.0).abs() < 1e-3);
        assert!((faces[0].height - 240.0).abs() < 1e-3);
        assert!(StubFaceDetector::none().detect(&frame).unwrap().is_empty());
    }

    fn outputs(rows: &[(f32, [f32; 4])]) -> (tract_ndarray::Array3<f32>, tract_ndarray::Array3<f32>) {
        let n = rows.len();
        let scores = tract_ndarray::Array3::from_shape_fn((1, n, 2), |(_, i, c)| {
            if c == 1 {
                rows[i].0
            } else {
                1.0 - rows[i].0
            }
        });
        let boxes = tract_ndarray::Array3::from_shape_fn((1, n, 4), |(_, i, c)| rows[i].1[c]);
        (scores, boxes)
    }

    #[test]
    fn test_decode_keeps_score_at_threshold() {
        let (scores, boxes) = outputs(&[
            (0.5, [0.1, 0.1, 0.3, 0.4]),
            (0.49, [0.6, 0.1, 0.8, 0.4]),
        ]);
        let faces = decode_faces(scores.view(), boxes.view(), (640.0, 480.0), 0.5, 0.3).unwrap();

        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].confidence, 0.5);
        assert!((faces[0].x - 64.0).abs() < 1e-3);
        assert!((faces[0].height - 144.0).abs() < 1e-3);
    }

    #[test]
    fn test_decode_suppresses_overlaps_and_degenerate_boxes() {
        let (scores, boxes) = outputs(&[
            (0.9, [0.1, 0.1, 0.5, 0.5]),
            (0.8, [0.12, 0.12, 0.5, 0.5]),
            (0.95, [0.7, 0.7, 0.7, 0.9]),
        ]);
        let faces = decode_faces(scores.view(), boxes.view(), (100.0, 100.0), 0.5, 0.3).unwrap();

        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].confidence, 0.9);
    }

    #[test]
    fn test_decode_rejects_bad_shapes() {
        let scores = tract_ndarray::Array3::<f32>::zeros((1, 4, 3));
        let boxes = tract_ndarray::Array3::<f32>::zeros((1, 4, 4));
        assert!(matches!(
            decode_faces(scores.view(), boxes.view(), (10.0, 10.0), 0.5, 0.3),
            Err(DmsError::Inference(_))
        ));
    }

    #[test]
    fn test_missing_face_model() {
        assert!(matches!(
            OnnxFaceDetector::new("/nonexistent/face.onnx", 0.5, 0.3),
            Err(DmsError::ModelLoad(_))
        ));
    }
}
