//! Driver Monitoring System (DMS)
//!
//! Per-frame driver behavior analysis:
//! - Frame preprocessing into the classifier's input tensor
//! - Face detection
//! - Behavior classification (top-1)
//! - Alert policy and overlay rendering
//! - The capture loop tying them together
//!
//! Every frame is processed independently; nothing is carried between frames.

pub mod analysis;
pub mod capture_loop;
pub mod classifier;
pub mod config;
pub mod detector;
pub mod overlay;
pub mod policy;
pub mod preprocess;

pub use analysis::FrameAnalysis;
pub use capture_loop::{CaptureLoop, FrameDisplay, FramePipeline, LoopState, LoopStats, TickOutcome};
pub use classifier::{BehaviorClass, BehaviorClassifier, Classification, OnnxBehaviorClassifier, StubBehaviorClassifier};
pub use config::{CameraSettings, DmsConfig};
pub use detector::{FaceBbox, FaceDetector, OnnxFaceDetector, StubFaceDetector};
pub use overlay::{DrawOp, OverlayRenderer};
pub use policy::{AlertDirective, AlertPolicy, RgbColor};
pub use preprocess::{FramePreprocessor, InputTensor};

use thiserror::Error;

/// DMS error types
#[derive(Error, Debug)]
pub enum DmsError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Image processing failed: {0}")]
    ImageProcessing(String),

    #[error("Display failed: {0}")]
    Display(String),
}
