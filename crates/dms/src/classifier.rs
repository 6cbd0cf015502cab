//! Behavior classification

use std::fmt;
use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tract_onnx::prelude::*;
use tracing::{debug, info};

use crate::preprocess::InputTensor;
use crate::DmsError;

/// Driver behavior classes, in model output order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BehaviorClass {
    DangerousDriving,
    Distracted,
    Drinking,
    SafeDriving,
    SleepyDriving,
    Yawn,
}

impl BehaviorClass {
    /// All classes, indexed by model output position
    pub const ALL: [BehaviorClass; 6] = [
        BehaviorClass::DangerousDriving,
        BehaviorClass::Distracted,
        BehaviorClass::Drinking,
        BehaviorClass::SafeDriving,
        BehaviorClass::SleepyDriving,
        BehaviorClass::Yawn,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Label as used in the training set
    pub fn as_str(&self) -> &'static str {
        match self {
            BehaviorClass::DangerousDriving => "DangerousDriving",
            BehaviorClass::Distracted => "Distracted",
            BehaviorClass::Drinking => "Drinking",
            BehaviorClass::SafeDriving => "SafeDriving",
            BehaviorClass::SleepyDriving => "SleepyDriving",
            BehaviorClass::Yawn => "Yawn",
        }
    }

    pub fn is_safe(&self) -> bool {
        *self == BehaviorClass::SafeDriving
    }
}

impl fmt::Display for BehaviorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-1 classification of one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: BehaviorClass,
    /// Probability of `label` (0.0 to 1.0)
    pub confidence: f32,
    /// Inference latency in milliseconds
    pub latency_ms: u64,
}

impl Classification {
    pub fn new(label: BehaviorClass, confidence: f32) -> Self {
        Self {
            label,
            confidence,
            latency_ms: 0,
        }
    }
}

/// Single-label image classifier over [`BehaviorClass`]
pub trait BehaviorClassifier {
    fn classify(&self, input: &InputTensor) -> Result<Classification, DmsError>;
}

/// Pick the most probable class from a probability vector.
///
/// Ties resolve to the lowest index.
pub fn top1(probabilities: &[f32]) -> Result<Classification, DmsError> {
    if probabilities.len() != BehaviorClass::ALL.len() {
        return Err(DmsError::Inference(format!(
            "expected {} class probabilities, got {}",
            BehaviorClass::ALL.len(),
            probabilities.len()
        )));
    }

    let mut best = 0;
    for (i, p) in probabilities.iter().enumerate() {
        if *p > probabilities[best] {
            best = i;
        }
    }

    let label = BehaviorClass::from_index(best)
        .ok_or_else(|| DmsError::Inference(format!("class index {} out of range", best)))?;
    Ok(Classification::new(label, probabilities[best]))
}

/// Behavior classifier running an ONNX export of the trained network
pub struct OnnxBehaviorClassifier {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>,
    input_shape: [usize; 4],
}

impl OnnxBehaviorClassifier {
    /// Load the model once; it is reused for every frame
    pub fn new(path: impl AsRef<Path>, width: u32, height: u32) -> Result<Self, DmsError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(DmsError::ModelLoad(format!(
                "model file not found: {}",
                path.display()
            )));
        }

        info!("Loading behavior model from {}", path.display());
        let input_shape = [1, height as usize, width as usize, 3];
        let model = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|model| model.with_input_fact(0, f32::fact(input_shape).into()))
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|e| DmsError::ModelLoad(e.to_string()))?;
        info!("Behavior model loaded");

        Ok(Self { model, input_shape })
    }
}

impl BehaviorClassifier for OnnxBehaviorClassifier {
    fn classify(&self, input: &InputTensor) -> Result<Classification, DmsError> {
        let start = Instant::now();

        if input.shape() != &self.input_shape[..] {
            return Err(DmsError::Inference(format!(
                "Invalid input shape: expected {:?}, got {:?}",
                self.input_shape,
                input.shape()
            )));
        }
        let values = input
            .as_slice()
            .ok_or_else(|| DmsError::Inference("input tensor is not contiguous".into()))?;
        let tensor = Tensor::from_shape(&self.input_shape, values)
            .map_err(|e| DmsError::Inference(e.to_string()))?;

        let outputs = self
            .model
            .run(tvec!(tensor.into()))
            .map_err(|e| DmsError::Inference(e.to_string()))?;
        let output = outputs
            .first()
            .ok_or_else(|| DmsError::Inference("model produced no outputs".into()))?;
        let probabilities: Vec<f32> = output
            .to_array_view::<f32>()
            .map_err(|e| DmsError::Inference(e.to_string()))?
            .iter()
            .copied()
            .collect();

        let mut classification = top1(&probabilities)?;
        classification.latency_ms = start.elapsed().as_millis() as u64;
        debug!(
            "Classified {} ({:.3}) in {}ms",
            classification.label, classification.confidence, classification.latency_ms
        );
        Ok(classification)
    }
}

/// Classifier returning a canned result for every frame
#[derive(Debug, Clone)]
pub struct StubBehaviorClassifier {
    result: Classification,
}

impl StubBehaviorClassifier {
    pub fn new(label: BehaviorClass, confidence: f32) -> Self {
        Self {
            result: Classification::new(label, confidence),
        }
    }
}

impl BehaviorClassifier for StubBehaviorClassifier {
    fn classify(&self, _input: &InputTensor) -> Result<Classification, DmsError> {
        Ok(self.result)
    }
}
