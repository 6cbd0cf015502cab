//! Per-frame analysis result

use serde::{Deserialize, Serialize};

use crate::classifier::Classification;
use crate::detector::FaceBbox;
use crate::policy::AlertDirective;

/// Everything decided about one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameAnalysis {
    /// Frame sequence number
    pub sequence: u32,

    /// Detected faces, possibly none
    pub faces: Vec<FaceBbox>,

    /// Top-1 behavior classification
    pub classification: Classification,

    /// Rendering directive
    pub directive: AlertDirective,
}

impl FrameAnalysis {
    pub fn face_detected(&self) -> bool {
        !self.faces.is_empty()
    }

    /// Overlay label, e.g. `Drinking (71.0%)`
    pub fn label_text(&self) -> String {
        format!(
            "{} ({:.1}%)",
            self.classification.label,
            self.classification.confidence * 100.0
        )
    }
}
