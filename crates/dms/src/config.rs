//! DMS configuration

use camera_capture::CameraConfig;
use serde::{Deserialize, Serialize};

use crate::classifier::BehaviorClass;
use crate::DmsError;

/// Capture device settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Device path, `/dev/video0` is the default system camera
    pub device: String,
    /// Requested width (advisory)
    pub width: u32,
    /// Requested height (advisory)
    pub height: u32,
    /// Requested frame rate, 0 keeps the device default
    pub fps: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        let camera = CameraConfig::default();
        Self {
            device: camera.device,
            width: camera.width,
            height: camera.height,
            fps: camera.fps,
        }
    }
}

impl From<&CameraSettings> for CameraConfig {
    fn from(settings: &CameraSettings) -> Self {
        CameraConfig {
            device: settings.device.clone(),
            width: settings.width,
            height: settings.height,
            fps: settings.fps,
        }
    }
}

/// DMS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DmsConfig {
    /// Behavior classifier (ONNX export of the trained network)
    pub model_path: String,

    /// Face detection model; the mock detector is used when unset
    pub face_model_path: Option<String>,

    /// Classifier input width
    pub input_width: u32,

    /// Classifier input height
    pub input_height: u32,

    /// Face detection confidence threshold
    pub face_confidence: f32,

    /// IoU above which overlapping face boxes are suppressed
    pub nms_iou: f32,

    /// Classifier confidence an alert class must exceed to raise the banner
    pub alert_threshold: f32,

    /// Classes that raise the alert banner
    pub alert_classes: Vec<BehaviorClass>,

    /// TrueType font for overlay text; the bundled DejaVu Sans when unset
    pub font_path: Option<String>,

    /// Display window title
    pub window_title: String,

    /// Key that stops the capture loop
    pub quit_key: char,

    /// Log level filter (trace, debug, info, warn, error)
    pub log_level: String,

    /// Capture device
    pub camera: CameraSettings,
}

impl Default for DmsConfig {
    fn default() -> Self {
        Self {
            model_path: "driver_behavior_model_optimized.onnx".to_string(),
            face_model_path: None,
            input_width: 224,
            input_height: 224,
            face_confidence: 0.5,
            nms_iou: 0.3,
            alert_threshold: 0.7,
            alert_classes: BehaviorClass::ALL
                .into_iter()
                .filter(|class| !class.is_safe())
                .collect(),
            font_path: None,
            window_title: "Driver Inattention Detection".to_string(),
            quit_key: 'q',
            log_level: "info".to_string(),
            camera: CameraSettings::default(),
        }
    }
}

impl DmsConfig {
    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), DmsError> {
        if self.input_width == 0 || self.input_height == 0 {
            return Err(DmsError::Config(format!(
                "input size {}x{} must be non-zero",
                self.input_width, self.input_height
            )));
        }
        for (name, value) in [
            ("face_confidence", self.face_confidence),
            ("nms_iou", self.nms_iou),
            ("alert_threshold", self.alert_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(DmsError::Config(format!("{} {} outside [0, 1]", name, value)));
            }
        }
        if self.model_path.is_empty() {
            return Err(DmsError::Config("model_path is empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DmsConfig::default();
        assert_eq!((config.input_width, config.input_height), (224, 224));
        assert_eq!(config.alert_threshold, 0.7);
        assert_eq!(config.face_confidence, 0.5);
        assert_eq!(config.alert_classes.len(), 5);
        assert!(!config.alert_classes.contains(&BehaviorClass::SafeDriving));
        assert_eq!(config.camera.device, "/dev/video0");
        assert_eq!((config.camera.width, config.camera.height), (640, 480));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let config = DmsConfig {
            alert_threshold: 1.5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(DmsError::Config(_))));
    }

    #[test]
    fn test_partial_deserialize_keeps_defaults() {
        let config: DmsConfig =
            serde_json::from_str(r#"{"alert_threshold": 0.8, "camera": {"device": "stub://synthetic"}}"#).unwrap();
        assert_eq!(config.alert_threshold, 0.8);
        assert_eq!(config.camera.device, "stub://synthetic");
        assert_eq!(config.camera.width, 640);
        assert_eq!(config.input_width, 224);
    }
}
