//! Alert policy

use serde::{Deserialize, Serialize};

use crate::classifier::BehaviorClass;

/// 8-bit RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RgbColor {
    pub const GREEN: RgbColor = RgbColor::new(0, 255, 0);
    pub const RED: RgbColor = RgbColor::new(255, 0, 0);
    pub const YELLOW: RgbColor = RgbColor::new(255, 255, 0);
    pub const LIGHT_GRAY: RgbColor = RgbColor::new(224, 224, 224);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// What the renderer should draw for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertDirective {
    /// No face was detected in the frame
    pub face_missing_warning: bool,
    /// Full-frame border and "ALERT!" text
    pub alert_banner: bool,
    /// Color of the classification label
    pub color: RgbColor,
}

/// Maps a frame's classification and face presence to an [`AlertDirective`].
///
/// Stateless: the same inputs always give the same directive.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertPolicy {
    threshold: f32,
    alert_classes: Vec<BehaviorClass>,
}

impl AlertPolicy {
    pub fn new(threshold: f32, alert_classes: Vec<BehaviorClass>) -> Self {
        Self {
            threshold,
            alert_classes,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn is_alert_class(&self, label: BehaviorClass) -> bool {
        self.alert_classes.contains(&label)
    }

    /// Decide the directive for one frame.
    ///
    /// The banner needs an alert class with confidence strictly above the
    /// threshold; the face warning depends only on `face_detected`.
    pub fn decide(&self, label: BehaviorClass, confidence: f32, face_detected: bool) -> AlertDirective {
        let color = if label.is_safe() {
            RgbColor::GREEN
        } else {
            RgbColor::RED
        };

        AlertDirective {
            face_missing_warning: !face_detected,
            alert_banner: self.is_alert_class(label) && confidence > self.threshold,
            color,
        }
    }
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self::new(
            0.7,
            vec![
                BehaviorClass::DangerousDriving,
                BehaviorClass::Distracted,
                BehaviorClass::Drinking,
                BehaviorClass::SleepyDriving,
                BehaviorClass::Yawn,
            ],
        )
    }
}
