//! Headless display: one log line per analyzed frame

use camera_capture::VideoFrame;
use dms::{DmsError, FrameAnalysis, FrameDisplay};
use tracing::{info, warn};

/// Logs each frame's analysis as JSON instead of drawing a window
#[derive(Debug, Default)]
pub struct ConsoleDisplay {
    max_frames: Option<u64>,
    shown: u64,
}

impl ConsoleDisplay {
    pub fn new(max_frames: Option<u64>) -> Self {
        Self {
            max_frames,
            shown: 0,
        }
    }

    pub fn frames_shown(&self) -> u64 {
        self.shown
    }
}

impl FrameDisplay for ConsoleDisplay {
    fn show(&mut self, _frame: &VideoFrame, analysis: &FrameAnalysis) -> Result<(), DmsError> {
        self.shown += 1;
        let line = serde_json::to_string(analysis).map_err(|e| DmsError::Display(e.to_string()))?;
        if analysis.directive.alert_banner {
            warn!("ALERT {}", line);
        } else {
            info!("{}", line);
        }
        Ok(())
    }

    fn quit_requested(&mut self) -> bool {
        self.max_frames.is_some_and(|max| self.shown >= max)
    }
}
