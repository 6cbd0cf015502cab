//! Capture loop: acquire, detect, classify, decide, render, display

use camera_capture::{FrameSource, VideoFrame};
use tracing::{debug, info, warn};

use crate::analysis::FrameAnalysis;
use crate::classifier::BehaviorClassifier;
use crate::detector::FaceDetector;
use crate::overlay::OverlayRenderer;
use crate::policy::AlertPolicy;
use crate::preprocess::FramePreprocessor;
use crate::DmsError;

/// Loop lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Stopped,
}

/// Result of one loop iteration
#[derive(Debug)]
pub enum TickOutcome {
    /// A frame was processed and drawn on
    Rendered {
        frame: VideoFrame,
        analysis: FrameAnalysis,
    },
    /// The read failed; nothing was processed this tick
    Skipped,
    /// The loop is stopped
    Stopped,
}

/// Counters over the loop's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub rendered: u64,
    pub skipped: u64,
    pub alerts: u64,
}

/// Sink for rendered frames and source of the quit signal
pub trait FrameDisplay {
    fn show(&mut self, frame: &VideoFrame, analysis: &FrameAnalysis) -> Result<(), DmsError>;

    /// Polled once per iteration
    fn quit_requested(&mut self) -> bool;
}

/// Per-frame processing with the loaded models
pub struct FramePipeline {
    face_detector: Box<dyn FaceDetector>,
    classifier: Box<dyn BehaviorClassifier>,
    preprocessor: FramePreprocessor,
    policy: AlertPolicy,
    renderer: OverlayRenderer,
}

impl FramePipeline {
    pub fn new(
        face_detector: Box<dyn FaceDetector>,
        classifier: Box<dyn BehaviorClassifier>,
        preprocessor: FramePreprocessor,
        policy: AlertPolicy,
        renderer: OverlayRenderer,
    ) -> Self {
        Self {
            face_detector,
            classifier,
            preprocessor,
            policy,
            renderer,
        }
    }

    /// Analyze one frame and draw the overlays onto it.
    ///
    /// Classification runs whether or not a face was found.
    pub fn process(&self, frame: &mut VideoFrame) -> Result<FrameAnalysis, DmsError> {
        let faces = self.face_detector.detect(frame)?;

        let input = self.preprocessor.preprocess(frame)?;
        let classification = self.classifier.classify(&input)?;

        let directive = self.policy.decide(
            classification.label,
            classification.confidence,
            !faces.is_empty(),
        );

        let analysis = FrameAnalysis {
            sequence: frame.sequence,
            faces,
            classification,
            directive,
        };
        self.renderer.render(frame, &analysis)?;

        debug!(
            "Frame {}: {} faces={} banner={}",
            analysis.sequence,
            analysis.label_text(),
            analysis.faces.len(),
            analysis.directive.alert_banner
        );
        Ok(analysis)
    }
}

/// Single-threaded capture loop owning the camera and the models
pub struct CaptureLoop {
    source: Box<dyn FrameSource>,
    pipeline: FramePipeline,
    state: LoopState,
    stats: LoopStats,
}

impl CaptureLoop {
    /// Start RUNNING with an opened source and loaded models
    pub fn new(source: Box<dyn FrameSource>, pipeline: FramePipeline) -> Self {
        info!("Capture loop started on {}", source.describe());
        Self {
            source,
            pipeline,
            state: LoopState::Running,
            stats: LoopStats::default(),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Stop on user request
    pub fn stop(&mut self) {
        if self.state == LoopState::Running {
            info!("Capture loop stopped by user");
            self.state = LoopState::Stopped;
        }
    }

    /// Run one iteration.
    ///
    /// Read failures skip the tick; exhaustion stops the loop. Pipeline
    /// errors are returned to the caller.
    pub fn tick(&mut self) -> Result<TickOutcome, DmsError> {
        if self.state == LoopState::Stopped {
            return Ok(TickOutcome::Stopped);
        }

        match self.source.read_frame() {
            Ok(Some(mut frame)) => {
                let analysis = self.pipeline.process(&mut frame)?;
                self.stats.rendered += 1;
                if analysis.directive.alert_banner {
                    self.stats.alerts += 1;
                }
                Ok(TickOutcome::Rendered { frame, analysis })
            }
            Ok(None) => {
                info!("Camera {} exhausted", self.source.describe());
                self.state = LoopState::Stopped;
                Ok(TickOutcome::Stopped)
            }
            Err(e) => {
                warn!("Ignoring empty camera frame: {}", e);
                self.stats.skipped += 1;
                Ok(TickOutcome::Skipped)
            }
        }
    }

    /// Tick until the source is exhausted or the display asks to quit
    pub fn run(&mut self, display: &mut dyn FrameDisplay) -> Result<LoopStats, DmsError> {
        while self.state == LoopState::Running {
            match self.tick()? {
                TickOutcome::Rendered { frame, analysis } => display.show(&frame, &analysis)?,
                TickOutcome::Skipped => {}
                TickOutcome::Stopped => break,
            }

            if display.quit_requested() {
                self.stop();
            }
        }

        info!(
            "Processed {} frames ({} skipped, {} alerts)",
            self.stats.rendered, self.stats.skipped, self.stats.alerts
        );
        Ok(self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{BehaviorClass, Classification, StubBehaviorClassifier};
    use crate::detector::StubFaceDetector;
    use crate::preprocess::InputTensor;
    use camera_capture::{CameraError, PixelFormat};
    use std::cell::Cell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    /// Replays a fixed sequence of reads, then reports exhaustion
    struct ScriptedSource {
        reads: VecDeque<Result<Option<VideoFrame>, CameraError>>,
    }

    impl ScriptedSource {
        fn new(reads: Vec<Result<Option<VideoFrame>, CameraError>>) -> Box<Self> {
            Box::new(Self {
                reads: reads.into(),
            })
        }
    }

    impl FrameSource for ScriptedSource {
        fn read_frame(&mut self) -> Result<Option<VideoFrame>, CameraError> {
            self.reads.pop_front().unwrap_or(Ok(None))
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    struct CountingClassifier {
        calls: Rc<Cell<u32>>,
        result: Classification,
    }

    impl BehaviorClassifier for CountingClassifier {
        fn classify(&self, _input: &InputTensor) -> Result<Classification, DmsError> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.result)
        }
    }

    #[derive(Default)]
    struct RecordingDisplay {
        shown: Vec<FrameAnalysis>,
        quit_after: Option<usize>,
    }

    impl FrameDisplay for RecordingDisplay {
        fn show(&mut self, _frame: &VideoFrame, analysis: &FrameAnalysis) -> Result<(), DmsError> {
            self.shown.push(analysis.clone());
            Ok(())
        }

        fn quit_requested(&mut self) -> bool {
            self.quit_after.is_some_and(|n| self.shown.len() >= n)
        }
    }

    fn frame(sequence: u32) -> VideoFrame {
        let mut frame = VideoFrame::filled(64, 48, PixelFormat::Rgb24, [40, 80, 120]);
        frame.sequence = sequence;
        frame
    }

    fn pipeline(faces: StubFaceDetector, label: BehaviorClass, confidence: f32) -> FramePipeline {
        FramePipeline::new(
            Box::new(faces),
            Box::new(StubBehaviorClassifier::new(label, confidence)),
            FramePreprocessor::default(),
            AlertPolicy::default(),
            OverlayRenderer::without_text(),
        )
    }

    #[test]
    fn test_runs_until_exhausted() {
        let source = ScriptedSource::new(vec![Ok(Some(frame(0))), Ok(Some(frame(1))), Ok(None)]);
        let mut capture = CaptureLoop::new(
            source,
            pipeline(StubFaceDetector::centered(), BehaviorClass::SafeDriving, 0.9),
        );
        let mut display = RecordingDisplay::default();

        let stats = capture.run(&mut display).unwrap();

        assert_eq!(capture.state(), LoopState::Stopped);
        assert_eq!(stats.rendered, 2);
        assert_eq!(display.shown.len(), 2);
        assert_eq!(display.shown[1].sequence, 1);
        assert!(display.shown.iter().all(|a| !a.directive.face_missing_warning));
    }

    #[test]
    fn test_read_failures_are_skipped() {
        let source = ScriptedSource::new(vec![
            Err(CameraError::Timeout),
            Ok(Some(frame(0))),
            Err(CameraError::Stream("glitch".into())),
            Ok(Some(frame(1))),
        ]);
        let mut capture = CaptureLoop::new(
            source,
            pipeline(StubFaceDetector::centered(), BehaviorClass::Drinking, 0.95),
        );
        let mut display = RecordingDisplay::default();

        let stats = capture.run(&mut display).unwrap();

        assert_eq!(stats, LoopStats { rendered: 2, skipped: 2, alerts: 2 });
        assert_eq!(display.shown.len(), 2);
    }

    #[test]
    fn test_quit_request_stops_loop() {
        let source = ScriptedSource::new((0..10).map(|i| Ok(Some(frame(i)))).collect());
        let mut capture = CaptureLoop::new(
            source,
            pipeline(StubFaceDetector::centered(), BehaviorClass::SafeDriving, 0.9),
        );
        let mut display = RecordingDisplay {
            quit_after: Some(3),
            ..Default::default()
        };

        let stats = capture.run(&mut display).unwrap();

        assert_eq!(stats.rendered, 3);
        assert_eq!(capture.state(), LoopState::Stopped);
        assert!(matches!(capture.tick().unwrap(), TickOutcome::Stopped));
    }

    #[test]
    fn test_classifies_without_face() {
        let calls = Rc::new(Cell::new(0));
        let classifier = CountingClassifier {
            calls: calls.clone(),
            result: Classification::new(BehaviorClass::Yawn, 0.8),
        };
        let pipeline = FramePipeline::new(
            Box::new(StubFaceDetector::none()),
            Box::new(classifier),
            FramePreprocessor::default(),
            AlertPolicy::default(),
            OverlayRenderer::without_text(),
        );
        let mut capture = CaptureLoop::new(ScriptedSource::new(vec![Ok(Some(frame(0)))]), pipeline);

        match capture.tick().unwrap() {
            TickOutcome::Rendered { analysis, .. } => {
                assert!(!analysis.face_detected());
                assert!(analysis.directive.face_missing_warning);
                assert!(analysis.directive.alert_banner);
                assert_eq!(analysis.classification.label, BehaviorClass::Yawn);
            }
            other => panic!("expected a rendered frame, got {:?}", other),
        }
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_frames_are_independent() {
        let source = ScriptedSource::new(vec![Ok(Some(frame(0))), Ok(Some(frame(1)))]);
        let mut capture = CaptureLoop::new(
            source,
            pipeline(StubFaceDetector::none(), BehaviorClass::Distracted, 0.75),
        );
        let mut display = RecordingDisplay::default();
        capture.run(&mut display).unwrap();

        let first = &display.shown[0];
        let second = &display.shown[1];
        assert_eq!(first.directive, second.directive);
        assert_eq!(first.classification, second.classification);
    }

    #[test]
    fn test_rendered_frame_carries_overlay() {
        let source = ScriptedSource::new(vec![Ok(Some(frame(0)))]);
        let mut capture = CaptureLoop::new(
            source,
            pipeline(StubFaceDetector::centered(), BehaviorClass::Drinking, 0.9),
        );

        match capture.tick().unwrap() {
            TickOutcome::Rendered { frame, .. } => {
                assert_eq!(frame.get_pixel(0, 0), Some([255, 0, 0]));
            }
            other => panic!("expected a rendered frame, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_frame_is_fatal() {
        let bad = VideoFrame::new(vec![0; 10], 64, 48, 0, 0);
        let mut capture = CaptureLoop::new(
            ScriptedSource::new(vec![Ok(Some(bad))]),
            pipeline(StubFaceDetector::none(), BehaviorClass::SafeDriving, 0.9),
        );

        assert!(matches!(capture.tick(), Err(DmsError::InvalidFrame(_))));
    }
}
