//! Driver Monitor - application wiring
//!
//! Loads configuration, initializes logging and assembles the capture loop
//! from the `dms` building blocks.

pub mod display;
pub mod gui;

use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use camera_capture::{open_source, CameraConfig};
use config::{Config, Environment, File};
use dms::{
    AlertPolicy, CaptureLoop, DmsConfig, FaceDetector, FramePipeline, FramePreprocessor,
    OnnxBehaviorClassifier, OnnxFaceDetector, OverlayRenderer, StubFaceDetector,
};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Initialize logging at the given level, falling back to INFO
pub fn init_logging(level: &str) -> Result<()> {
    let max_level = level.parse::<Level>().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(max_level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow!("Failed to set tracing subscriber: {}", e))?;

    if max_level == Level::INFO && !level.eq_ignore_ascii_case("info") {
        warn!("Unknown log level `{}`, using info", level);
    }
    Ok(())
}

/// Load configuration from the process environment.
///
/// Layers, lowest precedence first: built-in defaults, the optional TOML
/// file, then `DMS_*` environment variables (`__` separates nested keys,
/// e.g. `DMS_CAMERA__DEVICE`).
pub fn load_config(path: Option<&Path>) -> Result<DmsConfig> {
    load_config_with_env(path, None)
}

/// [`load_config`] with an explicit environment map instead of the process one
pub fn load_config_with_env(
    path: Option<&Path>,
    env: Option<HashMap<String, String>>,
) -> Result<DmsConfig> {
    let defaults = Config::try_from(&DmsConfig::default()).context("Invalid default configuration")?;

    let mut builder = Config::builder().add_source(defaults);
    if let Some(path) = path {
        builder = builder.add_source(File::from(path).required(true));
    }
    builder = builder.add_source(
        Environment::with_prefix("DMS")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .source(env),
    );

    let config: DmsConfig = builder
        .build()
        .context("Failed to load configuration")?
        .try_deserialize()
        .context("Failed to parse configuration")?;
    config.validate()?;
    Ok(config)
}

/// Face detector from the configured model, or a fixed centered face when none is set
pub fn build_face_detector(config: &DmsConfig) -> Result<Box<dyn FaceDetector>> {
    match &config.face_model_path {
        Some(path) => {
            let detector = OnnxFaceDetector::new(path, config.face_confidence, config.nms_iou)?;
            Ok(Box::new(detector))
        }
        None => {
            warn!("No face model configured, using mock face detector");
            Ok(Box::new(StubFaceDetector::centered()))
        }
    }
}

/// Overlay renderer using the configured font, or the bundled one
pub fn build_renderer(config: &DmsConfig) -> Result<OverlayRenderer> {
    match &config.font_path {
        Some(path) => Ok(OverlayRenderer::from_font_file(path)?),
        None => Ok(OverlayRenderer::bundled()?),
    }
}

/// Load the models once and build the per-frame pipeline
pub fn build_pipeline(config: &DmsConfig) -> Result<FramePipeline> {
    let classifier = OnnxBehaviorClassifier::new(
        &config.model_path,
        config.input_width,
        config.input_height,
    )
    .with_context(|| format!("Cannot load behavior model {}", config.model_path))?;

    Ok(FramePipeline::new(
        build_face_detector(config)?,
        Box::new(classifier),
        FramePreprocessor::new(config.input_width, config.input_height),
        AlertPolicy::new(config.alert_threshold, config.alert_classes.clone()),
        build_renderer(config)?,
    ))
}

/// Open the camera and assemble a RUNNING capture loop
pub fn build_capture_loop(config: &DmsConfig, pipeline: FramePipeline) -> Result<CaptureLoop> {
    let camera = CameraConfig::from(&config.camera);
    let source = open_source(&camera).with_context(|| format!("Cannot open camera {}", camera.device))?;
    info!("Camera {} opened", source.describe());
    Ok(CaptureLoop::new(source, pipeline))
}
