//! Driver Monitor - Main Entry Point

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use driver_monitor::display::ConsoleDisplay;
use driver_monitor::{build_capture_loop, build_pipeline, gui, init_logging, load_config};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// TOML configuration file.
    #[arg(long, env = "DMS_CONFIG")]
    config: Option<PathBuf>,
    /// Log analyses to the console instead of opening a window.
    #[arg(long)]
    headless: bool,
    /// Stop after this many rendered frames (headless only).
    #[arg(long, value_name = "N")]
    max_frames: Option<u64>,
    /// Capture device, overrides `camera.device`.
    #[arg(long)]
    device: Option<String>,
    /// Behavior model, overrides `model_path`.
    #[arg(long)]
    model: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;
    if let Some(device) = args.device {
        config.camera.device = device;
    }
    if let Some(model) = args.model {
        config.model_path = model;
    }

    init_logging(&config.log_level)?;
    info!("=== Driver Monitor v{} ===", env!("CARGO_PKG_VERSION"));

    let pipeline = build_pipeline(&config)?;
    let mut capture = build_capture_loop(&config, pipeline)?;

    let stats = if args.headless {
        let mut display = ConsoleDisplay::new(args.max_frames);
        capture.run(&mut display)?
    } else {
        let size = [config.camera.width as f32, config.camera.height as f32];
        let session = gui::run_window(&config.window_title, size, config.quit_key, capture)?;
        if let Some(e) = session.error {
            return Err(e.into());
        }
        session.stats
    };

    info!(
        "Done: {} frames, {} skipped, {} alerts",
        stats.rendered, stats.skipped, stats.alerts
    );
    Ok(())
}
