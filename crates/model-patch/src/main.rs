//! fix-model-json - rename an InputLayer's batch_shape in place

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Result};
use clap::Parser;
use model_patch::{patch_file, PatchOutcome};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Model topology JSON to patch.
    #[arg(default_value = "model.json")]
    path: PathBuf,
}

fn init_logging() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow!("Failed to set tracing subscriber: {}", e))
}

fn main() -> Result<ExitCode> {
    init_logging()?;
    let args = Args::parse();

    match patch_file(&args.path) {
        Ok(PatchOutcome::Renamed) => Ok(ExitCode::SUCCESS),
        Ok(PatchOutcome::Unchanged) => {
            info!("No changes made");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!("{}", e);
            info!("No changes made");
            Ok(ExitCode::FAILURE)
        }
    }
}
