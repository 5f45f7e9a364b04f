//! Command handlers.
//!
//! Each handler orchestrates the components for one subcommand and returns
//! a [`CommandReport`]; the caller prints it and derives the exit code.
//!
//! ## Files
//! - `init.rs`: manifest capture.
//! - `train.rs`: monitored training run.
//! - `replay.rs`: drift check and re-execution of a recorded run.
//! - `ci.rs`: manifest, metered task, EdgeGuard and PR notification.

mod ci;
mod init;
mod replay;
mod train;

use anyhow::Result;
use chrono::Utc;
use std::path::Path;

use crate::{
    cli::Commands,
    db::Database,
    manifest::{CaptureReport, EnvironmentManifest},
    notify::CiContext,
    report::CommandReport,
    settings::Settings,
};

/// Everything read from the outside world at startup.
pub struct AppState {
    pub settings: Settings,
    pub ci: CiContext,
    pub json: bool,
}

impl AppState {
    pub fn report(&self, command: &str) -> CommandReport {
        CommandReport::new(command).streaming(!self.json)
    }
}

pub fn dispatch(command: Commands, state: &AppState) -> Result<CommandReport> {
    match command {
        Commands::Init { output_path } => init::run(state, &output_path),
        Commands::Train {
            script,
            epochs,
            tokens,
            simulate_secs,
        } => train::run(state, script, epochs, tokens, simulate_secs),
        Commands::Replay {
            run_id,
            dry_run,
            simulate_secs,
        } => replay::run(state, &run_id, dry_run, simulate_secs),
        Commands::Ci {
            quantize,
            threshold,
            notify,
            command,
        } => ci::run(state, quantize, threshold, notify, command),
    }
}

/// Captures the manifest as the `manifest` step. Probe failures are
/// warnings; a failed write fails the step.
fn capture_manifest_step(
    report: &mut CommandReport,
    manifest: &EnvironmentManifest,
    output_path: &Path,
) -> Option<CaptureReport> {
    match manifest.capture(output_path) {
        Ok(capture) => {
            if capture.warnings.is_empty() {
                report.ok("manifest");
            } else {
                report.warn("manifest", capture.warnings.join("; "));
            }
            Some(capture)
        }
        Err(err) => {
            report.fail("manifest", format!("{err:#}"));
            None
        }
    }
}

/// Opens the run store and marks runs a crashed process left running.
fn open_run_store(settings: &Settings, report: &mut CommandReport) -> Result<Database> {
    let db = Database::new(settings.storage.database_path())?;
    let recovered = db.mark_incomplete_runs_interrupted(Utc::now())?;
    if recovered > 0 {
        report.warn(
            "recovery",
            format!("marked {recovered} unfinished run(s) as interrupted"),
        );
    }
    Ok(db)
}

/// Absolute form of `path` for display, relative to the working directory.
fn display_path(path: &Path) -> String {
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}
