use anyhow::Result;
use std::path::Path;

use super::{capture_manifest_step, display_path, AppState};
use crate::{manifest::EnvironmentManifest, report::CommandReport};

pub fn run(state: &AppState, output_path: &Path) -> Result<CommandReport> {
    let mut report = state.report("init");
    report.line("Initializing GapWatch...");

    let manifest = EnvironmentManifest::from_settings(&state.settings.python);
    if let Some(capture) = capture_manifest_step(&mut report, &manifest, output_path) {
        report.line(format!("Manifest created at {}", display_path(&capture.path)));
        report.insert("manifest_path", &capture.path)?;
        report.insert("manifest", &capture.document)?;
    }

    Ok(report)
}
