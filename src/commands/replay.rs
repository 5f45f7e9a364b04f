use anyhow::Result;
use serde::Serialize;
use std::path::Path;

use super::{open_run_store, train::execute_run, AppState};
use crate::{
    manifest::{package_drift, EnvironmentManifest, ManifestDocument, PackageDrift},
    report::CommandReport,
    training::RunRequest,
};

#[derive(Debug, Serialize)]
struct ValueChange {
    recorded: String,
    current: String,
}

/// Differences between the recorded environment and the current one.
#[derive(Debug, Default, Serialize)]
struct EnvironmentDrift {
    python_version: Option<ValueChange>,
    platform: Option<ValueChange>,
    /// `None` when either package list could not be read.
    packages: Option<PackageDrift>,
}

impl EnvironmentDrift {
    fn is_empty(&self) -> bool {
        self.python_version.is_none()
            && self.platform.is_none()
            && self.packages.as_ref().map_or(true, PackageDrift::is_empty)
    }

    fn summary(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(change) = &self.python_version {
            lines.push(format!(
                "interpreter: {} -> {}",
                change.recorded, change.current
            ));
        }
        if let Some(change) = &self.platform {
            lines.push(format!("platform: {} -> {}", change.recorded, change.current));
        }
        if let Some(packages) = &self.packages {
            lines.extend(packages.added.iter().map(|p| format!("added: {p}")));
            lines.extend(packages.removed.iter().map(|p| format!("removed: {p}")));
            lines.extend(
                packages
                    .changed
                    .iter()
                    .map(|c| format!("changed: {} -> {}", c.recorded, c.current)),
            );
        }
        lines
    }
}

fn changed(recorded: &str, current: &str) -> Option<ValueChange> {
    (recorded != current).then(|| ValueChange {
        recorded: recorded.to_string(),
        current: current.to_string(),
    })
}

fn compare(recorded: &ManifestDocument, current: &ManifestDocument) -> Option<EnvironmentDrift> {
    let (recorded, current) = (recorded.environment()?, current.environment()?);
    Some(EnvironmentDrift {
        python_version: changed(&recorded.python_version, &current.python_version),
        platform: changed(&recorded.platform, &current.platform),
        packages: package_drift(&recorded.pip_packages, &current.pip_packages),
    })
}

pub fn run(
    state: &AppState,
    run_id: &str,
    dry_run: bool,
    simulate_secs: Option<f64>,
) -> Result<CommandReport> {
    let mut report = state.report("replay");
    report.line(format!("Replaying GapWatch run ID: {run_id}"));

    let db = open_run_store(&state.settings, &mut report)?;
    let Some(original) = db.get_run(run_id)? else {
        report.fail("lookup", format!("unknown run id '{run_id}'"));
        return Ok(report);
    };
    report.ok("lookup");
    report.line(format!(
        "Script: {} (epochs {}, status {})",
        original.script,
        original.epochs,
        original.status.as_str()
    ));
    report.insert("original", &original)?;

    report.line("Fetching manifest for run...");
    match ManifestDocument::load(Path::new(&original.manifest_path)) {
        Ok(recorded) => {
            let manifest = EnvironmentManifest::from_settings(&state.settings.python);
            let (current, _) = manifest.build_document();
            match compare(&recorded, &current) {
                Some(drift) if drift.is_empty() => {
                    report.line("Environment matches the recorded manifest.");
                    report.ok("drift");
                    report.insert("drift", &drift)?;
                }
                Some(drift) => {
                    let summary = drift.summary();
                    report.line("Environment differs from the recorded manifest:");
                    for line in &summary {
                        report.line(format!("  {line}"));
                    }
                    report.warn(
                        "drift",
                        format!("{} difference(s) from the recorded environment", summary.len()),
                    );
                    report.insert("drift", &drift)?;
                }
                None => report.warn("drift", "manifest has no environment node"),
            }
        }
        Err(err) => report.warn("drift", format!("recorded manifest unavailable: {err:#}")),
    }

    if dry_run {
        report.line("Dry run: not re-executing.");
        return Ok(report);
    }

    report.line("Re-executing script...");
    let request = RunRequest {
        script: original.script.clone(),
        epochs: original.epochs,
        work_units: original.work_units,
        replay_of: Some(original.id.clone()),
    };
    let outcome = execute_run(state, &mut report, &db, request, simulate_secs)?;

    report.line(format!(
        "Replay of {} complete as run {}",
        original.id, outcome.run.id
    ));
    report.insert("run", &outcome.run)?;
    Ok(report)
}
