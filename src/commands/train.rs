use anyhow::Result;

use super::{open_run_store, AppState};
use crate::{
    db::Database,
    energy::meter_from_settings,
    manifest::EnvironmentManifest,
    report::{energy_lines, CommandReport},
    training::{
        PythonScript, RunController, RunOutcome, RunRequest, SimulatedWorkload, Workload,
    },
};

pub fn run(
    state: &AppState,
    script: String,
    epochs: u32,
    tokens: Option<u64>,
    simulate_secs: Option<f64>,
) -> Result<CommandReport> {
    let mut report = state.report("train");
    report.line(format!(
        "Starting GapWatch training monitoring for script: {script}"
    ));
    report.line(format!("Epochs: {epochs}"));

    let request = RunRequest {
        script,
        epochs,
        work_units: tokens,
        replay_of: None,
    };
    let db = open_run_store(&state.settings, &mut report)?;
    let outcome = execute_run(state, &mut report, &db, request, simulate_secs)?;

    report.line(format!("Run ID: {}", outcome.run.id));
    report.line("Training monitoring complete.");
    report.insert("run", &outcome.run)?;
    Ok(report)
}

/// Shared by `train` and `replay`: runs the workload under the controller
/// and records the manifest and training steps.
pub(super) fn execute_run(
    state: &AppState,
    report: &mut CommandReport,
    db: &Database,
    request: RunRequest,
    simulate_secs: Option<f64>,
) -> Result<RunOutcome> {
    let settings = &state.settings;
    let manifest = EnvironmentManifest::from_settings(&settings.python);
    let controller = RunController::new(db, &manifest, settings.storage.runs_dir());
    let mut meter = meter_from_settings(&settings.energy);

    let workload: Box<dyn Workload> = match simulate_secs {
        Some(secs) => Box::new(SimulatedWorkload::from_secs(secs)),
        None => Box::new(PythonScript {
            interpreter: settings.python.interpreter.clone(),
            script: request.script.clone(),
            epochs: request.epochs,
            quiet_stdout: state.json,
        }),
    };

    report.line(format!("Executing training script: {} ...", workload.describe()));
    let outcome = controller.execute(request, workload.as_ref(), &mut meter)?;

    match &outcome.manifest_error {
        Some(err) => report.fail("manifest", err.clone()),
        None if outcome.manifest_warnings.is_empty() => report.ok("manifest"),
        None => report.warn("manifest", outcome.manifest_warnings.join("; ")),
    }

    match (&outcome.launch_error, outcome.exit) {
        (Some(err), _) => report.fail("training", err.clone()),
        (None, Some(exit)) if exit.success => {
            report.line("Training script finished.");
            report.ok("training");
        }
        (None, exit) => {
            let code = exit
                .and_then(|e| e.code)
                .map(|c| c.to_string())
                .unwrap_or_else(|| "none (terminated by signal)".into());
            report.fail("training", format!("script exited with code {code}"));
        }
    }

    let per_unit_label = outcome.run.work_units.map(|_| "token");
    for line in energy_lines("Energy Report", &outcome.run.usage(), per_unit_label) {
        report.line(line);
    }

    Ok(outcome)
}
