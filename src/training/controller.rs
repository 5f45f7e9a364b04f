use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

use crate::{
    db::{Database, RunRecord, RunStatus},
    energy::EnergyMeter,
    manifest::EnvironmentManifest,
};

use super::workload::{Workload, WorkloadExit};

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub script: String,
    pub epochs: u32,
    pub work_units: Option<u64>,
    pub replay_of: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub run: RunRecord,
    pub exit: Option<WorkloadExit>,
    pub manifest_warnings: Vec<String>,
    /// Set when the manifest could not be written. The run still happens.
    pub manifest_error: Option<String>,
    /// Set when the workload could not be launched at all.
    pub launch_error: Option<String>,
}

/// Drives one monitored run: manifest, run record, meter around the
/// workload, final record.
pub struct RunController<'a> {
    db: &'a Database,
    manifest: &'a EnvironmentManifest,
    runs_dir: PathBuf,
}

impl<'a> RunController<'a> {
    pub fn new(db: &'a Database, manifest: &'a EnvironmentManifest, runs_dir: PathBuf) -> Self {
        Self {
            db,
            manifest,
            runs_dir,
        }
    }

    pub fn execute(
        &self,
        request: RunRequest,
        workload: &dyn Workload,
        meter: &mut EnergyMeter,
    ) -> Result<RunOutcome> {
        let run_id = Uuid::new_v4().to_string();
        let manifest_path = self.runs_dir.join(format!("{run_id}.jsonld"));

        let (manifest_warnings, manifest_error) = match self.manifest.capture(&manifest_path) {
            Ok(report) => (report.warnings, None),
            Err(err) => {
                log::error!("[training] manifest capture for run {run_id} failed: {err:#}");
                (Vec::new(), Some(format!("{err:#}")))
            }
        };

        let started_at = Utc::now();
        let mut run = RunRecord {
            id: run_id.clone(),
            script: request.script,
            epochs: request.epochs,
            work_units: request.work_units,
            status: RunStatus::Running,
            exit_code: None,
            manifest_path: manifest_path.display().to_string(),
            started_at,
            stopped_at: None,
            elapsed_secs: 0.0,
            total_kwh: 0.0,
            co2_emissions_kg: 0.0,
            wh_per_unit: None,
            replay_of: request.replay_of,
            created_at: started_at,
            updated_at: started_at,
        };
        self.db
            .insert_run(&run)
            .with_context(|| format!("failed to record run {run_id}"))?;

        log::info!("[training] run {run_id}: executing {}", workload.describe());
        meter.start();
        let result = workload.run();
        meter.stop();
        let usage = meter.usage(run.work_units);

        let (exit, launch_error) = match result {
            Ok(exit) => (Some(exit), None),
            Err(err) => {
                log::error!("[training] run {run_id}: {err:#}");
                (None, Some(format!("{err:#}")))
            }
        };
        let status = match exit {
            Some(exit) if exit.success => RunStatus::Completed,
            _ => RunStatus::Failed,
        };
        let exit_code = exit.and_then(|e| e.code);
        let stopped_at = meter.session().ended_at.unwrap_or_else(Utc::now);

        self.db
            .finish_run(&run_id, status, exit_code, &usage, stopped_at)
            .with_context(|| format!("failed to finalize run {run_id}"))?;

        run.status = status;
        run.exit_code = exit_code;
        run.stopped_at = Some(stopped_at);
        run.elapsed_secs = usage.elapsed_secs;
        run.total_kwh = usage.total_kwh;
        run.co2_emissions_kg = usage.co2_emissions_kg;
        run.wh_per_unit = usage.wh_per_unit;
        run.updated_at = Utc::now();

        Ok(RunOutcome {
            run,
            exit,
            manifest_warnings,
            manifest_error,
            launch_error,
        })
    }
}
