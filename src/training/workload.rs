use anyhow::{bail, Result};
use serde::Serialize;
use std::{
    process::{Command, Stdio},
    thread,
    time::Duration,
};

use crate::utils::process::launch_error;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct WorkloadExit {
    pub success: bool,
    pub code: Option<i32>,
}

impl WorkloadExit {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            code: Some(0),
        }
    }
}

/// The work measured between `start` and `stop` of the energy meter.
pub trait Workload {
    fn describe(&self) -> String;

    /// Blocks until the work is done. `Err` means it could not be launched;
    /// a launched process that fails is reported through [`WorkloadExit`].
    fn run(&self) -> Result<WorkloadExit>;
}

fn run_command(mut command: Command, program: &str, quiet_stdout: bool) -> Result<WorkloadExit> {
    if quiet_stdout {
        // Keep stdout clean for machine-readable output.
        command.stdout(Stdio::from(std::io::stderr()));
    }
    let status = command
        .status()
        .map_err(|err| launch_error(program, err))?;
    Ok(WorkloadExit {
        success: status.success(),
        code: status.code(),
    })
}

/// `<interpreter> <script> --epochs <n>`
pub struct PythonScript {
    pub interpreter: String,
    pub script: String,
    pub epochs: u32,
    pub quiet_stdout: bool,
}

impl Workload for PythonScript {
    fn describe(&self) -> String {
        format!("{} {} --epochs {}", self.interpreter, self.script, self.epochs)
    }

    fn run(&self) -> Result<WorkloadExit> {
        let mut command = Command::new(&self.interpreter);
        command
            .arg(&self.script)
            .arg("--epochs")
            .arg(self.epochs.to_string());
        run_command(command, &self.interpreter, self.quiet_stdout)
    }
}

/// Arbitrary command line, e.g. the test suite in a CI job.
pub struct ExternalCommand {
    pub argv: Vec<String>,
    pub quiet_stdout: bool,
}

impl Workload for ExternalCommand {
    fn describe(&self) -> String {
        self.argv.join(" ")
    }

    fn run(&self) -> Result<WorkloadExit> {
        let Some((program, args)) = self.argv.split_first() else {
            bail!("no command given");
        };
        let mut command = Command::new(program);
        command.args(args);
        run_command(command, program, self.quiet_stdout)
    }
}

/// Stands in for real work by sleeping.
pub struct SimulatedWorkload {
    pub duration: Duration,
}

impl SimulatedWorkload {
    pub fn from_secs(secs: f64) -> Self {
        let secs = if secs.is_finite() { secs.max(0.0) } else { 0.0 };
        Self {
            duration: Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX),
        }
    }
}

impl Workload for SimulatedWorkload {
    fn describe(&self) -> String {
        format!("simulated task ({:.2}s)", self.duration.as_secs_f64())
    }

    fn run(&self) -> Result<WorkloadExit> {
        thread::sleep(self.duration);
        Ok(WorkloadExit::succeeded())
    }
}
