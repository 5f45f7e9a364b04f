//! Capabilities the manifest needs from the host: interpreter version,
//! installed packages and an environment-manager export. The system
//! implementations shell out; tests substitute fakes.

use anyhow::{bail, Result};
use std::process::Command;

use crate::settings::PythonSettings;
use crate::utils::process::{launch_error, run_tool};

pub trait InterpreterProbe {
    fn interpreter_version(&self) -> Result<String>;
}

pub trait PackageLister {
    fn list_packages(&self) -> Result<Vec<String>>;
}

pub trait EnvironmentExporter {
    fn export(&self, env_name: &str) -> Result<String>;
}

pub struct PythonInterpreter {
    program: String,
}

impl PythonInterpreter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl InterpreterProbe for PythonInterpreter {
    fn interpreter_version(&self) -> Result<String> {
        let output = Command::new(&self.program)
            .arg("--version")
            .output()
            .map_err(|err| launch_error(&self.program, err))?;

        // Python 2 reported its version on stderr.
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let version = if stdout.trim().is_empty() {
            stderr.trim()
        } else {
            stdout.trim()
        };

        if !output.status.success() || version.is_empty() {
            bail!("{} --version produced no version string", self.program);
        }
        Ok(version.to_string())
    }
}

pub struct PipFreeze {
    program: String,
}

impl PipFreeze {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl PackageLister for PipFreeze {
    fn list_packages(&self) -> Result<Vec<String>> {
        let stdout = run_tool(&self.program, &["freeze"])?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect())
    }
}

pub struct CondaExport {
    program: String,
}

impl CondaExport {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl EnvironmentExporter for CondaExport {
    fn export(&self, env_name: &str) -> Result<String> {
        run_tool(&self.program, &["env", "export", "--name", env_name])
    }
}

/// The three system probes configured from the `python` settings section.
pub fn system_probes(
    settings: &PythonSettings,
) -> (PythonInterpreter, PipFreeze, CondaExport) {
    (
        PythonInterpreter::new(&settings.interpreter),
        PipFreeze::new(&settings.pip),
        CondaExport::new(&settings.conda),
    )
}
