mod document;
mod probes;

pub use document::{
    package_drift, CondaEnvironment, ManifestDocument, PackageChange, PackageDrift, PipPackages,
    SoftwareEnvironment, ENVIRONMENT_NODE_TYPE, MANIFEST_CONTEXT, NO_CONDA_ENVIRONMENT,
};
pub use probes::{
    system_probes, CondaExport, EnvironmentExporter, InterpreterProbe, PackageLister, PipFreeze,
    PythonInterpreter,
};

use anyhow::Result;
use serde::Serialize;
use serde_json::Map;
use std::path::{Path, PathBuf};
use sysinfo::System;

use crate::settings::PythonSettings;

pub const ACTIVE_CONDA_ENV_VAR: &str = "CONDA_DEFAULT_ENV";

/// Name of the active conda environment, if any.
pub fn active_conda_env() -> Option<String> {
    std::env::var(ACTIVE_CONDA_ENV_VAR)
        .ok()
        .filter(|name| !name.trim().is_empty())
}

/// `<os>-<kernel>-<arch>`, e.g. `Linux-6.5.0-x86_64`.
pub fn platform_descriptor() -> String {
    let os = System::name().unwrap_or_else(|| std::env::consts::OS.to_string());
    let kernel = System::kernel_version().unwrap_or_else(|| "unknown".into());
    format!("{os}-{kernel}-{}", std::env::consts::ARCH)
}

#[derive(Debug, Clone, Serialize)]
pub struct CaptureReport {
    pub path: PathBuf,
    pub document: ManifestDocument,
    /// Tool failures that were recorded inline in the document.
    pub warnings: Vec<String>,
}

/// Snapshots the execution environment into a [`ManifestDocument`].
pub struct EnvironmentManifest {
    interpreter: Box<dyn InterpreterProbe>,
    packages: Box<dyn PackageLister>,
    exporter: Box<dyn EnvironmentExporter>,
    active_env: Option<String>,
    platform: String,
}

impl EnvironmentManifest {
    pub fn new(
        interpreter: Box<dyn InterpreterProbe>,
        packages: Box<dyn PackageLister>,
        exporter: Box<dyn EnvironmentExporter>,
        active_env: Option<String>,
    ) -> Self {
        Self {
            interpreter,
            packages,
            exporter,
            active_env,
            platform: platform_descriptor(),
        }
    }

    /// System probes from settings, conda env from the process environment.
    pub fn from_settings(settings: &PythonSettings) -> Self {
        let (interpreter, pip, conda) = system_probes(settings);
        Self::new(
            Box::new(interpreter),
            Box::new(pip),
            Box::new(conda),
            active_conda_env(),
        )
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    /// Gathers everything without touching the filesystem. Tool failures are
    /// recorded inline and returned as warnings.
    pub fn build_document(&self) -> (ManifestDocument, Vec<String>) {
        let mut warnings = Vec::new();

        let python_version = match self.interpreter.interpreter_version() {
            Ok(version) => version,
            Err(err) => {
                log::warn!("[manifest] interpreter probe failed: {err}");
                warnings.push(format!("interpreter: {err}"));
                format!("Error: {err}")
            }
        };

        let pip_packages = match self.packages.list_packages() {
            Ok(packages) => PipPackages::Listed(packages),
            Err(err) => {
                log::warn!("[manifest] package listing failed: {err}");
                warnings.push(format!("packages: {err}"));
                PipPackages::Failed(format!("Error: {err}"))
            }
        };

        let conda_environment = match &self.active_env {
            None => CondaEnvironment::Note(NO_CONDA_ENVIRONMENT.into()),
            Some(name) => match self.exporter.export(name) {
                Ok(export) => CondaEnvironment::Exported {
                    name: name.clone(),
                    export,
                },
                Err(err) => {
                    log::warn!("[manifest] environment export for '{name}' failed: {err}");
                    warnings.push(format!("environment export: {err}"));
                    CondaEnvironment::Note(format!("Error: {err}"))
                }
            },
        };

        let environment = SoftwareEnvironment {
            id: "#environment".into(),
            node_type: ENVIRONMENT_NODE_TYPE.into(),
            python_version,
            platform: self.platform.clone(),
            conda_environment,
            pip_packages,
            data_urls: Vec::new(),
            seeds: Map::new(),
        };

        (ManifestDocument::new(environment), warnings)
    }

    /// Builds the document and writes it to `output_path`, replacing any
    /// existing file. Only the write itself can fail.
    pub fn capture(&self, output_path: &Path) -> Result<CaptureReport> {
        let (document, warnings) = self.build_document();
        document.write_to(output_path)?;
        log::info!("[manifest] created at {}", output_path.display());

        Ok(CaptureReport {
            path: output_path.to_path_buf(),
            document,
            warnings,
        })
    }
}
