use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::energy::{DEFAULT_AVERAGE_POWER_KW, DEFAULT_CO2_INTENSITY_KG_PER_KWH};

pub const DEFAULT_SETTINGS_FILE: &str = "gapwatch.json";
pub const SETTINGS_ENV_VAR: &str = "GAPWATCH_CONFIG";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SamplerKind {
    Fixed,
    Cpu,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergySettings {
    pub co2_intensity_kg_per_kwh: f64,
    pub sampler: SamplerKind,
    pub average_power_kw: f64,
    pub idle_power_kw: f64,
    pub max_power_kw: f64,
}

impl Default for EnergySettings {
    fn default() -> Self {
        Self {
            co2_intensity_kg_per_kwh: DEFAULT_CO2_INTENSITY_KG_PER_KWH,
            sampler: SamplerKind::Fixed,
            average_power_kw: DEFAULT_AVERAGE_POWER_KW,
            idle_power_kw: 0.050,
            max_power_kw: 0.250,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PythonSettings {
    pub interpreter: String,
    pub pip: String,
    pub conda: String,
}

impl Default for PythonSettings {
    fn default() -> Self {
        Self {
            interpreter: "python".into(),
            pip: "pip".into(),
            conda: "conda".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeGuardSettings {
    pub threshold: f64,
    /// JSON object of model id -> accuracy. Unset means simulated figures.
    pub accuracy_report: Option<PathBuf>,
    pub dataset: String,
}

impl Default for EdgeGuardSettings {
    fn default() -> Self {
        Self {
            threshold: 0.05,
            accuracy_report: None,
            dataset: "test_data.pt".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Log,
    Gh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifySettings {
    pub sink: SinkKind,
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self { sink: SinkKind::Log }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CiSettings {
    pub manifest_path: PathBuf,
    pub simulated_task_secs: f64,
    pub work_units: u64,
}

impl Default for CiSettings {
    fn default() -> Self {
        Self {
            manifest_path: PathBuf::from("gapwatch_ci_manifest.jsonld"),
            simulated_task_secs: 3.0,
            work_units: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub data_dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".gapwatch"),
        }
    }
}

impl StorageSettings {
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("gapwatch.sqlite3")
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.data_dir.join("runs")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub energy: EnergySettings,
    pub python: PythonSettings,
    pub edgeguard: EdgeGuardSettings,
    pub notify: NotifySettings,
    pub ci: CiSettings,
    pub storage: StorageSettings,
}

impl Settings {
    /// Picks the settings file: explicit path, then `GAPWATCH_CONFIG`, then
    /// `gapwatch.json` in the working directory.
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        match std::env::var(SETTINGS_ENV_VAR) {
            Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
            _ => PathBuf::from(DEFAULT_SETTINGS_FILE),
        }
    }

    /// Missing file means defaults. A file that exists but doesn't parse is
    /// logged and also falls back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("[settings] {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;

        let settings = serde_json::from_str(&contents).unwrap_or_else(|err| {
            log::warn!(
                "[settings] ignoring unparsable settings file {}: {err}",
                path.display()
            );
            Self::default()
        });
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("nope.json")).unwrap();

        assert_eq!(settings.energy.co2_intensity_kg_per_kwh, 0.254);
        assert_eq!(settings.energy.average_power_kw, 0.150);
        assert_eq!(settings.energy.sampler, SamplerKind::Fixed);
        assert_eq!(settings.edgeguard.threshold, 0.05);
        assert_eq!(settings.ci.work_units, 10_000);
        assert_eq!(settings.notify.sink, SinkKind::Log);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gapwatch.json");
        fs::write(
            &path,
            r#"{"energy": {"co2_intensity_kg_per_kwh": 0.5, "sampler": "cpu"}}"#,
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.energy.co2_intensity_kg_per_kwh, 0.5);
        assert_eq!(settings.energy.sampler, SamplerKind::Cpu);
        assert_eq!(settings.energy.average_power_kw, 0.150);
        assert_eq!(settings.python.interpreter, "python");
    }

    #[test]
    fn garbage_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gapwatch.json");
        fs::write(&path, "{not json").unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.ci.simulated_task_secs, 3.0);
    }

    #[test]
    fn storage_paths_follow_data_dir() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gapwatch.json");
        let mut settings = Settings::default();
        settings.storage.data_dir = dir.path().join("state");
        fs::write(&path, serde_json::to_string_pretty(&settings).unwrap()).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded.storage.database_path(), dir.path().join("state/gapwatch.sqlite3"));
        assert_eq!(loaded.storage.runs_dir(), dir.path().join("state/runs"));
    }

    #[test]
    fn explicit_path_wins() {
        let path = Settings::resolve_path(Some(Path::new("custom.json")));
        assert_eq!(path, PathBuf::from("custom.json"));
    }
}
