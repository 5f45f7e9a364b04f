//! Persisted record of one monitored training run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::energy::EnergyUsage;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    /// Left running by a process that died before finishing the record.
    Interrupted,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "Running",
            RunStatus::Completed => "Completed",
            RunStatus::Failed => "Failed",
            RunStatus::Interrupted => "Interrupted",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub script: String,
    pub epochs: u32,
    pub work_units: Option<u64>,
    pub status: RunStatus,
    pub exit_code: Option<i32>,
    pub manifest_path: String,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub elapsed_secs: f64,
    pub total_kwh: f64,
    pub co2_emissions_kg: f64,
    pub wh_per_unit: Option<f64>,
    pub replay_of: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn usage(&self) -> EnergyUsage {
        EnergyUsage {
            total_kwh: self.total_kwh,
            co2_emissions_kg: self.co2_emissions_kg,
            wh_per_unit: self.wh_per_unit,
            elapsed_secs: self.elapsed_secs,
        }
    }
}
