use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnergyReading {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub energy_kwh: f64,
}

/// Interval handed to a sampler when monitoring stops.
#[derive(Debug, Clone, Copy)]
pub struct SampleWindow {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub elapsed_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnergyUsage {
    pub total_kwh: f64,
    pub co2_emissions_kg: f64,
    /// Watt-hours per unit of work (tokens, samples, ...).
    pub wh_per_unit: Option<f64>,
    pub elapsed_secs: f64,
}

impl EnergyUsage {
    pub fn zero() -> Self {
        Self {
            total_kwh: 0.0,
            co2_emissions_kg: 0.0,
            wh_per_unit: None,
            elapsed_secs: 0.0,
        }
    }
}

impl Default for EnergyUsage {
    fn default() -> Self {
        Self::zero()
    }
}
