use sysinfo::System;

use super::types::{EnergyReading, SampleWindow};

pub const DEFAULT_AVERAGE_POWER_KW: f64 = 0.150;

const SECS_PER_HOUR: f64 = 3600.0;

/// Source of energy readings for a monitored interval.
///
/// `begin` is called when monitoring starts so stateful samplers can take a
/// baseline; `sample` is called once when monitoring stops and returns every
/// reading attributable to the interval. Returning several readings (one per
/// device) is how multiple power sources get summed by the meter.
pub trait PowerSampler {
    fn begin(&mut self) {}

    fn sample(&mut self, window: &SampleWindow) -> Vec<EnergyReading>;
}

/// Assumes a constant average draw for the whole interval.
#[derive(Debug, Clone)]
pub struct FixedPowerSampler {
    average_power_kw: f64,
    label: String,
}

impl FixedPowerSampler {
    pub fn new(average_power_kw: f64) -> Self {
        Self {
            average_power_kw: average_power_kw.max(0.0),
            label: "simulated".into(),
        }
    }
}

impl Default for FixedPowerSampler {
    fn default() -> Self {
        Self::new(DEFAULT_AVERAGE_POWER_KW)
    }
}

impl PowerSampler for FixedPowerSampler {
    fn sample(&mut self, window: &SampleWindow) -> Vec<EnergyReading> {
        vec![EnergyReading {
            timestamp: window.ended_at,
            source: self.label.clone(),
            energy_kwh: self.average_power_kw * (window.elapsed_secs / SECS_PER_HOUR),
        }]
    }
}

/// Scales power between an idle and a max draw by global CPU utilization
/// measured across the interval.
pub struct CpuUtilizationSampler {
    system: System,
    idle_kw: f64,
    max_kw: f64,
}

impl CpuUtilizationSampler {
    pub fn new(idle_kw: f64, max_kw: f64) -> Self {
        let mut system = System::new();
        // CPU usage is a delta between two refreshes; take the first one now.
        system.refresh_cpu_usage();

        let idle_kw = idle_kw.max(0.0);
        Self {
            system,
            idle_kw,
            max_kw: max_kw.max(idle_kw),
        }
    }

    fn power_at(&self, cpu_percent: f64) -> f64 {
        let utilization = (cpu_percent / 100.0).clamp(0.0, 1.0);
        self.idle_kw + (self.max_kw - self.idle_kw) * utilization
    }
}

impl PowerSampler for CpuUtilizationSampler {
    fn begin(&mut self) {
        self.system.refresh_cpu_usage();
    }

    fn sample(&mut self, window: &SampleWindow) -> Vec<EnergyReading> {
        self.system.refresh_cpu_usage();
        let cpu_percent = f64::from(self.system.global_cpu_usage());
        let power_kw = self.power_at(cpu_percent);

        log::debug!(
            "[energy] cpu sampler: utilization={cpu_percent:.1}% power={power_kw:.4}kW"
        );

        vec![EnergyReading {
            timestamp: window.ended_at,
            source: "cpu".into(),
            energy_kwh: power_kw * (window.elapsed_secs / SECS_PER_HOUR),
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn window(secs: f64) -> SampleWindow {
        let started_at = Utc::now();
        SampleWindow {
            started_at,
            ended_at: started_at + Duration::milliseconds((secs * 1000.0) as i64),
            elapsed_secs: secs,
        }
    }

    #[test]
    fn fixed_sampler_uses_average_power() {
        let mut sampler = FixedPowerSampler::default();
        let readings = sampler.sample(&window(3600.0));

        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].source, "simulated");
        assert!((readings[0].energy_kwh - 0.150).abs() < 1e-12);
    }

    #[test]
    fn fixed_sampler_clamps_negative_power() {
        let mut sampler = FixedPowerSampler::new(-1.0);
        let readings = sampler.sample(&window(10.0));
        assert_eq!(readings[0].energy_kwh, 0.0);
    }

    #[test]
    fn cpu_sampler_interpolates_between_idle_and_max() {
        let sampler = CpuUtilizationSampler::new(0.05, 0.25);
        assert!((sampler.power_at(0.0) - 0.05).abs() < 1e-12);
        assert!((sampler.power_at(50.0) - 0.15).abs() < 1e-12);
        assert!((sampler.power_at(250.0) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn cpu_sampler_reading_is_bounded_by_max_draw() {
        let mut sampler = CpuUtilizationSampler::new(0.05, 0.25);
        sampler.begin();
        let readings = sampler.sample(&window(36.0));

        assert_eq!(readings[0].source, "cpu");
        assert!(readings[0].energy_kwh >= 0.05 * 0.01 - 1e-12);
        assert!(readings[0].energy_kwh <= 0.25 * 0.01 + 1e-12);
    }
}
