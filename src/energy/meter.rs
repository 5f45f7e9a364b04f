use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;

use super::sampler::{FixedPowerSampler, PowerSampler};
use super::types::{EnergyReading, EnergyUsage, SampleWindow};

pub const DEFAULT_CO2_INTENSITY_KG_PER_KWH: f64 = 0.254;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum MeterStatus {
    Idle,
    Running,
    Stopped,
}

/// One monitored interval. Reused across `start` calls.
#[derive(Debug, Clone, Serialize)]
pub struct MonitoringSession {
    pub status: MeterStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub readings: Vec<EnergyReading>,
    pub co2_intensity_kg_per_kwh: f64,
    pub elapsed_secs: f64,
    #[serde(skip)]
    running_anchor: Option<Instant>,
}

impl MonitoringSession {
    fn new(co2_intensity_kg_per_kwh: f64) -> Self {
        Self {
            status: MeterStatus::Idle,
            started_at: None,
            ended_at: None,
            readings: Vec::new(),
            co2_intensity_kg_per_kwh,
            elapsed_secs: 0.0,
            running_anchor: None,
        }
    }

    fn begin(&mut self, started_at: DateTime<Utc>, now: Instant) {
        self.status = MeterStatus::Running;
        self.started_at = Some(started_at);
        self.ended_at = None;
        self.readings.clear();
        self.elapsed_secs = 0.0;
        self.running_anchor = Some(now);
    }
}

/// Estimates energy and emissions for a wall-clock interval.
///
/// Sequencing mistakes (`stop` or `usage` before `start`) never fail: they
/// are logged and produce empty or zeroed results, so telemetry can't take a
/// training job down with it.
pub struct EnergyMeter {
    session: MonitoringSession,
    sampler: Box<dyn PowerSampler>,
}

impl EnergyMeter {
    pub fn new(co2_intensity_kg_per_kwh: f64) -> Self {
        Self::with_sampler(co2_intensity_kg_per_kwh, Box::new(FixedPowerSampler::default()))
    }

    pub fn with_sampler(co2_intensity_kg_per_kwh: f64, sampler: Box<dyn PowerSampler>) -> Self {
        Self {
            session: MonitoringSession::new(co2_intensity_kg_per_kwh),
            sampler,
        }
    }

    pub fn session(&self) -> &MonitoringSession {
        &self.session
    }

    pub fn start(&mut self) {
        if self.session.status == MeterStatus::Running {
            log::debug!("[energy] restarting an interval that was still running");
        }
        self.sampler.begin();
        self.session.begin(Utc::now(), Instant::now());
        log::info!("[energy] monitoring started");
    }

    /// Closes the interval and returns its length in seconds, or `None` when
    /// there is no running interval. A second `stop` keeps the first result.
    pub fn stop(&mut self) -> Option<f64> {
        let (started_at, anchor) = match (self.session.started_at, self.session.running_anchor) {
            (Some(started_at), Some(anchor)) => (started_at, anchor),
            (Some(_), None) => {
                log::warn!("[energy] monitoring already stopped; call start() for a new interval");
                return None;
            }
            (None, _) => {
                log::warn!("[energy] monitoring was not started; call start() first");
                return None;
            }
        };

        let elapsed_secs = anchor.elapsed().as_secs_f64();
        let ended_at = Utc::now().max(started_at);

        let window = SampleWindow {
            started_at,
            ended_at,
            elapsed_secs,
        };
        let readings = self.sampler.sample(&window);

        self.session.status = MeterStatus::Stopped;
        self.session.ended_at = Some(ended_at);
        self.session.elapsed_secs = elapsed_secs;
        self.session.running_anchor = None;
        self.session.readings.extend(readings);

        log::info!("[energy] monitoring stopped after {elapsed_secs:.2}s");
        Some(elapsed_secs)
    }

    pub fn usage(&self, work_units: Option<u64>) -> EnergyUsage {
        if self.session.started_at.is_none() || self.session.ended_at.is_none() {
            log::warn!("[energy] monitoring was not started or stopped; reporting zero usage");
            return EnergyUsage::zero();
        }

        let total_kwh: f64 = self.session.readings.iter().map(|r| r.energy_kwh).sum();
        let co2_emissions_kg = total_kwh * self.session.co2_intensity_kg_per_kwh;
        let wh_per_unit = match work_units {
            Some(units) if units > 0 => Some(total_kwh * 1000.0 / units as f64),
            _ => None,
        };

        EnergyUsage {
            total_kwh,
            co2_emissions_kg,
            wh_per_unit,
            elapsed_secs: self.session.elapsed_secs,
        }
    }
}

impl Default for EnergyMeter {
    fn default() -> Self {
        Self::new(DEFAULT_CO2_INTENSITY_KG_PER_KWH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{thread, time::Duration};

    const EPS: f64 = 1e-12;

    fn run_interval(meter: &mut EnergyMeter, millis: u64) -> f64 {
        meter.start();
        thread::sleep(Duration::from_millis(millis));
        meter.stop().expect("meter was started")
    }

    struct TwoDeviceSampler;

    impl PowerSampler for TwoDeviceSampler {
        fn sample(&mut self, window: &SampleWindow) -> Vec<EnergyReading> {
            ["cpu", "gpu"]
                .iter()
                .map(|source| EnergyReading {
                    timestamp: window.ended_at,
                    source: source.to_string(),
                    energy_kwh: 0.5,
                })
                .collect()
        }
    }

    #[test]
    fn usage_on_fresh_meter_is_zeroed() {
        let meter = EnergyMeter::default();
        assert_eq!(meter.usage(Some(100)), EnergyUsage::zero());
        assert_eq!(meter.usage(None), EnergyUsage::zero());
    }

    #[test]
    fn stop_without_start_is_a_noop() {
        let mut meter = EnergyMeter::default();
        assert_eq!(meter.stop(), None);
        assert_eq!(meter.session().status, MeterStatus::Idle);
        assert!(meter.session().started_at.is_none());
        assert!(meter.session().readings.is_empty());
    }

    #[test]
    fn second_stop_keeps_first_interval() {
        let mut meter = EnergyMeter::default();
        run_interval(&mut meter, 5);
        let first = meter.usage(Some(10));
        let ended_at = meter.session().ended_at;

        assert_eq!(meter.stop(), None);
        assert_eq!(meter.session().status, MeterStatus::Stopped);
        assert_eq!(meter.session().readings.len(), 1);
        assert_eq!(meter.session().ended_at, ended_at);
        assert_eq!(meter.usage(Some(10)), first);
    }

    #[test]
    fn usage_before_stop_is_zeroed() {
        let mut meter = EnergyMeter::default();
        meter.start();
        assert_eq!(meter.usage(Some(10)), EnergyUsage::zero());
    }

    #[test]
    fn energy_follows_fixed_average_power() {
        let mut meter = EnergyMeter::default();
        let elapsed = run_interval(&mut meter, 20);
        let usage = meter.usage(None);

        assert!(elapsed >= 0.0);
        assert_eq!(usage.elapsed_secs, elapsed);
        assert!((usage.total_kwh - 0.150 * elapsed / 3600.0).abs() < EPS);
        assert!(usage.total_kwh > 0.0);
    }

    #[test]
    fn co2_uses_configured_intensity() {
        for intensity in [DEFAULT_CO2_INTENSITY_KG_PER_KWH, 0.5, 0.0] {
            let mut meter = EnergyMeter::new(intensity);
            run_interval(&mut meter, 5);
            let usage = meter.usage(None);
            assert!((usage.co2_emissions_kg - usage.total_kwh * intensity).abs() < EPS);
        }
    }

    #[test]
    fn per_unit_only_for_positive_work() {
        let mut meter = EnergyMeter::default();
        run_interval(&mut meter, 5);

        assert_eq!(meter.usage(None).wh_per_unit, None);
        assert_eq!(meter.usage(Some(0)).wh_per_unit, None);

        let usage = meter.usage(Some(100));
        let per_unit = usage.wh_per_unit.expect("positive work units");
        assert!((per_unit - usage.total_kwh * 1000.0 / 100.0).abs() < EPS);
    }

    #[test]
    fn usage_is_idempotent_after_stop() {
        let mut meter = EnergyMeter::default();
        run_interval(&mut meter, 5);
        assert_eq!(meter.usage(Some(7)), meter.usage(Some(7)));
    }

    #[test]
    fn restart_clears_previous_interval() {
        let mut meter = EnergyMeter::default();
        run_interval(&mut meter, 5);
        assert_eq!(meter.session().readings.len(), 1);

        meter.start();
        assert_eq!(meter.session().status, MeterStatus::Running);
        assert!(meter.session().ended_at.is_none());
        assert!(meter.session().readings.is_empty());

        meter.stop();
        assert_eq!(meter.session().readings.len(), 1);
    }

    #[test]
    fn end_is_never_before_start() {
        let mut meter = EnergyMeter::default();
        run_interval(&mut meter, 1);
        let session = meter.session();
        assert!(session.ended_at >= session.started_at);
    }

    #[test]
    fn readings_from_several_sources_are_summed() {
        let mut meter = EnergyMeter::with_sampler(1.0, Box::new(TwoDeviceSampler));
        run_interval(&mut meter, 1);
        let usage = meter.usage(Some(1000));

        assert!((usage.total_kwh - 1.0).abs() < EPS);
        assert!((usage.co2_emissions_kg - 1.0).abs() < EPS);
        assert!((usage.wh_per_unit.unwrap() - 1.0).abs() < EPS);
    }
}
