mod meter;
mod sampler;
mod types;

pub use meter::{EnergyMeter, MeterStatus, MonitoringSession, DEFAULT_CO2_INTENSITY_KG_PER_KWH};
pub use sampler::{CpuUtilizationSampler, FixedPowerSampler, PowerSampler, DEFAULT_AVERAGE_POWER_KW};
pub use types::{EnergyReading, EnergyUsage, SampleWindow};

use crate::settings::{EnergySettings, SamplerKind};

/// Builds a meter with the sampler selected in the settings.
pub fn meter_from_settings(settings: &EnergySettings) -> EnergyMeter {
    let sampler: Box<dyn PowerSampler> = match settings.sampler {
        SamplerKind::Fixed => Box::new(FixedPowerSampler::new(settings.average_power_kw)),
        SamplerKind::Cpu => Box::new(CpuUtilizationSampler::new(
            settings.idle_power_kw,
            settings.max_power_kw,
        )),
    };
    EnergyMeter::with_sampler(settings.co2_intensity_kg_per_kwh, sampler)
}
