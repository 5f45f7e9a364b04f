use anyhow::Result;

use super::{capture_manifest_step, AppState};
use crate::{
    edgeguard::{AccuracyComparison, QuantizationChecker},
    energy::{meter_from_settings, EnergyUsage},
    manifest::EnvironmentManifest,
    notify::{sink_from_kind, Delivery, NotificationDispatcher},
    report::{energy_lines, CommandReport},
    training::{ExternalCommand, SimulatedWorkload, Workload},
};

const BASELINE_MODEL: &str = "model_fp16.pth";

fn candidate_model(quantization: &str) -> String {
    format!("model_{quantization}.pth")
}

/// Body of the PR comment posted at the end of a CI run.
fn ci_message(usage: &EnergyUsage, edgeguard: Option<(&str, &AccuracyComparison)>) -> String {
    let mut message = String::from("GapWatch CI Run Complete.\n");
    message.push_str(&format!(
        "Energy: {:.6} kWh, {:.6} kg CO2.\n",
        usage.total_kwh, usage.co2_emissions_kg
    ));
    if let Some((quantization, comparison)) = edgeguard {
        message.push_str(&format!(
            "EdgeGuard ({quantization}): Drop {:.4}.",
            comparison.accuracy_drop
        ));
        if comparison.alert_triggered {
            message.push_str(" ACCURACY ALERT!");
        }
    }
    message
}

pub fn run(
    state: &AppState,
    quantize: Option<String>,
    threshold: Option<f64>,
    notify: bool,
    command: Vec<String>,
) -> Result<CommandReport> {
    let settings = &state.settings;
    let mut report = state.report("ci");
    report.line("Starting GapWatch CI process...");

    report.line("Step 1: Generating run manifest...");
    let manifest = EnvironmentManifest::from_settings(&settings.python);
    if let Some(capture) = capture_manifest_step(&mut report, &manifest, &settings.ci.manifest_path)
    {
        report.line(format!("Manifest created at {}", capture.path.display()));
        report.insert("manifest_path", &capture.path)?;
    }

    let workload: Box<dyn Workload> = if command.is_empty() {
        report.line("");
        report.line("Step 2: Monitoring energy for a simulated CI task...");
        Box::new(SimulatedWorkload::from_secs(settings.ci.simulated_task_secs))
    } else {
        report.line("");
        report.line(format!("Step 2: Monitoring energy for: {}", command.join(" ")));
        Box::new(ExternalCommand {
            argv: command,
            quiet_stdout: state.json,
        })
    };

    let mut meter = meter_from_settings(&settings.energy);
    meter.start();
    let result = workload.run();
    meter.stop();
    let usage = meter.usage(Some(settings.ci.work_units));

    match result {
        Ok(exit) if exit.success => report.ok("task"),
        Ok(exit) => report.fail(
            "task",
            match exit.code {
                Some(code) => format!("'{}' exited with code {code}", workload.describe()),
                None => format!("'{}' was terminated by a signal", workload.describe()),
            },
        ),
        Err(err) => report.fail("task", format!("{err:#}")),
    }
    for line in energy_lines("CI Energy Report", &usage, None) {
        report.line(line);
    }
    report.insert("energy", &usage)?;

    report.line("");
    report.line("Step 3: Running EdgeGuard check...");
    let mut comparison = None;
    match &quantize {
        Some(quantization) => {
            report.line(format!("Quantization type: {quantization}"));
            let threshold = threshold.unwrap_or(settings.edgeguard.threshold);
            let checked = QuantizationChecker::from_settings(&settings.edgeguard).and_then(
                |checker| {
                    checker.compare(
                        BASELINE_MODEL,
                        &candidate_model(quantization),
                        &settings.edgeguard.dataset,
                        threshold,
                    )
                },
            );
            match checked {
                Ok(result) => {
                    report.line("--- EdgeGuard Report ---");
                    report.line(format!("  FP16 Accuracy: {:.4}", result.baseline_accuracy));
                    report.line(format!(
                        "  Quantized Accuracy: {:.4}",
                        result.candidate_accuracy
                    ));
                    report.line(format!("  Accuracy Drop: {:.4}", result.accuracy_drop));
                    if result.alert_triggered {
                        report.line("  ALERT: Quantization accuracy drop EXCEEDS threshold!");
                        report.fail(
                            "edgeguard",
                            format!(
                                "accuracy drop {:.4} exceeds threshold {:.4}",
                                result.accuracy_drop, result.threshold
                            ),
                        );
                    } else {
                        report.line("  Quantization accuracy drop is within acceptable limits.");
                        report.ok("edgeguard");
                    }
                    report.insert("edgeguard", &result)?;
                    comparison = Some(result);
                }
                Err(err) => report.fail("edgeguard", format!("{err:#}")),
            }
        }
        None => report.line("Skipping EdgeGuard check as --quantize not specified."),
    }

    report.line("");
    if notify {
        report.line("Step 4: Preparing notification...");
        let edgeguard = quantize.as_deref().zip(comparison.as_ref());
        let message = ci_message(&usage, edgeguard);
        report.line(format!("Notification message: {message}"));

        let dispatcher =
            NotificationDispatcher::new(state.ci.clone(), sink_from_kind(settings.notify.sink));
        match dispatcher.notify(&message, None, None) {
            Ok(delivery) => {
                match &delivery {
                    Delivery::Delivered { repository, pr_id } => {
                        report.line(format!("Notification posted to {repository} PR #{pr_id}."));
                        report.ok("notify");
                    }
                    Delivery::Undeliverable { .. } => report.warn(
                        "notify",
                        "could not resolve repository and pull request; notification skipped",
                    ),
                }
                report.insert("notification", &delivery)?;
            }
            Err(err) => report.warn("notify", format!("{err:#}")),
        }
        report.insert("message", &message)?;
    } else {
        report.line("Skipping notification as --notify not specified.");
    }

    report.line("");
    report.line("GapWatch CI process complete.");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage() -> EnergyUsage {
        EnergyUsage {
            total_kwh: 0.000125,
            co2_emissions_kg: 0.00003175,
            wh_per_unit: Some(0.0000125),
            elapsed_secs: 3.0,
        }
    }

    fn comparison(drop: f64, alert: bool) -> AccuracyComparison {
        AccuracyComparison {
            baseline_model: BASELINE_MODEL.into(),
            candidate_model: candidate_model("int8"),
            dataset: "test_data.pt".into(),
            baseline_accuracy: 0.85,
            candidate_accuracy: 0.85 - drop,
            accuracy_drop: drop,
            threshold: 0.05,
            alert_triggered: alert,
        }
    }

    #[test]
    fn message_without_edgeguard() {
        assert_eq!(
            ci_message(&usage(), None),
            "GapWatch CI Run Complete.\nEnergy: 0.000125 kWh, 0.000032 kg CO2.\n"
        );
    }

    #[test]
    fn message_with_edgeguard_alert() {
        let result = comparison(0.03, true);
        assert_eq!(
            ci_message(&usage(), Some(("int8", &result))),
            "GapWatch CI Run Complete.\nEnergy: 0.000125 kWh, 0.000032 kg CO2.\n\
             EdgeGuard (int8): Drop 0.0300. ACCURACY ALERT!"
        );

        let result = comparison(0.03, false);
        assert!(ci_message(&usage(), Some(("int8", &result))).ends_with("Drop 0.0300."));
    }

    #[test]
    fn candidate_model_follows_quantization() {
        assert_eq!(candidate_model("int4"), "model_int4.pth");
    }
}
