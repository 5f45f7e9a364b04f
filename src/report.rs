use anyhow::Result;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::energy::EnergyUsage;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Ok,
    Warning,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub name: String,
    pub status: StepStatus,
    pub detail: Option<String>,
}

/// What a command did. Human-readable lines for the terminal, steps and
/// data for `--json`, and the exit status derived from the steps.
///
/// A streaming report prints its lines as they are added, so progress shows
/// up interleaved with child process output.
#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub steps: Vec<StepOutcome>,
    pub data: Map<String, Value>,
    #[serde(skip)]
    lines: Vec<String>,
    #[serde(skip)]
    stream: bool,
}

#[derive(Serialize)]
struct JsonOut<'a> {
    ok: bool,
    data: &'a CommandReport,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            steps: Vec::new(),
            data: Map::new(),
            lines: Vec::new(),
            stream: false,
        }
    }

    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn line(&mut self, line: impl Into<String>) {
        let line = line.into();
        if self.stream {
            println!("{line}");
        } else {
            self.lines.push(line);
        }
    }

    fn step(&mut self, name: &str, status: StepStatus, detail: Option<String>) {
        self.steps.push(StepOutcome {
            name: name.to_string(),
            status,
            detail,
        });
    }

    pub fn ok(&mut self, name: &str) {
        self.step(name, StepStatus::Ok, None);
    }

    pub fn warn(&mut self, name: &str, detail: impl Into<String>) {
        self.step(name, StepStatus::Warning, Some(detail.into()));
    }

    pub fn fail(&mut self, name: &str, detail: impl Into<String>) {
        self.step(name, StepStatus::Failed, Some(detail.into()));
    }

    pub fn insert(&mut self, key: &str, value: impl Serialize) -> Result<()> {
        self.data.insert(key.to_string(), serde_json::to_value(value)?);
        Ok(())
    }

    /// Warnings don't fail a command; any failed step does.
    pub fn succeeded(&self) -> bool {
        self.steps.iter().all(|s| s.status != StepStatus::Failed)
    }

    pub fn exit_code(&self) -> u8 {
        if self.succeeded() {
            0
        } else {
            1
        }
    }

    pub fn render(&self, json: bool) -> Result<String> {
        if json {
            return Ok(serde_json::to_string_pretty(&JsonOut {
                ok: self.succeeded(),
                data: self,
            })?);
        }

        let mut out = self.lines.join("\n");
        for step in &self.steps {
            let label = match step.status {
                StepStatus::Ok => continue,
                StepStatus::Warning => "warning",
                StepStatus::Failed => "error",
            };
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!(
                "{label}: {}: {}",
                step.name,
                step.detail.as_deref().unwrap_or("")
            ));
        }
        Ok(out)
    }
}

pub fn energy_lines(title: &str, usage: &EnergyUsage, per_unit_label: Option<&str>) -> Vec<String> {
    let mut lines = vec![
        format!("--- {title} ---"),
        format!("Total kWh: {:.6}", usage.total_kwh),
        format!("CO2 Emissions (kg): {:.6}", usage.co2_emissions_kg),
    ];
    if let (Some(label), Some(per_unit)) = (per_unit_label, usage.wh_per_unit) {
        lines.push(format!("Watt-hours / {label}: {per_unit:.6}"));
    }
    lines
}
