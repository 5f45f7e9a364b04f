use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fs, path::Path};

use crate::settings::EdgeGuardSettings;

/// Differences below this are representation noise, not an accuracy drop
/// (0.85 - 0.82 is 0.030000000000000027 in f64).
const DROP_TOLERANCE: f64 = 1e-9;

/// Which side of the comparison a model is being evaluated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRole {
    Baseline,
    Candidate,
}

/// Produces an accuracy figure for a model on a dataset.
pub trait AccuracyEvaluator {
    fn evaluate(&self, model_id: &str, dataset_id: &str, role: ModelRole) -> Result<f64>;
}

/// Fixed figures standing in for real evaluation.
#[derive(Debug, Clone)]
pub struct SimulatedEvaluator {
    pub baseline_accuracy: f64,
    pub candidate_accuracy: f64,
}

impl Default for SimulatedEvaluator {
    fn default() -> Self {
        Self {
            baseline_accuracy: 0.85,
            candidate_accuracy: 0.82,
        }
    }
}

impl AccuracyEvaluator for SimulatedEvaluator {
    fn evaluate(&self, _model_id: &str, _dataset_id: &str, role: ModelRole) -> Result<f64> {
        Ok(match role {
            ModelRole::Baseline => self.baseline_accuracy,
            ModelRole::Candidate => self.candidate_accuracy,
        })
    }
}

/// Accuracies produced by an external evaluation job, stored as a JSON
/// object of model id -> accuracy.
#[derive(Debug, Clone)]
pub struct ReportFileEvaluator {
    accuracies: HashMap<String, f64>,
}

impl ReportFileEvaluator {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read accuracy report {}", path.display()))?;
        let accuracies: HashMap<String, f64> = serde_json::from_str(&raw)
            .with_context(|| format!("accuracy report {} is malformed", path.display()))?;
        Ok(Self { accuracies })
    }
}

impl AccuracyEvaluator for ReportFileEvaluator {
    fn evaluate(&self, model_id: &str, _dataset_id: &str, _role: ModelRole) -> Result<f64> {
        self.accuracies
            .get(model_id)
            .copied()
            .ok_or_else(|| anyhow!("no accuracy recorded for model '{model_id}'"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccuracyComparison {
    pub baseline_model: String,
    pub candidate_model: String,
    pub dataset: String,
    pub baseline_accuracy: f64,
    pub candidate_accuracy: f64,
    /// Baseline minus candidate. Negative when the candidate improved.
    pub accuracy_drop: f64,
    pub threshold: f64,
    pub alert_triggered: bool,
}

pub struct QuantizationChecker {
    evaluator: Box<dyn AccuracyEvaluator>,
}

impl QuantizationChecker {
    pub fn new(evaluator: Box<dyn AccuracyEvaluator>) -> Self {
        Self { evaluator }
    }

    /// Uses the configured accuracy report when there is one, simulated
    /// figures otherwise.
    pub fn from_settings(settings: &EdgeGuardSettings) -> Result<Self> {
        let evaluator: Box<dyn AccuracyEvaluator> = match &settings.accuracy_report {
            Some(path) => Box::new(ReportFileEvaluator::load(path)?),
            None => Box::new(SimulatedEvaluator::default()),
        };
        Ok(Self::new(evaluator))
    }

    pub fn compare(
        &self,
        baseline_id: &str,
        candidate_id: &str,
        dataset_id: &str,
        threshold: f64,
    ) -> Result<AccuracyComparison> {
        if !threshold.is_finite() || threshold < 0.0 {
            bail!("accuracy threshold must be a non-negative number, got {threshold}");
        }

        log::info!("[edgeguard] evaluating baseline '{baseline_id}' on '{dataset_id}'");
        let baseline_accuracy = self
            .evaluator
            .evaluate(baseline_id, dataset_id, ModelRole::Baseline)?;

        log::info!("[edgeguard] evaluating candidate '{candidate_id}' on '{dataset_id}'");
        let candidate_accuracy = self
            .evaluator
            .evaluate(candidate_id, dataset_id, ModelRole::Candidate)?;

        let accuracy_drop = baseline_accuracy - candidate_accuracy;
        let alert_triggered = accuracy_drop - threshold > DROP_TOLERANCE;

        if alert_triggered {
            log::warn!(
                "[edgeguard] accuracy drop ({accuracy_drop:.4}) exceeds threshold ({threshold:.4})"
            );
        } else {
            log::info!(
                "[edgeguard] accuracy drop ({accuracy_drop:.4}) is within threshold ({threshold:.4})"
            );
        }

        Ok(AccuracyComparison {
            baseline_model: baseline_id.to_string(),
            candidate_model: candidate_id.to_string(),
            dataset: dataset_id.to_string(),
            baseline_accuracy,
            candidate_accuracy,
            accuracy_drop,
            threshold,
            alert_triggered,
        })
    }
}

impl Default for QuantizationChecker {
    fn default() -> Self {
        Self::new(Box::new(SimulatedEvaluator::default()))
    }
}
