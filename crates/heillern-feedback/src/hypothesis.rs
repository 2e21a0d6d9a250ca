//! Correlation-based hypothesis discovery.
//!
//! The generator mines Pearson correlations between external variables (air
//! quality, temperature, ...) and individual signal dimensions and turns strong
//! ones into [`Hypothesis`] records with a proposed intervention. It proposes;
//! testing and confirming a hypothesis happens elsewhere.

use heillern_core::config::HypothesisConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{FeedbackError, Result};
use crate::iso8601_now;
use crate::stats::pearson;

/// Lifecycle of a hypothesis. Generated hypotheses start as `Proposed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HypothesisStatus {
    #[default]
    Proposed,
    Testing,
    Confirmed,
    Rejected,
}

/// A discovered association between an external variable and a signal feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    /// Running identifier over the whole log (`hyp_0`, `hyp_1`, ...)
    pub id: String,
    /// External variable, e.g. "air_quality"
    pub independent_variable: String,
    /// Signal feature name
    pub dependent_variable: String,
    pub correlation: f64,
    pub sample_size: usize,
    pub statement: String,
    pub proposed_action: String,
    #[serde(default)]
    pub status: HypothesisStatus,
    /// Timestamp when the hypothesis was generated
    pub ts: String,
}

/// Discovers hypotheses and keeps a running, append-only log of them.
#[derive(Debug)]
pub struct HypothesisGenerator {
    min_sample_size: usize,
    min_correlation: f64,
    hypotheses: Vec<Hypothesis>,
}

impl Default for HypothesisGenerator {
    fn default() -> Self {
        Self::new(&HypothesisConfig::default())
    }
}

impl HypothesisGenerator {
    #[must_use]
    pub fn new(config: &HypothesisConfig) -> Self {
        Self {
            min_sample_size: config.min_sample_size,
            min_correlation: config.min_correlation.clamp(0.0, 1.0),
            hypotheses: Vec::new(),
        }
    }

    /// Correlate every external series with every signal dimension.
    ///
    /// Series whose length differs from the number of signal samples are
    /// skipped. Undefined correlations (constant series) never qualify.
    /// Results are sorted by descending `|r|` and appended to the log; the log
    /// is not deduplicated across calls.
    pub fn analyze_correlations(
        &mut self,
        signals: &[Vec<f32>],
        external: &BTreeMap<String, Vec<f64>>,
        feature_names: &[String],
    ) -> Result<Vec<Hypothesis>> {
        let Some(first) = signals.first() else {
            return Ok(Vec::new());
        };
        let dims = first.len();
        for (row, signal) in signals.iter().enumerate() {
            if signal.len() != dims {
                return Err(FeedbackError::RaggedSignals {
                    row,
                    expected: dims,
                    actual: signal.len(),
                });
            }
        }

        let sample_size = signals.len();
        if sample_size < self.min_sample_size {
            tracing::debug!(
                sample_size,
                min = self.min_sample_size,
                "too few samples for hypothesis discovery"
            );
            return Ok(Vec::new());
        }

        let columns: Vec<Vec<f64>> = (0..dims)
            .map(|d| signals.iter().map(|s| f64::from(s[d])).collect())
            .collect();

        let mut discovered = Vec::new();
        for (name, series) in external {
            if series.len() != sample_size {
                tracing::debug!(
                    variable = %name,
                    len = series.len(),
                    sample_size,
                    "skipping external series with mismatched length"
                );
                continue;
            }
            for (d, column) in columns.iter().enumerate() {
                let Some(r) = pearson(column, series) else {
                    continue;
                };
                if r.abs() < self.min_correlation {
                    continue;
                }
                let feature = feature_names
                    .get(d)
                    .cloned()
                    .unwrap_or_else(|| format!("feature_{d}"));
                discovered.push(Hypothesis {
                    id: String::new(),
                    statement: format!("'{name}' correlates with '{feature}' (r={r:.3})"),
                    proposed_action: propose_action(name, r),
                    independent_variable: name.clone(),
                    dependent_variable: feature,
                    correlation: r,
                    sample_size,
                    status: HypothesisStatus::Proposed,
                    ts: iso8601_now(),
                });
            }
        }

        discovered.sort_by(|a, b| b.correlation.abs().total_cmp(&a.correlation.abs()));
        let offset = self.hypotheses.len();
        for (i, hypothesis) in discovered.iter_mut().enumerate() {
            hypothesis.id = format!("hyp_{}", offset + i);
        }

        if !discovered.is_empty() {
            tracing::info!(
                count = discovered.len(),
                strongest = discovered[0].correlation,
                "discovered hypotheses"
            );
        }
        self.hypotheses.extend(discovered.iter().cloned());
        Ok(discovered)
    }

    /// All hypotheses generated so far, in discovery order.
    #[must_use]
    pub fn hypotheses(&self) -> &[Hypothesis] {
        &self.hypotheses
    }

    /// Advance a logged hypothesis. Returns `false` for unknown ids.
    pub fn update_status(&mut self, id: &str, status: HypothesisStatus) -> bool {
        match self.hypotheses.iter_mut().find(|h| h.id == id) {
            Some(h) => {
                h.status = status;
                true
            }
            None => false,
        }
    }
}

fn propose_action(variable: &str, correlation: f64) -> String {
    let direction = if correlation > 0.0 {
        "positively"
    } else {
        "negatively"
    };
    match variable {
        "air_quality" => {
            format!("Push 'Air Quality Alert' to users when levels {direction} affect signals.")
        }
        "temperature" => format!(
            "Adjust measurement calibration for temperature sensitivity ({direction} correlated)."
        ),
        "humidity" => format!(
            "Update EHD suction recommendations based on humidity ({direction} impact)."
        ),
        "exercise_level" => format!(
            "Personalize exercise recommendations based on signal response ({direction})."
        ),
        other => format!("Investigate {other} for potential intervention."),
    }
}
