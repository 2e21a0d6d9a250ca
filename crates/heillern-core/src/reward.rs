//! Belohnungsfunktion: objektive Signalverbesserung, subjektives Befinden und
//! Therapietreue werden zu einem Skalar kombiniert.

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::config::RewardWeights;
use crate::error::{CoreError, Result};
use crate::state::{State, SUBJECTIVE_WELLBEING};

/// Skala, mit der die Differenz der Gesundheitswerte vor `tanh` geteilt wird.
const HEALTH_DELTA_SCALE: f32 = 10.0;
/// Skala für die Differenz des subjektiven Befindens.
const SUBJECTIVE_DELTA_SCALE: f32 = 20.0;
/// Annahme, wenn kein Umfragewert vorliegt.
const SUBJECTIVE_DEFAULT: f32 = 50.0;
/// Maximaler Bonus bei perfekter Therapietreue.
const ADHERENCE_BONUS_SCALE: f32 = 0.2;

/// Einzelkomponenten und gewichtete Summe einer Belohnung.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardBreakdown {
    pub signal_improvement: f32,
    pub subjective_improvement: f32,
    pub adherence_bonus: f32,
    pub total: f32,
}

/// Reine Funktion über (vorher, nachher, Aktion, Therapietreue).
#[derive(Debug, Clone)]
pub struct RewardCalculator {
    weights: RewardWeights,
}

impl RewardCalculator {
    /// Lehnt nicht-endliche oder negative Gewichte ab. Eine Summe ungleich 1
    /// ist erlaubt, wird aber protokolliert.
    pub fn new(weights: RewardWeights) -> Result<Self> {
        for w in [
            weights.signal_improvement_weight,
            weights.subjective_condition_weight,
            weights.adherence_bonus_weight,
        ] {
            if !(w.is_finite() && w >= 0.0) {
                return Err(CoreError::InvalidConfig(format!(
                    "reward weight {w} must be finite and non-negative"
                )));
            }
        }
        let sum = weights.sum();
        if (sum - 1.0).abs() > 1e-3 {
            tracing::warn!(sum, "reward weights do not sum to 1; totals are not normalized");
        }
        Ok(Self { weights })
    }

    #[must_use]
    pub fn weights(&self) -> &RewardWeights {
        &self.weights
    }

    /// Obere Schranke für `|total|` bei den konfigurierten Gewichten.
    #[must_use]
    pub fn max_abs_total(&self) -> f32 {
        self.weights.signal_improvement_weight
            + self.weights.subjective_condition_weight
            + self.weights.adherence_bonus_weight * ADHERENCE_BONUS_SCALE
    }

    pub fn compute(
        &self,
        prev: &State,
        curr: &State,
        _action: &Action,
        adherence: f32,
    ) -> Result<RewardBreakdown> {
        if !(0.0..=1.0).contains(&adherence) {
            return Err(CoreError::InvalidAdherence(adherence));
        }

        let signal_improvement =
            ((curr.health_score - prev.health_score) / HEALTH_DELTA_SCALE).tanh();

        let subjective_delta = curr.biomarker_or(SUBJECTIVE_WELLBEING, SUBJECTIVE_DEFAULT)
            - prev.biomarker_or(SUBJECTIVE_WELLBEING, SUBJECTIVE_DEFAULT);
        let subjective_improvement = (subjective_delta / SUBJECTIVE_DELTA_SCALE).tanh();

        let adherence_bonus = adherence * ADHERENCE_BONUS_SCALE;

        let total = self.weights.signal_improvement_weight * signal_improvement
            + self.weights.subjective_condition_weight * subjective_improvement
            + self.weights.adherence_bonus_weight * adherence_bonus;

        Ok(RewardBreakdown {
            signal_improvement,
            subjective_improvement,
            adherence_bonus,
            total,
        })
    }
}
