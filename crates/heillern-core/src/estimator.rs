//! Schnittstellen zu den externen Modellen.
//!
//! Die Entscheidungs- und Lernlogik kennt das Zustandsmodell nur als
//! [`StateEncoder`] (Zustand → Vektor fester Länge) und die Wertschätzung nur
//! als [`ValueEstimator`] (Kodierung → Wert je Aktion). Jede Implementierung,
//! die diese Formen einhält, ist zulässig; [`FeatureEncoder`] und
//! [`LinearValueEstimator`] sind einfache Referenzimplementierungen.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::StateConfig;
use crate::error::{CoreError, Result};
use crate::state::State;

/// Übersetzt einen Zustand in einen Vektor fester Länge.
pub trait StateEncoder {
    fn output_dim(&self) -> usize;

    fn encode(&self, state: &State) -> Result<Vec<f32>>;

    fn encode_batch(&self, states: &[&State]) -> Result<Vec<Vec<f32>>> {
        states.iter().map(|s| self.encode(s)).collect()
    }
}

/// Bewertet jede Aktion für eine Zustandskodierung.
///
/// Die Parameter sind als flacher Vektor zugänglich, damit Gradientenschritt
/// und weiche Synchronisation des Zielschätzers unabhängig von der konkreten
/// Architektur bleiben.
pub trait ValueEstimator {
    fn input_dim(&self) -> usize;

    fn num_actions(&self) -> usize;

    /// Liefert genau `num_actions()` Werte.
    fn evaluate(&self, encoding: &[f32]) -> Result<Vec<f32>>;

    fn parameters(&self) -> &[f32];

    fn parameters_mut(&mut self) -> &mut [f32];

    /// Addiert `scale * ∂value[action]/∂θ` auf `grad`.
    fn accumulate_gradient(
        &self,
        encoding: &[f32],
        action: usize,
        scale: f32,
        grad: &mut [f32],
    ) -> Result<()>;
}

/// Index des größten Werts; NaN-Werte werden übergangen, bei Gleichstand
/// gewinnt der kleinste Index.
#[must_use]
pub fn argmax(values: &[f32]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .fold(None, |best: Option<(usize, f32)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

#[must_use]
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn check_dim(what: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(CoreError::DimensionMismatch {
            what,
            expected,
            actual,
        })
    }
}

/// Verkettet aktuelles Signal, Mittel der Historie, Profil, normierten
/// Zeitkontext und `health_score / 100`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureEncoder {
    signal_dim: usize,
    profile_dim: usize,
}

impl FeatureEncoder {
    #[must_use]
    pub fn new(config: &StateConfig) -> Self {
        Self {
            signal_dim: config.signal_dim,
            profile_dim: config.user_profile_dim,
        }
    }
}

impl StateEncoder for FeatureEncoder {
    fn output_dim(&self) -> usize {
        2 * self.signal_dim + self.profile_dim + 4
    }

    fn encode(&self, state: &State) -> Result<Vec<f32>> {
        check_dim("current_signal", self.signal_dim, state.current_signal.len())?;

        let mut out = Vec::with_capacity(self.output_dim());
        out.extend_from_slice(&state.current_signal);

        let mut history_mean = vec![0.0_f32; self.signal_dim];
        for past in &state.signal_history {
            check_dim("signal_history", self.signal_dim, past.len())?;
            for (acc, x) in history_mean.iter_mut().zip(past) {
                *acc += x;
            }
        }
        if !state.signal_history.is_empty() {
            #[allow(clippy::cast_precision_loss)]
            let n = state.signal_history.len() as f32;
            history_mean.iter_mut().for_each(|v| *v /= n);
        }
        out.extend_from_slice(&history_mean);

        // Ein fehlendes Profil wird als Nullvektor kodiert.
        if state.user_profile.is_empty() {
            out.extend(std::iter::repeat(0.0).take(self.profile_dim));
        } else {
            check_dim("user_profile", self.profile_dim, state.user_profile.len())?;
            out.extend_from_slice(&state.user_profile);
        }

        out.extend_from_slice(&state.temporal.normalized());
        out.push(state.health_score / 100.0);
        Ok(out)
    }
}

/// Ein affiner Kopf je Aktion: `value[a] = w_a · x + b_a`.
///
/// Parameterlayout: zuerst alle Gewichte zeilenweise (`a * input_dim + j`),
/// danach die `num_actions` Bias-Werte.
///
/// Beim Deserialisieren wird die Länge des Parameterblocks wie in
/// [`LinearValueEstimator::from_parameters`] geprüft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LinearParameters")]
pub struct LinearValueEstimator {
    input_dim: usize,
    num_actions: usize,
    params: Vec<f32>,
}

#[derive(Deserialize)]
struct LinearParameters {
    input_dim: usize,
    num_actions: usize,
    params: Vec<f32>,
}

impl TryFrom<LinearParameters> for LinearValueEstimator {
    type Error = CoreError;

    fn try_from(raw: LinearParameters) -> Result<Self> {
        Self::from_parameters(raw.input_dim, raw.num_actions, raw.params)
    }
}

impl LinearValueEstimator {
    /// Alle Parameter null.
    #[must_use]
    pub fn zeros(input_dim: usize, num_actions: usize) -> Self {
        Self {
            input_dim,
            num_actions,
            params: vec![0.0; num_actions * (input_dim + 1)],
        }
    }

    /// Gleichverteilte Initialisierung in `±1/sqrt(input_dim)`.
    pub fn random<R: Rng + ?Sized>(input_dim: usize, num_actions: usize, rng: &mut R) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let bound = 1.0 / (input_dim.max(1) as f32).sqrt();
        let params = (0..num_actions * (input_dim + 1))
            .map(|_| rng.gen_range(-bound..=bound))
            .collect();
        Self {
            input_dim,
            num_actions,
            params,
        }
    }

    /// Baut einen Schätzer aus einem gespeicherten Parameterblock.
    pub fn from_parameters(input_dim: usize, num_actions: usize, params: Vec<f32>) -> Result<Self> {
        check_dim("parameters", num_actions * (input_dim + 1), params.len())?;
        Ok(Self {
            input_dim,
            num_actions,
            params,
        })
    }

    fn bias_offset(&self) -> usize {
        self.num_actions * self.input_dim
    }
}

impl ValueEstimator for LinearValueEstimator {
    fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn num_actions(&self) -> usize {
        self.num_actions
    }

    fn evaluate(&self, encoding: &[f32]) -> Result<Vec<f32>> {
        check_dim("encoding", self.input_dim, encoding.len())?;
        let biases = &self.params[self.bias_offset()..];
        Ok(self
            .params
            .chunks_exact(self.input_dim.max(1))
            .take(self.num_actions)
            .zip(biases)
            .map(|(row, b)| {
                if self.input_dim == 0 {
                    *b
                } else {
                    row.iter().zip(encoding).map(|(w, x)| w * x).sum::<f32>() + b
                }
            })
            .collect())
    }

    fn parameters(&self) -> &[f32] {
        &self.params
    }

    fn parameters_mut(&mut self) -> &mut [f32] {
        &mut self.params
    }

    fn accumulate_gradient(
        &self,
        encoding: &[f32],
        action: usize,
        scale: f32,
        grad: &mut [f32],
    ) -> Result<()> {
        check_dim("encoding", self.input_dim, encoding.len())?;
        check_dim("gradient", self.params.len(), grad.len())?;
        if action >= self.num_actions {
            return Err(CoreError::ActionIndexOutOfRange {
                index: action,
                total: self.num_actions,
            });
        }
        let row = action * self.input_dim;
        for (g, x) in grad[row..row + self.input_dim].iter_mut().zip(encoding) {
            *g += scale * x;
        }
        grad[self.bias_offset() + action] += scale;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::state::TemporalContext;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn config() -> StateConfig {
        StateConfig {
            signal_dim: 3,
            history_length: 2,
            user_profile_dim: 2,
        }
    }

    #[test]
    fn argmax_prefers_first_maximum_and_skips_nan() {
        assert_eq!(argmax(&[0.1, 0.9, 0.9, 0.2]), Some(1));
        assert_eq!(argmax(&[f32::NAN, -1.0, -2.0]), Some(1));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn feature_encoder_layout() {
        let encoder = FeatureEncoder::new(&config());
        let mut state = State::new(vec![1.0, 2.0, 3.0], 80.0)
            .with_profile(vec![0.5, -0.5])
            .with_temporal(TemporalContext::new(6, 0, 2).unwrap());
        state.push_history(vec![0.0, 0.0, 0.0], 2);
        state.push_history(vec![2.0, 4.0, 6.0], 2);

        let enc = encoder.encode(&state).unwrap();
        assert_eq!(enc.len(), encoder.output_dim());
        assert_eq!(&enc[..3], &[1.0, 2.0, 3.0]);
        assert_eq!(&enc[3..6], &[1.0, 2.0, 3.0]);
        assert_eq!(&enc[6..8], &[0.5, -0.5]);
        assert_eq!(&enc[8..11], &[0.25, 0.0, 0.5]);
        assert!((enc[11] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn feature_encoder_rejects_wrong_signal_length() {
        let encoder = FeatureEncoder::new(&config());
        let state = State::new(vec![1.0; 4], 50.0);
        assert!(matches!(
            encoder.encode(&state),
            Err(CoreError::DimensionMismatch {
                what: "current_signal",
                ..
            })
        ));
    }

    #[test]
    fn linear_estimator_evaluates_affine_heads() {
        // two actions over two inputs
        let est =
            LinearValueEstimator::from_parameters(2, 2, vec![1.0, 0.0, 0.0, 2.0, 0.5, -1.0])
                .unwrap();
        let values = est.evaluate(&[3.0, 4.0]).unwrap();
        assert_eq!(values, vec![3.5, 7.0]);
    }

    #[test]
    fn linear_gradient_matches_finite_difference() {
        let mut rng = StdRng::seed_from_u64(11);
        let est = LinearValueEstimator::random(4, 3, &mut rng);
        let x = [0.3, -0.2, 0.8, 1.5];
        let mut grad = vec![0.0; est.parameters().len()];
        est.accumulate_gradient(&x, 2, 1.0, &mut grad).unwrap();

        let h = 1e-2;
        for i in 0..est.parameters().len() {
            let mut bumped = est.clone();
            bumped.parameters_mut()[i] += h;
            let numeric = (bumped.evaluate(&x).unwrap()[2] - est.evaluate(&x).unwrap()[2]) / h;
            assert!((numeric - grad[i]).abs() < 1e-2, "param {i}");
        }
    }

    #[test]
    fn from_parameters_checks_length() {
        assert!(LinearValueEstimator::from_parameters(2, 2, vec![0.0; 5]).is_err());
    }

    #[test]
    fn deserialization_checks_parameter_count() {
        let short = r#"{"input_dim":2,"num_actions":2,"params":[0.0]}"#;
        let err = serde_json::from_str::<LinearValueEstimator>(short)
            .expect_err("short parameter block must be rejected");
        assert!(err.to_string().contains("parameters"));

        let estimator =
            LinearValueEstimator::from_parameters(2, 2, vec![1.0, 0.0, 0.0, 1.0, 0.5, -0.5])
                .unwrap();
        let json = serde_json::to_string(&estimator).unwrap();
        let back: LinearValueEstimator = serde_json::from_str(&json).unwrap();
        assert_eq!(back, estimator);
        assert_eq!(back.evaluate(&[1.0, 1.0]).unwrap(), vec![1.5, 0.5]);
    }
}
