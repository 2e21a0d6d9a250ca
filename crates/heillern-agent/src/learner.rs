//! Double-Q-Lernschritt.
//!
//! Der Online-Schätzer wählt die beste Folgeaktion, der Zielschätzer bewertet
//! sie:
//!
//! ```text
//! a*     = argmax_a Q_online(s', a)
//! target = r + γ · Q_target(s', a*) · (1 − done)
//! ```
//!
//! Der Verlust ist ein mit den Importance-Sampling-Gewichten gewichteter
//! Smooth-L1-Verlust. Nach dem Gradientenschritt (mit Normbegrenzung) werden
//! die Prioritäten aus den TD-Fehlern erneuert und der Zielschätzer per
//! Polyak-Mittelung nachgeführt.

use heillern_core::estimator::argmax;
use heillern_core::{CoreError, StateEncoder, ValueEstimator};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::replay::ExperienceStore;

/// Kennzahlen eines ausgeführten Lernschritts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub loss: f32,
    pub mean_td_error: f32,
    /// Gradientennorm vor der Begrenzung.
    pub grad_norm: f32,
    /// Explorationsrate nach dem Schritt.
    pub epsilon: f32,
}

/// Ergebnis von [`crate::PrescriptionAgent::train_step`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrainOutcome {
    Trained(StepReport),
    /// Zu wenige Übergänge im Speicher; nichts wurde verändert.
    InsufficientData { available: usize, required: usize },
}

/// Smooth-L1 (Huber mit Schwelle 1).
#[must_use]
pub fn smooth_l1(diff: f32) -> f32 {
    if diff.abs() < 1.0 {
        0.5 * diff * diff
    } else {
        diff.abs() - 0.5
    }
}

/// Ableitung von [`smooth_l1`] nach `diff`.
#[must_use]
pub fn smooth_l1_grad(diff: f32) -> f32 {
    diff.clamp(-1.0, 1.0)
}

/// Double-Q-Ziel für einen Übergang.
pub fn double_q_target(
    reward: f32,
    gamma: f32,
    done: bool,
    online_next: &[f32],
    target_next: &[f32],
) -> Result<f32> {
    let best = argmax(online_next).ok_or(CoreError::ActionIndexOutOfRange {
        index: 0,
        total: online_next.len(),
    })?;
    let bootstrap = target_next
        .get(best)
        .copied()
        .ok_or(CoreError::DimensionMismatch {
            what: "target values",
            expected: online_next.len(),
            actual: target_next.len(),
        })?;
    let not_done = if done { 0.0 } else { 1.0 };
    Ok(reward + gamma * bootstrap * not_done)
}

/// Skaliert `grad` auf höchstens `max_norm` und liefert die ursprüngliche Norm.
pub fn clip_grad_norm(grad: &mut [f32], max_norm: f32) -> f32 {
    let norm = grad.iter().map(|g| g * g).sum::<f32>().sqrt();
    if norm > max_norm {
        let scale = max_norm / (norm + 1e-6);
        grad.iter_mut().for_each(|g| *g *= scale);
    }
    norm
}

/// `θ_target ← τ·θ_online + (1 − τ)·θ_target` für jeden Parameter.
pub fn soft_update<V: ValueEstimator>(target: &mut V, online: &V, tau: f32) -> Result<()> {
    let source = online.parameters();
    let dest = target.parameters_mut();
    if source.len() != dest.len() {
        return Err(CoreError::DimensionMismatch {
            what: "target parameters",
            expected: source.len(),
            actual: dest.len(),
        }
        .into());
    }
    for (t, o) in dest.iter_mut().zip(source) {
        *t = tau * o + (1.0 - tau) * *t;
    }
    Ok(())
}

/// Geometrischer Abfall mit Untergrenze.
#[must_use]
pub fn decay_epsilon(epsilon: f32, epsilon_end: f32, epsilon_decay: f32) -> f32 {
    (epsilon * epsilon_decay).max(epsilon_end)
}

/// Hyperparameter eines Lernschritts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DoubleQLearner {
    pub gamma: f32,
    pub tau: f32,
    pub learning_rate: f32,
    pub grad_clip: f32,
}

impl DoubleQLearner {
    /// Führt einen Lernschritt aus. `None`, solange der Speicher weniger als
    /// `batch_size` Einträge hält.
    ///
    /// Die zurückgegebene [`StepReport::epsilon`] ist `0.0`; die
    /// Explorationsrate verwaltet der Agent.
    pub fn step<E, V, S, R>(
        &self,
        encoder: &E,
        online: &mut V,
        target: &mut V,
        memory: &mut S,
        batch_size: usize,
        rng: &mut R,
    ) -> Result<Option<StepReport>>
    where
        E: StateEncoder,
        V: ValueEstimator,
        S: ExperienceStore,
        R: Rng + ?Sized,
    {
        if memory.len() < batch_size || batch_size == 0 {
            return Ok(None);
        }
        let batch = memory.sample(batch_size, rng)?;

        let states: Vec<_> = batch.transitions.iter().map(|t| &t.state).collect();
        let next_states: Vec<_> = batch.transitions.iter().map(|t| &t.next_state).collect();
        let encodings = encoder.encode_batch(&states)?;
        let next_encodings = encoder.encode_batch(&next_states)?;

        #[allow(clippy::cast_precision_loss)]
        let n = batch.len() as f32;
        let mut grad = vec![0.0_f32; online.parameters().len()];
        let mut td_errors = Vec::with_capacity(batch.len());
        let mut loss = 0.0_f32;

        for (i, transition) in batch.transitions.iter().enumerate() {
            let values = online.evaluate(&encodings[i])?;
            let current =
                values
                    .get(transition.action)
                    .copied()
                    .ok_or(CoreError::ActionIndexOutOfRange {
                        index: transition.action,
                        total: values.len(),
                    })?;

            let online_next = online.evaluate(&next_encodings[i])?;
            let target_next = target.evaluate(&next_encodings[i])?;
            let target_value = double_q_target(
                transition.reward,
                self.gamma,
                transition.done,
                &online_next,
                &target_next,
            )?;

            let diff = current - target_value;
            let weight = batch.weights[i];
            loss += weight * smooth_l1(diff);
            td_errors.push(diff.abs());
            online.accumulate_gradient(
                &encodings[i],
                transition.action,
                weight * smooth_l1_grad(diff) / n,
                &mut grad,
            )?;
        }
        loss /= n;

        let grad_norm = clip_grad_norm(&mut grad, self.grad_clip);
        for (p, g) in online.parameters_mut().iter_mut().zip(&grad) {
            *p -= self.learning_rate * g;
        }

        memory.update_priorities(&batch.indices, &td_errors)?;
        soft_update(target, online, self.tau)?;

        Ok(Some(StepReport {
            loss,
            mean_td_error: td_errors.iter().sum::<f32>() / n,
            grad_norm,
            epsilon: 0.0,
        }))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::replay::PrioritizedReplayMemory;
    use heillern_core::{LinearValueEstimator, State, Transition};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Uses the raw signal as encoding.
    struct SignalEncoder;

    impl StateEncoder for SignalEncoder {
        fn output_dim(&self) -> usize {
            1
        }

        fn encode(&self, state: &State) -> heillern_core::Result<Vec<f32>> {
            Ok(state.current_signal.clone())
        }
    }

    fn one_step_transition() -> Transition {
        Transition {
            state: State::new(vec![1.0], 50.0),
            action: 0,
            reward: 5.0,
            next_state: State::new(vec![1.0], 50.0),
            done: false,
        }
    }

    // w0, w1, b0, b1: Q(s) = [1, 2] for s = [1]
    fn online() -> LinearValueEstimator {
        LinearValueEstimator::from_parameters(1, 2, vec![1.0, 2.0, 0.0, 0.0]).unwrap()
    }

    fn distance(a: &[f32], b: &[f32]) -> f32 {
        a.iter()
            .zip(b)
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt()
    }

    #[test]
    fn smooth_l1_is_quadratic_then_linear() {
        assert!((smooth_l1(0.5) - 0.125).abs() < 1e-7);
        assert!((smooth_l1(-3.0) - 2.5).abs() < 1e-7);
        assert!((smooth_l1_grad(0.3) - 0.3).abs() < 1e-7);
        assert!((smooth_l1_grad(-4.0) + 1.0).abs() < 1e-7);
    }

    #[test]
    fn target_uses_online_choice_and_target_value() {
        let online_next = [0.1, 0.9, 0.3];
        let target_next = [5.0, 2.0, 7.0];
        let t = double_q_target(1.0, 0.5, false, &online_next, &target_next).unwrap();
        // online picks action 1, target evaluates it at 2.0
        assert!((t - 2.0).abs() < 1e-6);

        let terminal = double_q_target(1.0, 0.5, true, &online_next, &target_next).unwrap();
        assert!((terminal - 1.0).abs() < 1e-6);
    }

    #[test]
    fn clipping_bounds_the_norm() {
        let mut grad = vec![3.0, 4.0];
        let norm = clip_grad_norm(&mut grad, 1.0);
        assert!((norm - 5.0).abs() < 1e-6);
        let clipped = (grad[0] * grad[0] + grad[1] * grad[1]).sqrt();
        assert!(clipped <= 1.0 + 1e-5);

        let mut small = vec![0.1, 0.1];
        clip_grad_norm(&mut small, 1.0);
        assert_eq!(small, vec![0.1, 0.1]);
    }

    #[test]
    fn soft_update_converges_monotonically() {
        let online =
            LinearValueEstimator::from_parameters(2, 2, vec![1.0, -2.0, 3.0, 0.5, 4.0, -1.0])
                .unwrap();
        let mut target = LinearValueEstimator::zeros(2, 2);
        let mut last = distance(target.parameters(), online.parameters());
        for _ in 0..500 {
            soft_update(&mut target, &online, 0.005).unwrap();
            let d = distance(target.parameters(), online.parameters());
            assert!(d < last, "distance must shrink: {d} >= {last}");
            last = d;
        }
        let expected = 0.995_f32.powi(500)
            * distance(LinearValueEstimator::zeros(2, 2).parameters(), online.parameters());
        assert!((last - expected).abs() < 1e-2);
    }

    #[test]
    fn soft_update_rejects_shape_mismatch() {
        let online = LinearValueEstimator::zeros(2, 2);
        let mut target = LinearValueEstimator::zeros(3, 2);
        assert!(soft_update(&mut target, &online, 0.1).is_err());
    }

    #[test]
    fn epsilon_decays_to_floor() {
        let mut eps = 1.0;
        for _ in 0..2000 {
            let next = decay_epsilon(eps, 0.01, 0.995);
            assert!(next <= eps);
            eps = next;
        }
        assert!((eps - 0.01).abs() < 1e-7);
    }

    #[test]
    fn step_refreshes_priority_clips_update_and_moves_target() {
        let learner = DoubleQLearner {
            gamma: 0.5,
            tau: 0.1,
            learning_rate: 0.1,
            grad_clip: 0.5,
        };
        let mut online = online();
        let mut target = online.clone();
        let mut memory = PrioritizedReplayMemory::new(4, 0.5);
        memory.push(one_step_transition(), 1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(3);

        let report = learner
            .step(&SignalEncoder, &mut online, &mut target, &mut memory, 1, &mut rng)
            .unwrap()
            .expect("one entry suffices for batch size 1");

        // current 1, target 5 + 0.5 * 2 = 6
        assert!((report.mean_td_error - 5.0).abs() < 1e-6);
        assert!((report.loss - 4.5).abs() < 1e-6);
        assert!((report.grad_norm - 2.0_f32.sqrt()).abs() < 1e-6);

        let expected_priority = (5.0_f32 + crate::replay::PRIORITY_EPSILON).powf(0.5);
        assert!((memory.priorities()[0] - expected_priority).abs() < 1e-6);

        // raw gradient [-1, 0, -1, 0] clipped to norm 0.5, then scaled by lr
        let before = [1.0_f32, 2.0, 0.0, 0.0];
        let delta: Vec<f32> = online
            .parameters()
            .iter()
            .zip(before)
            .map(|(p, b)| p - b)
            .collect();
        let step = 0.1 * 0.5 / 2.0_f32.sqrt();
        assert!((delta[0] - step).abs() < 1e-5);
        assert!((delta[2] - step).abs() < 1e-5);
        assert!(delta[1].abs() < 1e-7 && delta[3].abs() < 1e-7);
        let delta_norm = delta.iter().map(|d| d * d).sum::<f32>().sqrt();
        assert!(delta_norm <= 0.1 * 0.5 + 1e-5);

        // Polyak: 0.1 * online + 0.9 * old target
        let expected_target: Vec<f32> = online
            .parameters()
            .iter()
            .zip(before)
            .map(|(o, t)| 0.1 * o + 0.9 * t)
            .collect();
        for (t, e) in target.parameters().iter().zip(&expected_target) {
            assert!((t - e).abs() < 1e-6);
        }
    }

    #[test]
    fn importance_weights_scale_loss_and_gradient() {
        let learner = DoubleQLearner {
            gamma: 0.5,
            tau: 0.0,
            learning_rate: 0.0,
            grad_clip: 100.0,
        };
        let mut online = online();
        let mut target = online.clone();
        let mut memory = PrioritizedReplayMemory::new(4, 1.0).with_beta(1.0);
        memory.push(one_step_transition(), 1.0).unwrap();
        memory.push(one_step_transition(), 4.0).unwrap();

        for seed in 0..8 {
            let mut rng = StdRng::seed_from_u64(seed);
            // same draw the step will make
            let weights = memory.sample(2, &mut rng.clone()).unwrap().weights;
            let mean_weight = weights.iter().sum::<f32>() / 2.0;

            let report = learner
                .step(&SignalEncoder, &mut online, &mut target, &mut memory, 2, &mut rng)
                .unwrap()
                .unwrap();
            // every sample has diff -5: smooth_l1 4.5, gradient -1 on w0 and b0
            assert!((report.loss - 4.5 * mean_weight).abs() < 1e-5);
            assert!((report.grad_norm - mean_weight * 2.0_f32.sqrt()).abs() < 1e-5);
        }
    }
}
