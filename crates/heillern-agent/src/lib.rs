#![warn(clippy::unwrap_used, clippy::expect_used)]

//! ε-greedy Verschreibungsagent mit priorisiertem Erfahrungsspeicher und
//! Double-Q-Lernschritt.
//!
//! Der [`PrescriptionAgent`] implementiert das [`Policy`]-Trait: Mit
//! Wahrscheinlichkeit `epsilon` wählt er eine zufällige Aktion, sonst die
//! Aktion mit dem höchsten geschätzten Wert. [`PrescriptionAgent::train_step`]
//! lernt aus dem Speicher und senkt danach `epsilon` geometrisch.
//!
//! Die Typen sind nicht synchronisiert. Teilen sich mehrere Sitzungen einen
//! Agenten, muss der Aufrufer Schreibzugriffe und Lernschritte serialisieren.

pub mod error;
pub mod learner;
pub mod replay;

pub use error::{AgentError, Result};
pub use learner::{DoubleQLearner, StepReport, TrainOutcome};
pub use replay::{
    ExperienceStore, PrioritizedReplayMemory, ReplayMemory, ReplaySnapshot, SampledBatch,
};

use heillern_core::action::reasoning_for;
use heillern_core::config::TrainingConfig;
use heillern_core::estimator::{argmax, sigmoid};
use heillern_core::{
    Action, ActionCatalog, CoreError, LearnerConfig, Policy, State, StateEncoder, Transition,
    ValueEstimator,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Persistierbarer Lernzustand des Agenten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct AgentSnapshot {
    epsilon: f32,
    steps: u64,
    online: Vec<f32>,
    target: Vec<f32>,
}

/// Lernender Verschreibungsagent.
#[derive(Debug)]
pub struct PrescriptionAgent<E, V, S = PrioritizedReplayMemory> {
    training: TrainingConfig,
    catalog: ActionCatalog,
    encoder: E,
    online: V,
    target: V,
    memory: S,
    learner: DoubleQLearner,
    epsilon: f32,
    steps: u64,
    rng: StdRng,
}

impl<E, V> PrescriptionAgent<E, V, PrioritizedReplayMemory>
where
    E: StateEncoder,
    V: ValueEstimator + Clone,
{
    /// Agent mit priorisiertem Speicher nach `config.training`.
    pub fn new(config: &LearnerConfig, encoder: E, online: V) -> Result<Self> {
        let memory = PrioritizedReplayMemory::new(
            config.training.memory_size,
            config.training.priority_alpha,
        )
        .with_beta(config.training.importance_beta);
        Self::with_memory(config, encoder, online, memory)
    }
}

impl<E, V, S> PrescriptionAgent<E, V, S>
where
    E: StateEncoder,
    V: ValueEstimator + Clone,
    S: ExperienceStore,
{
    /// Der Zielschätzer startet als Kopie des Online-Schätzers.
    pub fn with_memory(config: &LearnerConfig, encoder: E, online: V, memory: S) -> Result<Self> {
        config.validate()?;
        let catalog = ActionCatalog::new(&config.actions);
        if encoder.output_dim() != online.input_dim() {
            return Err(CoreError::DimensionMismatch {
                what: "estimator input",
                expected: encoder.output_dim(),
                actual: online.input_dim(),
            }
            .into());
        }
        if online.num_actions() != catalog.total() {
            return Err(CoreError::DimensionMismatch {
                what: "estimator actions",
                expected: catalog.total(),
                actual: online.num_actions(),
            }
            .into());
        }

        let training = config.training.clone();
        let rng = match training.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let learner = DoubleQLearner {
            gamma: training.gamma,
            tau: training.tau,
            learning_rate: training.learning_rate,
            grad_clip: training.grad_clip,
        };

        Ok(Self {
            epsilon: training.epsilon_start,
            training,
            catalog,
            encoder,
            target: online.clone(),
            online,
            memory,
            learner,
            steps: 0,
            rng,
        })
    }

    /// Wählt eine Empfehlung per ε-greedy über die Online-Werte.
    pub fn choose(&mut self, state: &State) -> Result<Action> {
        let encoding = self.encoder.encode(state)?;
        let values = self.online.evaluate(&encoding)?;
        if values.is_empty() {
            return Err(CoreError::ActionIndexOutOfRange { index: 0, total: 0 }.into());
        }

        let explore = self.rng.gen::<f32>() < self.epsilon;
        let index = match (explore, argmax(&values)) {
            (false, Some(best)) => best,
            // Auch bei ausschließlich NaN-Werten zufällig wählen.
            _ => self.rng.gen_range(0..values.len()),
        };

        let action = self
            .catalog
            .index_to_action(index, sigmoid(values[index]))?;
        let reasoning = reasoning_for(action.category, &mut self.rng);
        let action = action.with_reasoning(reasoning);
        tracing::debug!(
            index,
            explore,
            epsilon = self.epsilon,
            name = %action.name,
            "selected action"
        );
        Ok(action)
    }

    /// Ein Lernschritt; ohne ausreichend Daten ein No-op.
    pub fn train_step(&mut self) -> Result<TrainOutcome> {
        let required = self.training.batch_size;
        let report = self.learner.step(
            &self.encoder,
            &mut self.online,
            &mut self.target,
            &mut self.memory,
            required,
            &mut self.rng,
        )?;

        let Some(mut report) = report else {
            return Ok(TrainOutcome::InsufficientData {
                available: self.memory.len(),
                required,
            });
        };

        self.epsilon = learner::decay_epsilon(
            self.epsilon,
            self.training.epsilon_end,
            self.training.epsilon_decay,
        );
        self.steps += 1;
        report.epsilon = self.epsilon;
        tracing::debug!(
            step = self.steps,
            loss = report.loss,
            td_error = report.mean_td_error,
            grad_norm = report.grad_norm,
            epsilon = report.epsilon,
            "learning step"
        );
        Ok(TrainOutcome::Trained(report))
    }

    /// Legt einen Übergang mit Priorität im Speicher ab.
    pub fn remember(&mut self, transition: Transition, priority: f32) -> Result<()> {
        self.memory.push(transition, priority)
    }

    #[must_use]
    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    /// Anzahl ausgeführter Lernschritte.
    #[must_use]
    pub fn steps(&self) -> u64 {
        self.steps
    }

    #[must_use]
    pub fn catalog(&self) -> &ActionCatalog {
        &self.catalog
    }

    #[must_use]
    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    #[must_use]
    pub fn online(&self) -> &V {
        &self.online
    }

    #[must_use]
    pub fn target(&self) -> &V {
        &self.target
    }

    #[must_use]
    pub fn memory(&self) -> &S {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut S {
        &mut self.memory
    }
}

/// Kernfehler bleiben erhalten, alle übrigen werden als Strategiefehler gemeldet.
fn policy_error(err: AgentError) -> CoreError {
    match err {
        AgentError::Core(core) => core,
        other => CoreError::Policy(other.to_string()),
    }
}

impl<E, V, S> Policy for PrescriptionAgent<E, V, S>
where
    E: StateEncoder,
    V: ValueEstimator + Clone,
    S: ExperienceStore,
{
    fn select_action(&mut self, state: &State) -> heillern_core::Result<Action> {
        self.choose(state).map_err(policy_error)
    }

    /// Persistiert `epsilon`, Schrittzahl und beide Parameterblöcke.
    fn snapshot(&self) -> Value {
        let snapshot = AgentSnapshot {
            epsilon: self.epsilon,
            steps: self.steps,
            online: self.online.parameters().to_vec(),
            target: self.target.parameters().to_vec(),
        };
        serde_json::to_value(snapshot).unwrap_or(Value::Null)
    }

    fn load(&mut self, snapshot: Value) -> heillern_core::Result<()> {
        let snapshot: AgentSnapshot = serde_json::from_value(snapshot)?;
        for (what, blob, dest) in [
            ("online parameters", &snapshot.online, self.online.parameters()),
            ("target parameters", &snapshot.target, self.target.parameters()),
        ] {
            if blob.len() != dest.len() {
                return Err(CoreError::DimensionMismatch {
                    what,
                    expected: dest.len(),
                    actual: blob.len(),
                });
            }
        }
        self.online
            .parameters_mut()
            .copy_from_slice(&snapshot.online);
        self.target
            .parameters_mut()
            .copy_from_slice(&snapshot.target);
        // clamp auf [0.0, 1.0]
        self.epsilon = if snapshot.epsilon.is_finite() {
            snapshot.epsilon.clamp(0.0, 1.0)
        } else {
            self.training.epsilon_start
        };
        self.steps = snapshot.steps;
        Ok(())
    }
}
