//! Configuration for the decision and learning loop.
//!
//! Every section is `#[serde(default)]`, so a JSON file only needs to name the
//! values it wants to override:
//!
//! ```json
//! { "training": { "batch_size": 64, "seed": 7 }, "feedback": { "top_k": 3 } }
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{CoreError, Result};

/// Top-level configuration shared by agent, feedback digest and hypothesis generator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnerConfig {
    pub state: StateConfig,
    pub actions: ActionSpaceConfig,
    pub reward: RewardWeights,
    pub training: TrainingConfig,
    pub feedback: FeedbackConfig,
    pub hypothesis: HypothesisConfig,
}

/// Shapes of the raw state components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Length of a signal embedding
    pub signal_dim: usize,
    /// Number of past embeddings kept in a state
    pub history_length: usize,
    /// Length of the user profile vector
    pub user_profile_dim: usize,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            signal_dim: 256,
            history_length: 7,
            user_profile_dim: 64,
        }
    }
}

/// Sizes of the four action categories, in catalog order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionSpaceConfig {
    pub num_nutrients: usize,
    pub num_exercises: usize,
    pub num_sleep_patterns: usize,
    pub num_lifestyle: usize,
}

impl Default for ActionSpaceConfig {
    fn default() -> Self {
        Self {
            num_nutrients: 50,
            num_exercises: 20,
            num_sleep_patterns: 10,
            num_lifestyle: 30,
        }
    }
}

impl ActionSpaceConfig {
    #[must_use]
    pub fn total(&self) -> usize {
        self.num_nutrients + self.num_exercises + self.num_sleep_patterns + self.num_lifestyle
    }
}

/// Weights of the three reward components.
///
/// These are tunables, not a probability split: nothing forces them to sum to 1,
/// and a total reward may leave the `(-1, 1)` range of the individual components
/// when they are set high.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardWeights {
    pub signal_improvement_weight: f32,
    pub subjective_condition_weight: f32,
    pub adherence_bonus_weight: f32,
}

impl Default for RewardWeights {
    fn default() -> Self {
        Self {
            signal_improvement_weight: 0.6,
            subjective_condition_weight: 0.3,
            adherence_bonus_weight: 0.1,
        }
    }
}

impl RewardWeights {
    #[must_use]
    pub fn sum(&self) -> f32 {
        self.signal_improvement_weight
            + self.subjective_condition_weight
            + self.adherence_bonus_weight
    }
}

/// Hyperparameters of the learning step, replay memory and exploration schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub batch_size: usize,
    pub learning_rate: f32,
    /// Discount factor
    pub gamma: f32,
    /// Soft update coefficient for the target estimator
    pub tau: f32,
    /// Ceiling for the gradient norm
    pub grad_clip: f32,
    /// Replay memory capacity
    pub memory_size: usize,
    /// Exponent applied to priorities on insertion
    pub priority_alpha: f32,
    /// Exponent of the importance-sampling correction
    pub importance_beta: f32,
    pub epsilon_start: f32,
    pub epsilon_end: f32,
    pub epsilon_decay: f32,
    /// Seed for exploration and sampling; `None` draws from OS entropy
    pub seed: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            learning_rate: 3e-4,
            gamma: 0.99,
            tau: 0.005,
            grad_clip: 1.0,
            memory_size: 100_000,
            priority_alpha: 0.6,
            importance_beta: 0.4,
            epsilon_start: 1.0,
            epsilon_end: 0.01,
            epsilon_decay: 0.995,
            seed: None,
        }
    }
}

/// Thresholds for cross-user success transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// Rewards strictly above this value are recorded as successes
    pub success_threshold: f32,
    /// Cosine similarity a stored fingerprint must exceed to match
    pub similarity_threshold: f32,
    pub top_k: usize,
    /// Oldest successes of an action are evicted beyond this count
    pub max_successes_per_action: usize,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            success_threshold: 0.5,
            similarity_threshold: 0.8,
            top_k: 5,
            max_successes_per_action: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HypothesisConfig {
    pub min_sample_size: usize,
    pub min_correlation: f64,
}

impl Default for HypothesisConfig {
    fn default() -> Self {
        Self {
            min_sample_size: 100,
            min_correlation: 0.5,
        }
    }
}

impl LearnerConfig {
    /// Parse and validate a configuration from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Reject configurations the learning loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.actions.total() == 0 {
            return Err(invalid("action space is empty"));
        }
        if self.state.signal_dim == 0 {
            return Err(invalid("signal_dim must be positive"));
        }

        let t = &self.training;
        if t.batch_size == 0 {
            return Err(invalid("batch_size must be positive"));
        }
        if t.memory_size == 0 {
            return Err(invalid("memory_size must be positive"));
        }
        for (name, value) in [
            ("gamma", t.gamma),
            ("tau", t.tau),
            ("epsilon_start", t.epsilon_start),
            ("epsilon_end", t.epsilon_end),
            ("epsilon_decay", t.epsilon_decay),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(&format!("{name} must lie in [0, 1], got {value}")));
            }
        }
        if t.epsilon_end > t.epsilon_start {
            return Err(invalid("epsilon_end must not exceed epsilon_start"));
        }
        if !(t.learning_rate.is_finite() && t.learning_rate > 0.0) {
            return Err(invalid("learning_rate must be positive"));
        }
        if !(t.grad_clip.is_finite() && t.grad_clip > 0.0) {
            return Err(invalid("grad_clip must be positive"));
        }
        if !(t.priority_alpha.is_finite() && t.priority_alpha >= 0.0) {
            return Err(invalid("priority_alpha must be non-negative"));
        }
        if !(t.importance_beta.is_finite() && t.importance_beta >= 0.0) {
            return Err(invalid("importance_beta must be non-negative"));
        }

        for (name, weight) in [
            ("signal_improvement_weight", self.reward.signal_improvement_weight),
            ("subjective_condition_weight", self.reward.subjective_condition_weight),
            ("adherence_bonus_weight", self.reward.adherence_bonus_weight),
        ] {
            if !(weight.is_finite() && weight >= 0.0) {
                return Err(invalid(&format!("{name} must be finite and non-negative")));
            }
        }

        if self.feedback.max_successes_per_action == 0 {
            return Err(invalid("max_successes_per_action must be positive"));
        }
        if !(-1.0..=1.0).contains(&self.feedback.similarity_threshold) {
            return Err(invalid("similarity_threshold must lie in [-1, 1]"));
        }
        if !(0.0..=1.0).contains(&self.hypothesis.min_correlation) {
            return Err(invalid("min_correlation must lie in [0, 1]"));
        }

        Ok(())
    }
}

fn invalid(msg: &str) -> CoreError {
    CoreError::InvalidConfig(msg.to_string())
}
