#![warn(clippy::unwrap_used, clippy::expect_used)]

//! Outcome digest and cross-user knowledge transfer.
//!
//! This crate turns observed outcomes into replay transitions and keeps an
//! index of successful interventions keyed by the signal fingerprint of the
//! user they worked for. A new user whose signal is nearly identical to a
//! stored fingerprint can be offered the same intervention directly.
//! It also hosts the offline [`hypothesis`] miner.
//!
//! The digest is not synchronized; concurrent sessions must serialize their
//! writes externally.

pub mod error;
pub mod hypothesis;
pub mod stats;

pub use error::{FeedbackError, Result};
pub use hypothesis::{Hypothesis, HypothesisGenerator, HypothesisStatus};
pub use stats::{cosine_similarity, pearson};

use heillern_agent::ExperienceStore;
use heillern_core::{Action, ActionCatalog, LearnerConfig, RewardCalculator, State, Transition};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// Added to `|reward|` so that zero-reward transitions can still be sampled.
const PRIORITY_OFFSET: f32 = 0.1;

const FALLBACK_TIMESTAMP: &str = "1970-01-01T00:00:00Z";

/// A successful outcome: the signal it was observed on and its reward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessRecord {
    pub fingerprint: Vec<f32>,
    pub reward: f32,
}

/// A stored success that resembles a query signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SuccessMatch {
    pub action_index: usize,
    pub similarity: f32,
    pub reward: f32,
    /// `reward * similarity`, the ranking key
    pub score: f32,
}

/// Scores outcomes, feeds the replay store and indexes successes.
#[derive(Debug)]
pub struct FeedbackDigest {
    reward: RewardCalculator,
    catalog: ActionCatalog,
    success_threshold: f32,
    similarity_threshold: f32,
    top_k: usize,
    max_per_action: usize,
    successes: BTreeMap<usize, VecDeque<SuccessRecord>>,
}

impl FeedbackDigest {
    pub fn new(config: &LearnerConfig) -> Result<Self> {
        config.validate()?;
        let feedback = &config.feedback;
        Ok(Self {
            reward: RewardCalculator::new(config.reward.clone())?,
            catalog: ActionCatalog::new(&config.actions),
            success_threshold: feedback.success_threshold,
            similarity_threshold: feedback.similarity_threshold,
            top_k: feedback.top_k,
            max_per_action: feedback.max_successes_per_action.max(1),
            successes: BTreeMap::new(),
        })
    }

    /// Score an outcome and push the resulting transition into `memory`.
    ///
    /// The transition is stored with priority `|reward| + 0.1`. Rewards
    /// strictly above the success threshold are additionally recorded under
    /// the action's index together with `state.current_signal`.
    pub fn process_outcome<S: ExperienceStore>(
        &mut self,
        memory: &mut S,
        state: &State,
        action: &Action,
        next_state: &State,
        adherence: f32,
    ) -> Result<f32> {
        let breakdown = self.reward.compute(state, next_state, action, adherence)?;
        let reward = breakdown.total;
        let action_index = self.catalog.action_to_index(action)?;

        memory.push(
            Transition {
                state: state.clone(),
                action: action_index,
                reward,
                next_state: next_state.clone(),
                done: false,
            },
            reward.abs() + PRIORITY_OFFSET,
        )?;

        if reward > self.success_threshold {
            self.record_success(action_index, state.current_signal.clone(), reward);
        }
        Ok(reward)
    }

    fn record_success(&mut self, action_index: usize, fingerprint: Vec<f32>, reward: f32) {
        let records = self.successes.entry(action_index).or_default();
        records.push_back(SuccessRecord {
            fingerprint,
            reward,
        });
        if records.len() > self.max_per_action {
            records.pop_front();
        }
        tracing::info!(
            action = action_index,
            reward,
            stored = records.len(),
            "recorded success"
        );
    }

    /// Stored successes whose fingerprint has cosine similarity above the
    /// threshold, best `reward * similarity` first, at most `top_k`.
    #[must_use]
    pub fn find_matching_successes(&self, signal: &[f32], top_k: usize) -> Vec<SuccessMatch> {
        let mut matches: Vec<SuccessMatch> = self
            .successes
            .iter()
            .flat_map(|(&action_index, records)| {
                records.iter().filter_map(move |record| {
                    let similarity = cosine_similarity(signal, &record.fingerprint);
                    (similarity > self.similarity_threshold).then(|| SuccessMatch {
                        action_index,
                        similarity,
                        reward: record.reward,
                        score: record.reward * similarity,
                    })
                })
            })
            .collect();

        // stable: equal scores keep index order
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(top_k);
        matches
    }

    /// Like [`Self::find_matching_successes`] with the configured `top_k`.
    #[must_use]
    pub fn matching_successes(&self, signal: &[f32]) -> Vec<SuccessMatch> {
        self.find_matching_successes(signal, self.top_k)
    }

    /// Matching successes materialized as actions. The confidence of each
    /// action is the similarity of its match; duplicates are dropped.
    pub fn transfer_actions(&self, signal: &[f32], top_k: usize) -> Result<Vec<Action>> {
        let mut seen = Vec::new();
        let mut actions = Vec::new();
        for m in self.find_matching_successes(signal, top_k) {
            if seen.contains(&m.action_index) {
                continue;
            }
            seen.push(m.action_index);
            let action = self
                .catalog
                .index_to_action(m.action_index, m.similarity)?
                .with_reasoning(format!(
                    "Worked for a user with a similar signal profile (similarity {:.2}, reward {:.2}).",
                    m.similarity, m.reward
                ));
            actions.push(action);
        }
        Ok(actions)
    }

    /// Recorded successes for one action, oldest first.
    pub fn successes_for(&self, action_index: usize) -> impl Iterator<Item = &SuccessRecord> {
        self.successes.get(&action_index).into_iter().flatten()
    }

    /// Total number of recorded successes across all actions.
    #[must_use]
    pub fn success_count(&self) -> usize {
        self.successes.values().map(VecDeque::len).sum()
    }

    #[must_use]
    pub fn catalog(&self) -> &ActionCatalog {
        &self.catalog
    }

    #[must_use]
    pub fn success_threshold(&self) -> f32 {
        self.success_threshold
    }
}

pub(crate) fn iso8601_now() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| FALLBACK_TIMESTAMP.to_string())
}

#[cfg(test)]
#[allow(clippy::expect_used)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use heillern_agent::PrioritizedReplayMemory;
    use heillern_core::config::FeedbackConfig;

    fn digest(max_per_action: usize) -> FeedbackDigest {
        let config = LearnerConfig {
            feedback: FeedbackConfig {
                max_successes_per_action: max_per_action,
                ..FeedbackConfig::default()
            },
            ..LearnerConfig::default()
        };
        FeedbackDigest::new(&config).unwrap()
    }

    #[test]
    fn matches_exclude_dissimilar_signals() {
        let mut d = digest(10);
        d.record_success(0, vec![1.0, 0.0, 0.0], 0.9);
        d.record_success(1, vec![0.0, 1.0, 0.0], 0.9);
        d.record_success(2, vec![0.8, 0.6, 0.0], 0.9);

        let found = d.find_matching_successes(&[1.0, 0.0, 0.0], 10);
        // [0.8, 0.6, 0] has similarity 0.8, which is not above the threshold
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].action_index, 0);
        assert!(found.iter().all(|m| m.similarity > 0.8));
    }

    #[test]
    fn higher_reward_ranks_first_at_equal_similarity() {
        let mut d = digest(10);
        d.record_success(3, vec![1.0, 1.0], 0.6);
        d.record_success(4, vec![1.0, 1.0], 0.9);
        d.record_success(5, vec![1.0, 0.9], 0.7);

        let found = d.find_matching_successes(&[1.0, 1.0], 2);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].action_index, 4);
        assert!(found[0].score >= found[1].score);
        assert!((found[0].score - found[0].reward * found[0].similarity).abs() < 1e-6);
    }

    #[test]
    fn success_list_is_capped_per_action() {
        let mut d = digest(2);
        for reward in [0.6, 0.7, 0.8] {
            d.record_success(7, vec![1.0], reward);
        }
        let rewards: Vec<f32> = d.successes_for(7).map(|r| r.reward).collect();
        assert_eq!(rewards, vec![0.7, 0.8]);
        assert_eq!(d.success_count(), 2);
    }

    #[test]
    fn transfer_yields_catalog_actions() {
        let mut d = digest(10);
        d.record_success(1, vec![0.5, 0.5], 0.9);
        d.record_success(1, vec![0.5, 0.49], 0.8);
        d.record_success(0, vec![-0.5, 0.5], 0.9);

        let actions = d.transfer_actions(&[0.5, 0.5], 5).unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].name, "Zinc Chelate");
        assert!(actions[0].reasoning.contains("similar signal"));
        assert!(actions[0].confidence > 0.99);
    }

    #[test]
    fn outcome_feeds_memory_with_offset_priority() {
        let mut d = digest(10);
        let mut memory = PrioritizedReplayMemory::new(8, 1.0);
        let state = State::new(vec![0.1, 0.2], 60.0);
        let action = d.catalog().index_to_action(0, 0.5).unwrap();

        let reward = d
            .process_outcome(&mut memory, &state, &action, &state, 0.0)
            .unwrap();

        assert!(reward.abs() < 1e-7);
        assert_eq!(memory.len(), 1);
        assert!((memory.priorities()[0] - PRIORITY_OFFSET).abs() < 1e-6);
        assert_eq!(d.success_count(), 0);
    }

    #[test]
    fn invalid_adherence_is_rejected_before_push() {
        let mut d = digest(10);
        let mut memory = PrioritizedReplayMemory::new(8, 0.6);
        let state = State::new(vec![0.1], 60.0);
        let action = d.catalog().index_to_action(0, 0.5).unwrap();

        assert!(d
            .process_outcome(&mut memory, &state, &action, &state, 1.5)
            .is_err());
        assert!(memory.is_empty());
    }
}
