//! Erfahrungsspeicher für das Lernen aus Wiederholung.
//!
//! [`ReplayMemory`] ist ein einfacher FIFO-Ringpuffer mit gleichverteilter
//! Stichprobe. [`PrioritizedReplayMemory`] zieht Übergänge proportional zu
//! `priority^alpha` und liefert Importance-Sampling-Gewichte zur
//! Bias-Korrektur. Beide erfüllen denselben Vertrag [`ExperienceStore`].

use heillern_core::Transition;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::error::{AgentError, Result};

/// Wird vor dem Potenzieren auf jede aktualisierte Priorität addiert, damit
/// kein Eintrag dauerhaft unziehbar wird.
pub const PRIORITY_EPSILON: f32 = 1e-6;

/// Eine gezogene Stichprobe samt Pufferindizes und normierten Gewichten.
#[derive(Debug, Clone)]
pub struct SampledBatch {
    pub transitions: Vec<Transition>,
    pub indices: Vec<usize>,
    /// Importance-Sampling-Gewichte in `(0, 1]`, Maximum genau 1.
    pub weights: Vec<f32>,
}

impl SampledBatch {
    fn empty() -> Self {
        Self {
            transitions: Vec::new(),
            indices: Vec::new(),
            weights: Vec::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}

/// Gemeinsamer Vertrag der Erfahrungsspeicher.
pub trait ExperienceStore {
    /// Legt einen Übergang ab; volle Speicher verdrängen den ältesten Eintrag.
    fn push(&mut self, transition: Transition, priority: f32) -> Result<()>;

    /// Zieht `batch_size` Übergänge. Schlägt mit
    /// [`AgentError::InsufficientSamples`] fehl, solange weniger gespeichert sind.
    fn sample<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Result<SampledBatch>;

    /// Setzt neue Prioritäten für zuvor gezogene Indizes.
    fn update_priorities(&mut self, indices: &[usize], priorities: &[f32]) -> Result<()>;

    fn len(&self) -> usize;

    fn capacity(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn check_priority(priority: f32) -> Result<()> {
    if priority.is_finite() && priority >= 0.0 {
        Ok(())
    } else {
        Err(AgentError::InvalidPriority(priority))
    }
}

/// FIFO-Puffer fester Kapazität mit gleichverteilter Stichprobe ohne Zurücklegen.
#[derive(Debug, Clone)]
pub struct ReplayMemory {
    memory: VecDeque<Transition>,
    capacity: usize,
}

impl ReplayMemory {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            memory: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.memory.iter()
    }
}

impl ExperienceStore for ReplayMemory {
    fn push(&mut self, transition: Transition, _priority: f32) -> Result<()> {
        if self.memory.len() >= self.capacity {
            self.memory.pop_front();
        }
        self.memory.push_back(transition);
        Ok(())
    }

    fn sample<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Result<SampledBatch> {
        if self.memory.len() < batch_size {
            return Err(AgentError::InsufficientSamples {
                available: self.memory.len(),
                requested: batch_size,
            });
        }
        let indices = rand::seq::index::sample(rng, self.memory.len(), batch_size).into_vec();
        let transitions = indices.iter().map(|&i| self.memory[i].clone()).collect();
        Ok(SampledBatch {
            transitions,
            weights: vec![1.0; indices.len()],
            indices,
        })
    }

    fn update_priorities(&mut self, _indices: &[usize], _priorities: &[f32]) -> Result<()> {
        Ok(())
    }

    fn len(&self) -> usize {
        self.memory.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Exportierbarer Inhalt eines [`PrioritizedReplayMemory`]; Einträge und
/// Prioritäten stehen in gleicher Reihenfolge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplaySnapshot {
    pub capacity: usize,
    pub alpha: f32,
    pub position: usize,
    #[serde(default = "default_beta")]
    pub beta: f32,
    pub entries: Vec<Transition>,
    /// Bereits potenzierte Prioritäten.
    pub priorities: Vec<f32>,
}

fn default_beta() -> f32 {
    PrioritizedReplayMemory::DEFAULT_BETA
}

/// Ringpuffer mit Prioritäten.
///
/// Übergang und (potenzierte) Priorität liegen als Paar in einem Vektor und
/// werden über denselben Schreibzeiger adressiert, sodass beide Längen nie
/// auseinanderlaufen.
#[derive(Debug, Clone)]
pub struct PrioritizedReplayMemory {
    entries: Vec<(Transition, f32)>,
    capacity: usize,
    position: usize,
    alpha: f32,
    beta: f32,
}

impl PrioritizedReplayMemory {
    /// Standardexponent für Prioritäten.
    pub const DEFAULT_ALPHA: f32 = 0.6;
    /// Standardexponent der Importance-Sampling-Korrektur.
    pub const DEFAULT_BETA: f32 = 0.4;

    #[must_use]
    pub fn new(capacity: usize, alpha: f32) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Vec::with_capacity(capacity.min(4096)),
            capacity,
            position: 0,
            alpha,
            beta: Self::DEFAULT_BETA,
        }
    }

    #[must_use]
    pub fn with_beta(mut self, beta: f32) -> Self {
        self.beta = beta;
        self
    }

    #[must_use]
    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    #[must_use]
    pub fn beta(&self) -> f32 {
        self.beta
    }

    /// Nächste Schreibposition.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Transition> {
        self.entries.get(index).map(|(t, _)| t)
    }

    /// Gespeicherte, bereits potenzierte Prioritäten.
    #[must_use]
    pub fn priorities(&self) -> Vec<f32> {
        self.entries.iter().map(|(_, p)| *p).collect()
    }

    /// Ziehwahrscheinlichkeiten. Summieren sich die Prioritäten zu null,
    /// wird gleichverteilt gezogen.
    #[must_use]
    pub fn probabilities(&self) -> Vec<f64> {
        let n = self.entries.len();
        let total: f64 = self.entries.iter().map(|(_, p)| f64::from(*p)).sum();
        if n == 0 {
            return Vec::new();
        }
        if !(total.is_finite() && total > 0.0) {
            #[allow(clippy::cast_precision_loss)]
            return vec![1.0 / n as f64; n];
        }
        self.entries
            .iter()
            .map(|(_, p)| f64::from(*p) / total)
            .collect()
    }

    /// Zieht mit Zurücklegen proportional zu den Prioritäten und berechnet
    /// die Gewichte `(N * p_i)^(-beta)`, normiert auf ihr Maximum.
    pub fn sample_with_beta<R: Rng + ?Sized>(
        &self,
        batch_size: usize,
        beta: f32,
        rng: &mut R,
    ) -> Result<SampledBatch> {
        let n = self.entries.len();
        if n < batch_size {
            return Err(AgentError::InsufficientSamples {
                available: n,
                requested: batch_size,
            });
        }
        if batch_size == 0 {
            return Ok(SampledBatch::empty());
        }

        let probabilities = self.probabilities();
        let indices: Vec<usize> = match WeightedIndex::new(&probabilities) {
            Ok(dist) => (0..batch_size).map(|_| dist.sample(rng)).collect(),
            Err(_) => (0..batch_size).map(|_| rng.gen_range(0..n)).collect(),
        };

        #[allow(clippy::cast_precision_loss)]
        let n_f = n as f64;
        let raw: Vec<f64> = indices
            .iter()
            .map(|&i| (n_f * probabilities[i]).powf(-f64::from(beta)))
            .collect();
        let max = raw.iter().copied().fold(0.0_f64, f64::max);
        #[allow(clippy::cast_possible_truncation)]
        let weights = if max.is_finite() && max > 0.0 {
            raw.iter().map(|w| (w / max) as f32).collect()
        } else {
            vec![1.0; raw.len()]
        };

        Ok(SampledBatch {
            transitions: indices.iter().map(|&i| self.entries[i].0.clone()).collect(),
            indices,
            weights,
        })
    }

    #[must_use]
    pub fn snapshot(&self) -> ReplaySnapshot {
        ReplaySnapshot {
            capacity: self.capacity,
            alpha: self.alpha,
            position: self.position,
            beta: self.beta,
            entries: self.entries.iter().map(|(t, _)| t.clone()).collect(),
            priorities: self.priorities(),
        }
    }

    /// Baut einen Speicher aus einem Snapshot.
    ///
    /// Auseinanderlaufende Listen gelten als beschädigter Puffer, ebenso ein
    /// Schreibzeiger außerhalb der Kapazität oder, solange der Puffer nicht
    /// voll ist, ein Zeiger ungleich der Eintragszahl.
    pub fn restore(snapshot: ReplaySnapshot) -> Result<Self> {
        let ReplaySnapshot {
            capacity,
            alpha,
            position,
            beta,
            entries,
            priorities,
        } = snapshot;
        let capacity = capacity.max(1);
        let len = entries.len();
        let cursor_ok = position < capacity && (len == capacity || position == len);
        if len != priorities.len() || len > capacity || !cursor_ok {
            return Err(AgentError::BufferCorrupted {
                entries: len,
                priorities: priorities.len(),
                position,
                capacity,
            });
        }
        for p in &priorities {
            check_priority(*p)?;
        }
        Ok(Self {
            entries: entries.into_iter().zip(priorities).collect(),
            capacity,
            position,
            alpha,
            beta,
        })
    }
}

impl ExperienceStore for PrioritizedReplayMemory {
    fn push(&mut self, transition: Transition, priority: f32) -> Result<()> {
        check_priority(priority)?;
        let scaled = priority.powf(self.alpha);
        if self.entries.len() < self.capacity {
            self.entries.push((transition, scaled));
        } else {
            self.entries[self.position] = (transition, scaled);
        }
        self.position = (self.position + 1) % self.capacity;
        Ok(())
    }

    fn sample<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Result<SampledBatch> {
        self.sample_with_beta(batch_size, self.beta, rng)
    }

    fn update_priorities(&mut self, indices: &[usize], priorities: &[f32]) -> Result<()> {
        if indices.len() != priorities.len() {
            return Err(AgentError::PriorityCountMismatch {
                indices: indices.len(),
                priorities: priorities.len(),
            });
        }
        let len = self.entries.len();
        for (&index, &priority) in indices.iter().zip(priorities) {
            if let Err(err) = check_priority(priority) {
                tracing::warn!(index, priority, "rejecting priority update");
                return Err(err);
            }
            let slot = self
                .entries
                .get_mut(index)
                .ok_or(AgentError::IndexOutOfBounds { index, len })?;
            slot.1 = (priority + PRIORITY_EPSILON).powf(self.alpha);
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}
