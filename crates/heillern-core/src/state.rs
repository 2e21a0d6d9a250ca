//! Zustandsmodell eines Entscheidungszeitpunkts.
//!
//! Ein [`State`] wird an jedem Entscheidungspunkt aus der jüngsten Messung neu
//! gebaut und danach nicht mehr verändert; für den Vorher/Nachher-Vergleich
//! entstehen zwei getrennte Zustände.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::action::Action;
use crate::error::{CoreError, Result};

/// Biomarker-Schlüssel für das subjektive Befinden (Umfragewert 0..100).
pub const SUBJECTIVE_WELLBEING: &str = "subjective_wellbeing";

/// Diskreter zeitlicher Kontext.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TemporalContext {
    /// Stunde 0..=23
    pub hour: u8,
    /// Wochentag 0..=6
    pub weekday: u8,
    /// Jahreszeit 0..=3
    pub season: u8,
}

impl TemporalContext {
    pub fn new(hour: u8, weekday: u8, season: u8) -> Result<Self> {
        if hour > 23 {
            return Err(CoreError::InvalidTemporalContext(format!("hour {hour}")));
        }
        if weekday > 6 {
            return Err(CoreError::InvalidTemporalContext(format!(
                "weekday {weekday}"
            )));
        }
        if season > 3 {
            return Err(CoreError::InvalidTemporalContext(format!("season {season}")));
        }
        Ok(Self {
            hour,
            weekday,
            season,
        })
    }

    /// Auf `[0, 1)` normierte Darstellung (Stunde/24, Tag/7, Saison/4).
    #[must_use]
    pub fn normalized(&self) -> [f32; 3] {
        [
            f32::from(self.hour) / 24.0,
            f32::from(self.weekday) / 7.0,
            f32::from(self.season) / 4.0,
        ]
    }
}

/// Vollständiger Zustand für eine Entscheidung.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// Aktuelles Signal-Embedding (zugleich der Fingerabdruck für den
    /// nutzerübergreifenden Abgleich).
    pub current_signal: Vec<f32>,
    /// Vergangene Embeddings, jüngstes zuletzt.
    #[serde(default)]
    pub signal_history: Vec<Vec<f32>>,
    #[serde(default)]
    pub user_profile: Vec<f32>,
    pub health_score: f32,
    #[serde(default)]
    pub biomarkers: BTreeMap<String, f32>,
    /// Frühere Empfehlungen samt erzielter Belohnung.
    #[serde(default)]
    pub action_history: Vec<(Action, f32)>,
    #[serde(default)]
    pub temporal: TemporalContext,
}

impl State {
    /// Minimaler Zustand aus einem Signal und einem Gesundheitswert.
    #[must_use]
    pub fn new(current_signal: Vec<f32>, health_score: f32) -> Self {
        Self {
            current_signal,
            signal_history: Vec::new(),
            user_profile: Vec::new(),
            health_score,
            biomarkers: BTreeMap::new(),
            action_history: Vec::new(),
            temporal: TemporalContext::default(),
        }
    }

    #[must_use]
    pub fn with_biomarker(mut self, name: &str, value: f32) -> Self {
        self.biomarkers.insert(name.to_string(), value);
        self
    }

    #[must_use]
    pub fn with_profile(mut self, profile: Vec<f32>) -> Self {
        self.user_profile = profile;
        self
    }

    #[must_use]
    pub fn with_temporal(mut self, temporal: TemporalContext) -> Self {
        self.temporal = temporal;
        self
    }

    /// Hängt ein Embedding an die Historie an und verwirft die ältesten
    /// Einträge jenseits von `max_len`.
    pub fn push_history(&mut self, embedding: Vec<f32>, max_len: usize) {
        self.signal_history.push(embedding);
        if self.signal_history.len() > max_len {
            let excess = self.signal_history.len() - max_len;
            self.signal_history.drain(..excess);
        }
    }

    #[must_use]
    pub fn biomarker_or(&self, name: &str, default: f32) -> f32 {
        self.biomarkers.get(name).copied().unwrap_or(default)
    }
}

/// Ein beobachteter Übergang für das Lernen aus Erfahrung.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub state: State,
    /// Globaler Aktionsindex
    pub action: usize,
    pub reward: f32,
    pub next_state: State,
    pub done: bool,
}

#[cfg(test)]
#[allow(clippy::expect_used)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn history_keeps_most_recent_entries() {
        let mut state = State::new(vec![0.0; 2], 50.0);
        for i in 0..5 {
            #[allow(clippy::cast_precision_loss)]
            state.push_history(vec![i as f32; 2], 3);
        }
        assert_eq!(state.signal_history.len(), 3);
        assert_eq!(state.signal_history[0], vec![2.0; 2]);
        assert_eq!(state.signal_history[2], vec![4.0; 2]);
    }

    #[test]
    fn temporal_context_is_validated() {
        assert!(TemporalContext::new(23, 6, 3).is_ok());
        assert!(TemporalContext::new(24, 0, 0).is_err());
        assert!(TemporalContext::new(0, 7, 0).is_err());
        assert!(TemporalContext::new(0, 0, 4).is_err());

        let ctx = TemporalContext::new(12, 0, 2).unwrap();
        assert_eq!(ctx.normalized(), [0.5, 0.0, 0.5]);
    }

    #[test]
    fn state_deserializes_with_optional_parts_missing() {
        let state: State = serde_json::from_str(
            r#"{ "current_signal": [0.1, 0.2], "health_score": 71.5,
                 "biomarkers": { "subjective_wellbeing": 64.0 } }"#,
        )
        .expect("minimal state should deserialize");
        assert_eq!(state.current_signal.len(), 2);
        assert!(state.signal_history.is_empty());
        assert!((state.biomarker_or(SUBJECTIVE_WELLBEING, 50.0) - 64.0).abs() < 1e-6);
        assert!((state.biomarker_or("lactate", 2.0) - 2.0).abs() < 1e-6);
    }
}
