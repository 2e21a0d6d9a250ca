#![warn(clippy::unwrap_used, clippy::expect_used)]

//! Kerntypen für heillern: Aktionskatalog, Zustandsmodell, Belohnung,
//! Konfiguration und die Schnittstellen zu den externen Modellen.

pub mod action;
pub mod config;
pub mod context;
pub mod error;
pub mod estimator;
pub mod reward;
pub mod state;

pub use action::{Action, ActionCatalog, ActionCategory};
pub use config::LearnerConfig;
pub use error::{CoreError, Result};
pub use estimator::{FeatureEncoder, LinearValueEstimator, StateEncoder, ValueEstimator};
pub use reward::{RewardBreakdown, RewardCalculator};
pub use state::{State, TemporalContext, Transition};

use serde_json::Value;

/// Eine Entscheidungsstrategie über Gesundheitszustände.
pub trait Policy {
    /// Wählt eine Empfehlung für den gegebenen Zustand.
    fn select_action(&mut self, state: &State) -> Result<Action>;
    /// Persistiert den lernbaren Zustand als JSON.
    fn snapshot(&self) -> Value;
    /// Stellt den Zustand aus einem Snapshot wieder her.
    fn load(&mut self, snapshot: Value) -> Result<()>;
}
