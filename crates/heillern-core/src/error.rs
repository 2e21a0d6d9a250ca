use thiserror::Error;

use crate::action::ActionCategory;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Adherence must lie in [0, 1], got {0}")]
    InvalidAdherence(f32),
    #[error("Action index {index} outside of action space [0, {total})")]
    ActionIndexOutOfRange { index: usize, total: usize },
    #[error("Local id {local_id} exceeds the {category} range of size {size}")]
    UnknownLocalId {
        category: ActionCategory,
        local_id: usize,
        size: usize,
    },
    #[error("Dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("Invalid temporal context: {0}")]
    InvalidTemporalContext(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// Fehler einer Strategie, der keiner der Kernkategorien entspricht.
    #[error("Policy failed: {0}")]
    Policy(String),
    #[error("Configuration parsing failed: {0}")]
    Config(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
