use heillern_agent::AgentError;
use heillern_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("Signal row {row} has {actual} features, expected {expected}")]
    RaggedSignals {
        row: usize,
        expected: usize,
        actual: usize,
    },
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type Result<T> = std::result::Result<T, FeedbackError>;
