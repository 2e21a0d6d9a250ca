use heillern_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Not enough samples: {available} stored, {requested} requested")]
    InsufficientSamples { available: usize, requested: usize },
    #[error("Priority must be finite and non-negative, got {0}")]
    InvalidPriority(f32),
    #[error("Got {indices} indices but {priorities} priorities")]
    PriorityCountMismatch { indices: usize, priorities: usize },
    #[error("Replay index {index} out of bounds for {len} entries")]
    IndexOutOfBounds { index: usize, len: usize },
    /// Entries, priorities and write cursor fell out of step; the buffer
    /// cannot be trusted.
    #[error(
        "Replay buffer corrupted: {entries} entries vs {priorities} priorities, \
         cursor {position} of capacity {capacity}"
    )]
    BufferCorrupted {
        entries: usize,
        priorities: usize,
        position: usize,
        capacity: usize,
    },
    #[error("Snapshot deserialization failed: {0}")]
    Snapshot(#[from] serde_json::Error),
    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type Result<T> = std::result::Result<T, AgentError>;
