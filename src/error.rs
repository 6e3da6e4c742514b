//! Error types for the replay buffer.

use thiserror::Error;

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, ReplayError>;

/// Errors surfaced by the replay buffer and its persistence layer
#[derive(Error, Debug)]
pub enum ReplayError {
    /// Sampling was requested before any experience was stored
    #[error("Replay buffer is empty, cannot sample")]
    EmptyBuffer,

    /// A caller-supplied priority (or priority multiplier) is NaN or infinite
    #[error("Invalid priority: {value}")]
    InvalidPriority { value: f64 },

    /// Buffer constructed with a capacity of zero
    #[error("Capacity must be positive, got {capacity}")]
    CapacityMisconfiguration { capacity: usize },

    /// Any other out-of-range configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// State vector length differs from the configured state dimension
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Handles and priorities passed to an update have different lengths
    #[error("Length mismatch: {handles} handles, {priorities} priorities")]
    LengthMismatch { handles: usize, priorities: usize },

    /// Snapshot header mismatch, truncation or corruption
    #[error("Snapshot format error: {0}")]
    PersistenceFormat(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Binary encoding error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ReplayError {
    /// Create a snapshot format error
    pub fn format(message: impl Into<String>) -> Self {
        Self::PersistenceFormat(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Check if the caller can simply wait and try again
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReplayError::EmptyBuffer)
    }
}
