//! Errors in the library.
use std::path::PathBuf;
use thiserror::Error;

/// Error type of the library.
#[derive(Debug, Error)]
pub enum MarlError {
    /// The transition store holds fewer transitions than requested.
    ///
    /// This is not fatal: the update step is skipped and training continues.
    #[error("Insufficient data: requested {requested} transitions, {available} available")]
    InsufficientData {
        /// The requested batch size.
        requested: usize,
        /// The number of stored transitions.
        available: usize,
    },

    /// The width of an observation differs from the one the agent was built for.
    #[error("Shape mismatch for agent {agent}: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Index of the agent.
        agent: usize,
        /// Configured input dimension.
        expected: usize,
        /// Dimension of the given observation.
        actual: usize,
    },

    /// The number of per-agent entries differs from the number of agents.
    #[error("Agent count mismatch: expected {expected}, got {actual}")]
    AgentCountMismatch {
        /// The number of agents.
        expected: usize,
        /// The number of given entries.
        actual: usize,
    },

    /// The run directory is not empty and overriding was not requested.
    #[error("{0:?} is not empty. Use force to override it")]
    CheckpointConflict(PathBuf),

    /// The requested compute device is not present.
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// An operation was called in a lifecycle phase that does not allow it.
    #[error("Operation {op} is not allowed in phase {phase}")]
    InvalidPhase {
        /// Name of the operation.
        op: String,
        /// Current phase.
        phase: String,
    },

    /// The run was stopped by the interrupt flag of the trainer.
    #[error("Interrupted")]
    Interrupted,

    /// Record key error.
    #[error("Record key error: {0}")]
    RecordKeyError(String),
}
