//! Error types for plan execution

use thiserror::Error;

/// Errors that stop a plan from running to completion
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// A step failed; later phases were not started
    #[error("phase '{phase}' failed for '{target}': {message}")]
    MutationFailed {
        /// Name of the failing phase
        phase: String,
        /// Entity of the first failing step in that phase
        target: String,
        /// Error reported for that step
        message: String,
        /// Number of failed steps in the phase
        failures: usize,
        /// Phases completed before the failure
        phases_completed: usize,
    },

    /// The confirmation callback declined
    #[error("changes were not confirmed")]
    Declined,

    /// Could not set up the worker pool or prompt
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type for plan execution
pub type Result<T> = std::result::Result<T, ExecuteError>;
