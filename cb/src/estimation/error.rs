//! Estimation error types

use thiserror::Error;

use crate::llm::LlmError;

/// Failures of the decompose/estimate pipeline
#[derive(Debug, Error)]
pub enum EstimationError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The model answered, but not with a usable subtask list
    #[error("Could not parse decomposition: {0}")]
    DecompositionParse(String),

    /// The model could not be reached in time
    #[error("Decomposition unavailable: {0}")]
    DecompositionUnavailable(String),

    #[error("Cannot estimate a task with zero subtasks")]
    EmptyDecomposition,

    #[error("Invalid estimator configuration: {0}")]
    InvalidConfig(String),
}

impl EstimationError {
    /// Worth trying the same call again
    pub fn is_retryable(&self) -> bool {
        matches!(self, EstimationError::DecompositionUnavailable(_))
    }
}

impl From<LlmError> for EstimationError {
    fn from(e: LlmError) -> Self {
        if e.is_transport() {
            EstimationError::DecompositionUnavailable(e.to_string())
        } else {
            match e {
                // A response that does not decode is a content failure
                LlmError::InvalidResponse(_) | LlmError::Json(_) => EstimationError::DecompositionParse(e.to_string()),
                // Credentials and 4xx errors: no response will be produced by retrying
                _ => EstimationError::DecompositionUnavailable(e.to_string()),
            }
        }
    }
}
