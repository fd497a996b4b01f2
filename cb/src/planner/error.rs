//! Planner error types

use thiserror::Error;

use crate::domain::DomainError;
use crate::estimation::EstimationError;
use crate::state::StateError;

/// Failures surfaced to callers of the task planner
#[derive(Debug, Error)]
pub enum PlannerError {
    #[error(transparent)]
    Estimation(#[from] EstimationError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<DomainError> for PlannerError {
    fn from(e: DomainError) -> Self {
        PlannerError::InvalidInput(e.to_string())
    }
}

impl PlannerError {
    /// Missing records, whether reported by the store or the planner
    pub fn is_not_found(&self) -> bool {
        matches!(self, PlannerError::NotFound(_) | PlannerError::State(StateError::NotFound(_)))
    }
}
