//! Domain validation errors

use thiserror::Error;

use super::task::TaskStatus;

/// Invariant violations on domain records
#[derive(Debug, Error, PartialEq)]
pub enum DomainError {
    #[error("Estimates out of order: optimistic {optimistic} <= realistic {realistic} <= pessimistic {pessimistic} required")]
    EstimateOrder {
        optimistic: f64,
        realistic: f64,
        pessimistic: f64,
    },

    #[error("Duration must be a non-negative number of minutes, got {0}")]
    InvalidDuration(f64),

    #[error("Status {0} is set by completing the task with an actual time")]
    CompletionRequiresActual(TaskStatus),

    #[error("Invalid preference: {0}")]
    InvalidPreference(String),
}
