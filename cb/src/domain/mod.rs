//! Domain types for Calibrate
//!
//! Core records: Task, Subtask, Prediction, Actual, User.
//! All implement the Record trait for TaskStore persistence.

mod actual;
mod error;
mod id;
mod prediction;
mod priority;
mod subtask;
mod task;
mod user;

pub use actual::{Actual, DelayReason};
pub use error::DomainError;
pub use id::{IdResolver, generate_id};
pub use prediction::{Prediction, PredictionBasis};
pub use priority::TaskPriority;
pub use subtask::Subtask;
pub use task::{Task, TaskCategory, TaskStatus};
pub use user::{CapacityPreferences, PreferencesPatch, User};

// Re-export taskstore types for convenience
pub use taskstore::{Filter, FilterOp, IndexValue, Page, Record, Store};
