//! Task planning: the estimation core wired to persistent state
//!
//! The planner owns the recovery policy for decomposition (retry with
//! backoff, then single-step fallback); the components it calls never retry.

mod error;
mod retry;
mod service;
mod types;

pub use error::PlannerError;
pub use retry::RetryPolicy;
pub use service::TaskPlanner;
pub use types::{Analysis, Completion, NewTask, TaskDetail, TaskList, TaskPatch};
