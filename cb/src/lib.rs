//! Calibrate - task planning with AI time estimates
//!
//! Calibrate breaks a task description into subtasks, turns them into a
//! three-point time estimate, warns when the day's plan exceeds available
//! hours, and learns from how long finished tasks actually took.
//!
//! # Core Concepts
//!
//! - **Decompose, then estimate**: the model only splits work into steps;
//!   minutes come from a deterministic per-step formula
//! - **Predictions are append-only**: re-estimating adds a record, never rewrites one
//! - **Capacity tiers**: planned minutes are measured against the user's work
//!   hours and graded caution, warning or critical
//! - **Calibration**: every completion pairs the prediction with the actual time
//!
//! # Modules
//!
//! - [`estimation`] - subtask decomposition and time estimation
//! - [`capacity`] - utilisation and alert tiers
//! - [`calibration`] - outcome recording and accuracy statistics
//! - [`planner`] - task operations tying the engine to storage
//! - [`state`] - actor owning the record store
//! - [`digest`] - daily summary of completed and overdue tasks
//! - [`llm`] - LLM client trait and providers
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod calibration;
pub mod capacity;
pub mod cli;
pub mod config;
pub mod digest;
pub mod domain;
pub mod estimation;
pub mod llm;
pub mod planner;
pub mod prompts;
pub mod state;

// Re-export commonly used types
pub use calibration::{AccuracyStats, CalibrationTracker, OutcomeRecord, StoreCalibrationTracker};
pub use capacity::{CapacityAnalyzer, CapacityReport, Severity};
pub use config::{Config, LlmConfig};
pub use digest::{Digest, DigestBuilder, LogSink, NotificationSink};
pub use domain::{
    Actual, CapacityPreferences, DelayReason, DomainError, Filter, FilterOp, IndexValue, Prediction, PredictionBasis,
    Record, Store, Subtask, Task, TaskCategory, TaskPriority, TaskStatus, User,
};
pub use estimation::{Estimate, EstimationError, SubtaskDecomposer, SubtaskDraft, TimeEstimator};
pub use llm::{
    AnthropicClient, CompletionRequest, CompletionResponse, LlmClient, LlmError, OpenAIClient, create_client,
};
pub use planner::{NewTask, PlannerError, TaskPlanner};
pub use state::{StateCommand, StateError, StateManager, StateResponse};
