//! Estimation core
//!
//! - [`SubtaskDecomposer`] turns a description into categorised subtasks
//! - [`TimeEstimator`] turns subtasks into a three-point estimate

mod decomposer;
mod error;
mod estimator;

pub use decomposer::{SUBMIT_TOOL, SubtaskDecomposer, SubtaskDraft};
pub use error::EstimationError;
pub use estimator::{ConfidenceModel, Estimate, FixedConfidence, HistoricalConfidence, MODEL_VERSION, TimeEstimator};
