//! Capacity analysis over a user's active tasks

mod analyzer;

pub use analyzer::{CapacityAnalyzer, CapacityReport, Severity};
