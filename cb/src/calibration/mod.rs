//! Calibration: recording how long tasks really took

mod tracker;

pub use tracker::{AccuracyStats, CalibrationTracker, OutcomeRecord, StoreCalibrationTracker};
