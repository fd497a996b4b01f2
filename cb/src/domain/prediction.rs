//! Prediction record
//!
//! A persisted estimate. Predictions are append-only; the newest one for a
//! task is its current estimate.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use taskstore::{IndexValue, Record, now_ms};

use super::id::generate_id;

/// Where an estimate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PredictionBasis {
    /// Fixed heuristics only
    #[default]
    Baseline,
    /// Adjusted from the user's own calibration history
    Personalized,
    /// Adjusted from other users' history
    Collaborative,
}

impl std::fmt::Display for PredictionBasis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Baseline => write!(f, "baseline"),
            Self::Personalized => write!(f, "personalized"),
            Self::Collaborative => write!(f, "collaborative"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: String,

    pub task_id: String,

    /// Realistic minutes
    pub predicted_time: f64,

    /// Confidence in [0, 1]
    pub confidence: f64,

    /// Optimistic minutes
    pub confidence_interval_low: f64,

    /// Pessimistic minutes
    pub confidence_interval_high: f64,

    pub model_version: String,

    pub prediction_basis: PredictionBasis,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,
}

impl Prediction {
    pub fn new(
        task_id: impl Into<String>,
        predicted_time: f64,
        confidence: f64,
        interval: (f64, f64),
        model_version: impl Into<String>,
        basis: PredictionBasis,
    ) -> Self {
        Self {
            id: generate_id("prediction", ""),
            task_id: task_id.into(),
            predicted_time,
            confidence,
            confidence_interval_low: interval.0,
            confidence_interval_high: interval.1,
            model_version: model_version.into(),
            prediction_basis: basis,
            created_at: now_ms(),
        }
    }
}

impl Record for Prediction {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.created_at
    }

    fn collection_name() -> &'static str {
        "predictions"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("task_id".to_string(), IndexValue::String(self.task_id.clone()));
        fields.insert(
            "prediction_basis".to_string(),
            IndexValue::String(self.prediction_basis.to_string()),
        );
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prediction_new() {
        let p = Prediction::new("task-1", 135.0, 0.78, (90.0, 189.0), "baseline-v1", PredictionBasis::Baseline);
        assert!(p.id.contains("-prediction-"));
        assert_eq!(p.confidence_interval_low, 90.0);
        assert_eq!(p.confidence_interval_high, 189.0);
        assert_eq!(p.prediction_basis.to_string(), "baseline");
    }

    #[test]
    fn test_basis_serde() {
        let json = serde_json::to_string(&PredictionBasis::Personalized).unwrap();
        assert_eq!(json, "\"personalized\"");
    }
}
