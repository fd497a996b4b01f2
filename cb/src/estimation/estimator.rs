//! TimeEstimator - three-point duration estimates
//!
//! optimistic = n × base, realistic = optimistic × buffer multiplier,
//! pessimistic = realistic × overrun multiplier. Confidence comes from a
//! pluggable [`ConfidenceModel`].

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use super::decomposer::SubtaskDraft;
use super::error::EstimationError;
use crate::calibration::AccuracyStats;
use crate::config::EstimatorConfig;
use crate::domain::{Prediction, PredictionBasis};

/// Version tag stored on every prediction produced here
pub const MODEL_VERSION: &str = "baseline-v1";

/// Confidence floor and ceiling for history-derived scores
const HISTORICAL_MIN: f64 = 0.05;
const HISTORICAL_MAX: f64 = 0.95;

/// Scores how much an estimate can be trusted
pub trait ConfidenceModel: Send + Sync {
    /// Confidence in [0, 1] and the basis it was derived from
    fn confidence(&self, subtasks: &[SubtaskDraft]) -> (f64, PredictionBasis);
}

/// Same confidence for every estimate
#[derive(Debug, Clone, Copy)]
pub struct FixedConfidence(pub f64);

impl ConfidenceModel for FixedConfidence {
    fn confidence(&self, _subtasks: &[SubtaskDraft]) -> (f64, PredictionBasis) {
        (self.0, PredictionBasis::Baseline)
    }
}

/// Confidence from a user's calibration history: 1 − MAPE
///
/// Below `min_samples` predicted outcomes the fallback applies.
#[derive(Debug, Clone)]
pub struct HistoricalConfidence {
    stats: AccuracyStats,
    min_samples: usize,
    fallback: FixedConfidence,
}

impl HistoricalConfidence {
    pub fn new(stats: AccuracyStats, min_samples: usize, fallback: FixedConfidence) -> Self {
        Self {
            stats,
            min_samples,
            fallback,
        }
    }
}

impl ConfidenceModel for HistoricalConfidence {
    fn confidence(&self, subtasks: &[SubtaskDraft]) -> (f64, PredictionBasis) {
        match self.stats.mape {
            Some(mape) if self.stats.samples >= self.min_samples && mape.is_finite() => {
                let value = (1.0 - mape).clamp(HISTORICAL_MIN, HISTORICAL_MAX);
                debug!(samples = self.stats.samples, mape, value, "HistoricalConfidence: personalized");
                (value, PredictionBasis::Personalized)
            }
            _ => self.fallback.confidence(subtasks),
        }
    }
}

/// A three-point estimate with confidence
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Estimate {
    /// Minutes
    pub optimistic: f64,
    /// Minutes
    pub realistic: f64,
    /// Minutes
    pub pessimistic: f64,
    pub confidence: f64,
    pub basis: PredictionBasis,
    pub model_version: String,
    pub subtask_count: usize,
}

impl Estimate {
    /// Realistic minutes attributed to each subtask
    pub fn per_subtask(&self) -> f64 {
        self.realistic / self.subtask_count.max(1) as f64
    }

    /// Persistable form; the interval spans optimistic to pessimistic
    pub fn to_prediction(&self, task_id: &str) -> Prediction {
        Prediction::new(
            task_id,
            self.realistic,
            self.confidence,
            (self.optimistic, self.pessimistic),
            self.model_version.clone(),
            self.basis,
        )
    }
}

/// Baseline estimator over subtask count
#[derive(Clone)]
pub struct TimeEstimator {
    base_minutes: f64,
    buffer_multiplier: f64,
    overrun_multiplier: f64,
    confidence: Arc<dyn ConfidenceModel>,
}

impl std::fmt::Debug for TimeEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeEstimator")
            .field("base_minutes", &self.base_minutes)
            .field("buffer_multiplier", &self.buffer_multiplier)
            .field("overrun_multiplier", &self.overrun_multiplier)
            .finish_non_exhaustive()
    }
}

impl TimeEstimator {
    /// Build from config with a fixed confidence model
    ///
    /// Rejects a non-positive base and multipliers not strictly above 1,
    /// which would break optimistic < realistic < pessimistic.
    pub fn new(config: &EstimatorConfig) -> Result<Self, EstimationError> {
        if !(config.base_minutes.is_finite() && config.base_minutes > 0.0) {
            return Err(EstimationError::InvalidConfig(format!(
                "base-minutes must be positive, got {}",
                config.base_minutes
            )));
        }
        for (name, value) in [
            ("buffer-multiplier", config.buffer_multiplier),
            ("overrun-multiplier", config.overrun_multiplier),
        ] {
            if !(value.is_finite() && value > 1.0) {
                return Err(EstimationError::InvalidConfig(format!(
                    "{} must be greater than 1, got {}",
                    name, value
                )));
            }
        }
        if !(0.0..=1.0).contains(&config.default_confidence) {
            return Err(EstimationError::InvalidConfig(format!(
                "default-confidence must be within [0, 1], got {}",
                config.default_confidence
            )));
        }

        Ok(Self {
            base_minutes: config.base_minutes,
            buffer_multiplier: config.buffer_multiplier,
            overrun_multiplier: config.overrun_multiplier,
            confidence: Arc::new(FixedConfidence(config.default_confidence)),
        })
    }

    /// Swap the confidence model
    pub fn with_confidence(mut self, model: Arc<dyn ConfidenceModel>) -> Self {
        self.confidence = model;
        self
    }

    /// Estimate a task from its subtasks
    ///
    /// The description is accepted for models that read it; the baseline
    /// depends on subtask count only.
    pub fn estimate(&self, description: &str, subtasks: &[SubtaskDraft]) -> Result<Estimate, EstimationError> {
        debug!(
            description_len = description.len(),
            subtask_count = subtasks.len(),
            "estimate: called"
        );
        if subtasks.is_empty() {
            return Err(EstimationError::EmptyDecomposition);
        }

        let n = subtasks.len() as f64;
        let optimistic = n * self.base_minutes;
        let realistic = optimistic * self.buffer_multiplier;
        let pessimistic = realistic * self.overrun_multiplier;

        let (raw_confidence, basis) = self.confidence.confidence(subtasks);
        let confidence = if raw_confidence.is_finite() {
            raw_confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };

        Ok(Estimate {
            optimistic,
            realistic,
            pessimistic,
            confidence,
            basis,
            model_version: MODEL_VERSION.to_string(),
            subtask_count: subtasks.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskCategory;
    use proptest::prelude::*;

    fn drafts(n: usize) -> Vec<SubtaskDraft> {
        (1..=n)
            .map(|i| SubtaskDraft {
                order: i as i32,
                description: format!("Step {}", i),
                category: TaskCategory::Analytical,
                is_implicit: true,
            })
            .collect()
    }

    fn estimator() -> TimeEstimator {
        TimeEstimator::new(&EstimatorConfig::default()).unwrap()
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_three_subtasks_scenario() {
        let est = estimator().estimate("Write report", &drafts(3)).unwrap();
        assert!(approx(est.optimistic, 90.0)); // 1.5h
        assert!(approx(est.realistic, 135.0)); // 2.25h
        assert!(approx(est.pessimistic, 189.0)); // 3.15h
        assert!(approx(est.confidence, 0.78));
        assert_eq!(est.basis, PredictionBasis::Baseline);
        assert_eq!(est.model_version, MODEL_VERSION);
        assert!(approx(est.per_subtask(), 45.0));
    }

    #[test]
    fn test_empty_decomposition() {
        let err = estimator().estimate("Write report", &[]).unwrap_err();
        assert!(matches!(err, EstimationError::EmptyDecomposition));
    }

    #[test]
    fn test_invalid_config() {
        let config = EstimatorConfig {
            buffer_multiplier: 1.0,
            ..Default::default()
        };
        assert!(matches!(
            TimeEstimator::new(&config),
            Err(EstimationError::InvalidConfig(_))
        ));

        let config = EstimatorConfig {
            base_minutes: 0.0,
            ..Default::default()
        };
        assert!(TimeEstimator::new(&config).is_err());

        let config = EstimatorConfig {
            overrun_multiplier: f64::NAN,
            ..Default::default()
        };
        assert!(TimeEstimator::new(&config).is_err());
    }

    #[test]
    fn test_to_prediction() {
        let est = estimator().estimate("x", &drafts(2)).unwrap();
        let p = est.to_prediction("task-1");
        assert_eq!(p.task_id, "task-1");
        assert!(approx(p.predicted_time, 90.0));
        assert!(approx(p.confidence_interval_low, 60.0));
        assert!(approx(p.confidence_interval_high, 126.0));
        assert_eq!(p.model_version, "baseline-v1");
    }

    #[test]
    fn test_historical_confidence_needs_samples() {
        let stats = AccuracyStats {
            samples: 3,
            unpredicted: 0,
            mape: Some(0.1),
            mean_bias_minutes: Some(5.0),
        };
        let model = HistoricalConfidence::new(stats, 5, FixedConfidence(0.78));
        assert_eq!(model.confidence(&drafts(1)), (0.78, PredictionBasis::Baseline));
    }

    #[test]
    fn test_historical_confidence_personalized() {
        let stats = AccuracyStats {
            samples: 8,
            unpredicted: 2,
            mape: Some(0.25),
            mean_bias_minutes: Some(12.0),
        };
        let est = estimator()
            .with_confidence(Arc::new(HistoricalConfidence::new(stats, 5, FixedConfidence(0.78))))
            .estimate("x", &drafts(1))
            .unwrap();
        assert!(approx(est.confidence, 0.75));
        assert_eq!(est.basis, PredictionBasis::Personalized);
    }

    #[test]
    fn test_historical_confidence_clamped() {
        let stats = AccuracyStats {
            samples: 10,
            unpredicted: 0,
            mape: Some(3.0),
            mean_bias_minutes: Some(200.0),
        };
        let model = HistoricalConfidence::new(stats, 5, FixedConfidence(0.78));
        assert!(approx(model.confidence(&drafts(1)).0, HISTORICAL_MIN));
    }

    struct Wild;

    impl ConfidenceModel for Wild {
        fn confidence(&self, _subtasks: &[SubtaskDraft]) -> (f64, PredictionBasis) {
            (7.5, PredictionBasis::Collaborative)
        }
    }

    #[test]
    fn test_confidence_output_clamped() {
        let est = estimator()
            .with_confidence(Arc::new(Wild))
            .estimate("x", &drafts(1))
            .unwrap();
        assert!(approx(est.confidence, 1.0));
    }

    proptest! {
        #[test]
        fn prop_estimates_ordered_and_positive(
            n in 1usize..50,
            base in 1.0f64..240.0,
            buffer in 1.01f64..3.0,
            overrun in 1.01f64..3.0,
        ) {
            let config = EstimatorConfig {
                base_minutes: base,
                buffer_multiplier: buffer,
                overrun_multiplier: overrun,
                ..Default::default()
            };
            let est = TimeEstimator::new(&config).unwrap().estimate("task", &drafts(n)).unwrap();
            prop_assert!(est.optimistic > 0.0);
            prop_assert!(est.optimistic < est.realistic);
            prop_assert!(est.realistic < est.pessimistic);
            prop_assert!((0.0..=1.0).contains(&est.confidence));
        }
    }
}
