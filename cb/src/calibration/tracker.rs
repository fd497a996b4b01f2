//! CalibrationTracker - predicted versus actual outcomes
//!
//! Outcomes are append-only; accuracy is derived on read.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::domain::{Actual, DelayReason, Task};
use crate::state::{StateError, StateManager};

/// One completed task's outcome
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeRecord {
    pub task_id: String,
    pub user_id: String,
    /// None when the task was never estimated
    pub predicted: Option<f64>,
    /// Minutes
    pub actual: f64,
    pub delay_reason: Option<DelayReason>,
    pub notes: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl OutcomeRecord {
    pub fn into_actual(self) -> Actual {
        let mut actual = Actual::new(
            self.task_id,
            self.user_id,
            self.actual,
            self.predicted,
            self.completed_at,
        );
        actual.delay_reason = self.delay_reason;
        actual.user_notes = self.notes;
        actual
    }
}

/// Aggregate estimation accuracy for one user
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccuracyStats {
    /// Outcomes with a usable prediction
    pub samples: usize,
    /// Outcomes recorded without a prior estimate
    pub unpredicted: usize,
    /// Mean absolute percentage error over `samples`
    pub mape: Option<f64>,
    /// Mean of actual − predicted; positive means tasks run long
    pub mean_bias_minutes: Option<f64>,
}

impl AccuracyStats {
    pub fn from_actuals(actuals: &[Actual]) -> Self {
        let mut stats = Self::default();
        let mut ape_sum = 0.0;
        let mut bias_sum = 0.0;

        for actual in actuals {
            if actual.predicted_time.is_none() {
                stats.unpredicted += 1;
                continue;
            }
            // A zero-minute actual has no defined percentage error
            let (Some(ape), Some(bias)) = (actual.absolute_percentage_error(), actual.bias()) else {
                continue;
            };
            stats.samples += 1;
            ape_sum += ape;
            bias_sum += bias;
        }

        if stats.samples > 0 {
            let n = stats.samples as f64;
            stats.mape = Some(ape_sum / n);
            stats.mean_bias_minutes = Some(bias_sum / n);
        }
        stats
    }
}

/// Records outcomes and reports accuracy
#[async_trait]
pub trait CalibrationTracker: Send + Sync {
    /// Append one outcome; never overwrites an earlier one
    async fn record(&self, outcome: OutcomeRecord) -> Result<String, StateError>;

    /// Persist a completed task together with its outcome
    ///
    /// Either both the task update and the outcome are written or neither is.
    async fn record_completion(&self, task: Task, outcome: OutcomeRecord) -> Result<Actual, StateError>;

    async fn accuracy_for(&self, user_id: &str) -> Result<AccuracyStats, StateError>;
}

/// Tracker backed by the record store
#[derive(Clone)]
pub struct StoreCalibrationTracker {
    state: StateManager,
}

impl StoreCalibrationTracker {
    pub fn new(state: StateManager) -> Self {
        Self { state }
    }
}

#[async_trait]
impl CalibrationTracker for StoreCalibrationTracker {
    async fn record(&self, outcome: OutcomeRecord) -> Result<String, StateError> {
        debug!(task_id = %outcome.task_id, predicted = ?outcome.predicted, actual = outcome.actual, "record: called");
        let id = self.state.append_actual(outcome.into_actual()).await?;
        info!(%id, "Recorded calibration outcome");
        Ok(id)
    }

    async fn record_completion(&self, task: Task, outcome: OutcomeRecord) -> Result<Actual, StateError> {
        debug!(task_id = %task.id, predicted = ?outcome.predicted, actual = outcome.actual, "record_completion: called");
        if outcome.task_id != task.id {
            return Err(StateError::StoreError(format!(
                "outcome for task {} does not belong to task {}",
                outcome.task_id, task.id
            )));
        }
        let actual = outcome.into_actual();
        self.state.complete_task(task, actual.clone()).await?;
        info!(id = %actual.id, "Recorded calibration outcome");
        Ok(actual)
    }

    async fn accuracy_for(&self, user_id: &str) -> Result<AccuracyStats, StateError> {
        debug!(%user_id, "accuracy_for: called");
        let actuals = self.state.list_actuals(user_id).await?;
        Ok(AccuracyStats::from_actuals(&actuals))
    }
}
