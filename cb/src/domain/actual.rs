//! Actual outcome record
//!
//! One row per completed task. `predicted_time` is None when the task was
//! completed without ever being estimated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use taskstore::{IndexValue, Record};

use super::id::generate_id;

/// User-reported reason for overrunning an estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayReason {
    Interruptions,
    ScopeCreep,
    Underestimated,
    Other,
}

impl std::fmt::Display for DelayReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Interruptions => write!(f, "interruptions"),
            Self::ScopeCreep => write!(f, "scope_creep"),
            Self::Underestimated => write!(f, "underestimated"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl std::str::FromStr for DelayReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "interruptions" => Ok(Self::Interruptions),
            "scope_creep" => Ok(Self::ScopeCreep),
            "underestimated" => Ok(Self::Underestimated),
            "other" => Ok(Self::Other),
            _ => Err(format!("Unknown delay reason: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Actual {
    pub id: String,

    pub task_id: String,

    pub user_id: String,

    /// Minutes actually spent
    pub actual_time: f64,

    /// Realistic minutes of the prediction current at completion
    pub predicted_time: Option<f64>,

    pub completion_date: DateTime<Utc>,

    pub user_notes: Option<String>,

    pub delay_reason: Option<DelayReason>,
}

impl Actual {
    pub fn new(
        task_id: impl Into<String>,
        user_id: impl Into<String>,
        actual_time: f64,
        predicted_time: Option<f64>,
        completion_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: generate_id("actual", ""),
            task_id: task_id.into(),
            user_id: user_id.into(),
            actual_time,
            predicted_time,
            completion_date,
            user_notes: None,
            delay_reason: None,
        }
    }

    /// Signed error in minutes (positive means the task ran over)
    pub fn bias(&self) -> Option<f64> {
        self.predicted_time.map(|p| self.actual_time - p)
    }

    /// |actual - predicted| / actual, when both are usable
    pub fn absolute_percentage_error(&self) -> Option<f64> {
        match self.predicted_time {
            Some(p) if self.actual_time > 0.0 => Some((self.actual_time - p).abs() / self.actual_time),
            _ => None,
        }
    }
}

impl Record for Actual {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.completion_date.timestamp_millis()
    }

    fn collection_name() -> &'static str {
        "actuals"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("task_id".to_string(), IndexValue::String(self.task_id.clone()));
        fields.insert("user_id".to_string(), IndexValue::String(self.user_id.clone()));
        fields.insert("predicted".to_string(), IndexValue::Bool(self.predicted_time.is_some()));
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_metrics() {
        let a = Actual::new("t", "u", 150.0, Some(120.0), Utc::now());
        assert_eq!(a.bias(), Some(30.0));
        assert!((a.absolute_percentage_error().unwrap() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_unpredicted_has_no_error() {
        let a = Actual::new("t", "u", 45.0, None, Utc::now());
        assert_eq!(a.bias(), None);
        assert_eq!(a.absolute_percentage_error(), None);
    }

    #[test]
    fn test_zero_actual_skips_percentage() {
        let a = Actual::new("t", "u", 0.0, Some(30.0), Utc::now());
        assert_eq!(a.absolute_percentage_error(), None);
        assert_eq!(a.bias(), Some(-30.0));
    }

    #[test]
    fn test_delay_reason_parse() {
        assert_eq!("scope-creep".parse::<DelayReason>().unwrap(), DelayReason::ScopeCreep);
        assert!("lazy".parse::<DelayReason>().is_err());
    }
}
