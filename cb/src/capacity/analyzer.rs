//! CapacityAnalyzer - planned load versus available hours
//!
//! Pure computation over the active task set handed in by the caller. Which
//! statuses count as active is decided by the caller, not here.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::config::CapacityConfig;
use crate::domain::{CapacityPreferences, Task, TaskCategory};

/// Alert tier for a utilisation percentage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    None,
    Caution,
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Caution => write!(f, "caution"),
            Self::Warning => write!(f, "warning"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Result of a capacity analysis
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapacityReport {
    pub total_capacity_minutes: u64,
    pub planned_minutes: u64,
    pub buffer_minutes: u64,
    pub utilization_percent: u64,
    pub severity: Severity,
    pub alert_message: Option<String>,
    /// Planned minutes per category; categories without load are absent
    pub energy_budget: BTreeMap<TaskCategory, u64>,
}

/// How a threshold compares against utilisation
#[derive(Debug, Clone, Copy)]
enum Bound {
    Above(u64),
    AtLeast(u64),
}

impl Bound {
    fn matches(self, percent: u64) -> bool {
        match self {
            Bound::Above(t) => percent > t,
            Bound::AtLeast(t) => percent >= t,
        }
    }
}

/// Computes capacity reports
#[derive(Debug, Clone)]
pub struct CapacityAnalyzer {
    warning_threshold: u64,
    critical_threshold: u64,
}

impl Default for CapacityAnalyzer {
    fn default() -> Self {
        Self::new(&CapacityConfig::default())
    }
}

impl CapacityAnalyzer {
    pub fn new(config: &CapacityConfig) -> Self {
        Self {
            warning_threshold: u64::from(config.warning_threshold),
            critical_threshold: u64::from(config.critical_threshold),
        }
    }

    /// Analyze a set of active tasks against the user's preferences
    pub fn analyze(&self, active_tasks: &[Task], preferences: &CapacityPreferences) -> CapacityReport {
        debug!(
            task_count = active_tasks.len(),
            work_hours = preferences.work_hours_per_day,
            "analyze: called"
        );
        let total = minutes(preferences.work_hours_per_day * 60.0);

        let mut planned = 0u64;
        let mut energy_budget: BTreeMap<TaskCategory, u64> = BTreeMap::new();
        for task in active_tasks {
            let task_minutes = minutes(task.estimated_time.unwrap_or(0.0));
            if task_minutes == 0 {
                continue;
            }
            planned += task_minutes;
            *energy_budget.entry(task.category).or_insert(0) += task_minutes;
        }

        // Zero available hours is defined as 0% rather than a division error
        let utilization = if total > 0 {
            (planned as f64 / total as f64 * 100.0).round() as u64
        } else {
            0
        };

        let severity = self.severity(utilization, u64::from(preferences.alert_caution_threshold));
        let alert_message = alert_message(severity, utilization, planned, preferences.work_hours_per_day);

        debug!(planned, total, utilization, %severity, "analyze: computed");
        CapacityReport {
            total_capacity_minutes: total,
            planned_minutes: planned,
            buffer_minutes: total.saturating_sub(planned),
            utilization_percent: utilization,
            severity,
            alert_message,
            energy_budget,
        }
    }

    /// First matching tier, highest threshold first
    pub fn severity(&self, utilization: u64, caution_threshold: u64) -> Severity {
        let table = [
            (Bound::Above(self.critical_threshold), Severity::Critical),
            (Bound::Above(self.warning_threshold), Severity::Warning),
            (Bound::AtLeast(caution_threshold), Severity::Caution),
        ];
        table
            .iter()
            .find(|(bound, _)| bound.matches(utilization))
            .map(|(_, severity)| *severity)
            .unwrap_or(Severity::None)
    }
}

/// Round a duration to whole minutes; negative and non-finite values count as zero
fn minutes(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.round() as u64
    } else {
        0
    }
}

fn alert_message(severity: Severity, utilization: u64, planned: u64, work_hours: f64) -> Option<String> {
    match severity {
        Severity::Critical => Some(
            "You're planning more work than you have time for. This is a burnout risk pattern. Please defer tasks."
                .to_string(),
        ),
        Severity::Warning => Some(format!(
            "You have {:.1} hours of tasks planned but only {} hours available. Recommend deferring tasks.",
            planned as f64 / 60.0,
            work_hours
        )),
        Severity::Caution => Some(format!(
            "You're at {}% capacity. Consider moving one task to tomorrow.",
            utilization
        )),
        Severity::None => None,
    }
}
