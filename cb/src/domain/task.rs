//! Task record
//!
//! A Task is a unit of work owned by exactly one user. Its three-point
//! estimate is copied from the current Prediction; `actual_time` is only
//! present once the task is completed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use taskstore::{IndexValue, Record, now_ms};

use super::error::DomainError;
use super::id::generate_id;
use super::priority::TaskPriority;

/// Closed set of work categories used for energy budgeting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskCategory {
    Creative,
    Analytical,
    Administrative,
    Collaborative,
    #[default]
    Unknown,
}

impl TaskCategory {
    /// Every category, in display order
    pub const ALL: [TaskCategory; 5] = [
        Self::Creative,
        Self::Analytical,
        Self::Administrative,
        Self::Collaborative,
        Self::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creative => "creative",
            Self::Analytical => "analytical",
            Self::Administrative => "administrative",
            Self::Collaborative => "collaborative",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TaskCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == lowered)
            .ok_or_else(|| format!("Unknown category: {}", s))
    }
}

/// Task lifecycle status
///
/// planned → in_progress → completed, with deferred and delegated as side exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Planned,
    InProgress,
    Completed,
    Deferred,
    Delegated,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Planned => write!(f, "planned"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Deferred => write!(f, "deferred"),
            Self::Delegated => write!(f, "delegated"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "planned" => Ok(Self::Planned),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "deferred" => Ok(Self::Deferred),
            "delegated" => Ok(Self::Delegated),
            _ => Err(format!("Unknown status: {}", s)),
        }
    }
}

/// A user's unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: String,

    /// Owning user
    pub user_id: String,

    pub title: String,

    /// Free-text description fed to the decomposer
    pub description: Option<String>,

    pub category: TaskCategory,

    pub priority: TaskPriority,

    pub status: TaskStatus,

    /// Best-guess duration in minutes (the realistic estimate unless overridden)
    pub estimated_time: Option<f64>,

    pub optimistic_time: Option<f64>,

    pub realistic_time: Option<f64>,

    pub pessimistic_time: Option<f64>,

    /// Minutes actually spent; present iff status is completed
    pub actual_time: Option<f64>,

    pub deadline: Option<DateTime<Utc>>,

    pub scheduled_date: Option<DateTime<Utc>>,

    pub completed_at: Option<DateTime<Utc>>,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,

    /// Last update timestamp (Unix milliseconds)
    pub updated_at: i64,
}

impl Task {
    /// Create a new planned Task with generated ID
    pub fn new(user_id: impl Into<String>, title: impl Into<String>) -> Self {
        let title = title.into();
        let now = now_ms();
        Self {
            id: generate_id("task", &title),
            user_id: user_id.into(),
            title,
            description: None,
            category: TaskCategory::Unknown,
            priority: TaskPriority::Medium,
            status: TaskStatus::Planned,
            estimated_time: None,
            optimistic_time: None,
            realistic_time: None,
            pessimistic_time: None,
            actual_time: None,
            deadline: None,
            scheduled_date: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_category(mut self, category: TaskCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_estimated_time(mut self, minutes: f64) -> Self {
        self.estimated_time = Some(minutes);
        self
    }

    /// Text handed to the decomposer: description if present, else title
    pub fn work_text(&self) -> &str {
        match self.description.as_deref() {
            Some(d) if !d.trim().is_empty() => d,
            _ => &self.title,
        }
    }

    /// Apply a three-point estimate; `estimated_time` follows the realistic value
    pub fn set_estimate(&mut self, optimistic: f64, realistic: f64, pessimistic: f64) -> Result<(), DomainError> {
        check_order(Some(optimistic), Some(realistic), Some(pessimistic))?;
        self.optimistic_time = Some(optimistic);
        self.realistic_time = Some(realistic);
        self.pessimistic_time = Some(pessimistic);
        self.estimated_time = Some(realistic);
        self.updated_at = now_ms();
        Ok(())
    }

    /// Check the record-level invariants
    pub fn validate(&self) -> Result<(), DomainError> {
        for minutes in [
            self.estimated_time,
            self.optimistic_time,
            self.realistic_time,
            self.pessimistic_time,
            self.actual_time,
        ]
        .into_iter()
        .flatten()
        {
            if !minutes.is_finite() || minutes < 0.0 {
                return Err(DomainError::InvalidDuration(minutes));
            }
        }
        check_order(self.optimistic_time, self.realistic_time, self.pessimistic_time)?;
        if (self.status == TaskStatus::Completed) != self.actual_time.is_some() {
            return Err(DomainError::CompletionRequiresActual(self.status));
        }
        Ok(())
    }

    /// Move to a non-completed status
    ///
    /// Leaving `completed` clears the actual time and completion timestamp.
    /// Completion itself goes through [`Task::complete`].
    pub fn set_status(&mut self, status: TaskStatus) -> Result<(), DomainError> {
        if status == TaskStatus::Completed {
            return Err(DomainError::CompletionRequiresActual(status));
        }
        self.status = status;
        self.actual_time = None;
        self.completed_at = None;
        self.updated_at = now_ms();
        Ok(())
    }

    /// Mark the task completed with the minutes actually spent
    pub fn complete(&mut self, actual_minutes: f64, at: DateTime<Utc>) -> Result<(), DomainError> {
        if !actual_minutes.is_finite() || actual_minutes < 0.0 {
            return Err(DomainError::InvalidDuration(actual_minutes));
        }
        self.status = TaskStatus::Completed;
        self.actual_time = Some(actual_minutes);
        if self.completed_at.is_none() {
            self.completed_at = Some(at);
        }
        self.updated_at = now_ms();
        Ok(())
    }

    /// Still open with a deadline at or before `cutoff`
    pub fn is_overdue(&self, cutoff: DateTime<Utc>) -> bool {
        matches!(self.status, TaskStatus::Planned | TaskStatus::InProgress)
            && self.deadline.is_some_and(|d| d <= cutoff)
    }

    pub fn touch(&mut self) {
        self.updated_at = now_ms();
    }
}

fn check_order(optimistic: Option<f64>, realistic: Option<f64>, pessimistic: Option<f64>) -> Result<(), DomainError> {
    if let (Some(o), Some(r), Some(p)) = (optimistic, realistic, pessimistic)
        && !(o <= r && r <= p)
    {
        return Err(DomainError::EstimateOrder {
            optimistic: o,
            realistic: r,
            pessimistic: p,
        });
    }
    Ok(())
}

impl Record for Task {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn collection_name() -> &'static str {
        "tasks"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("user_id".to_string(), IndexValue::String(self.user_id.clone()));
        fields.insert("status".to_string(), IndexValue::String(self.status.to_string()));
        fields.insert("category".to_string(), IndexValue::String(self.category.to_string()));
        fields.insert("priority".to_string(), IndexValue::String(self.priority.to_string()));
        fields
    }
}
