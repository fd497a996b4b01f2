//! Request and result shapes for planner operations

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{DelayReason, Prediction, Subtask, Task, TaskCategory, TaskPriority, TaskStatus};
use crate::estimation::{Estimate, SubtaskDraft};

/// Fields for a new task
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub category: TaskCategory,
    pub priority: TaskPriority,
    pub deadline: Option<DateTime<Utc>>,
    /// Subtasks named by the user; skips decomposition when non-empty
    pub subtasks: Vec<String>,
    /// Manual estimate in minutes; skips decomposition and prediction
    pub estimated_minutes: Option<f64>,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// Partial task update; None leaves a field unchanged
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    /// Some("") clears the description
    pub description: Option<String>,
    pub category: Option<TaskCategory>,
    pub priority: Option<TaskPriority>,
    pub status: Option<TaskStatus>,
    pub deadline: Option<DateTime<Utc>>,
    pub estimated_minutes: Option<f64>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.category.is_none()
            && self.priority.is_none()
            && self.status.is_none()
            && self.deadline.is_none()
            && self.estimated_minutes.is_none()
    }
}

/// What the user reports when finishing a task
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub actual_minutes: f64,
    pub delay_reason: Option<DelayReason>,
    pub notes: Option<String>,
}

/// A task with its children
#[derive(Debug, Clone, Serialize)]
pub struct TaskDetail {
    pub task: Task,
    pub subtasks: Vec<Subtask>,
    /// Current (newest) prediction
    pub prediction: Option<Prediction>,
}

/// One page of tasks
#[derive(Debug, Clone, Serialize)]
pub struct TaskList {
    pub tasks: Vec<Task>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
}

/// Decomposition and estimate for a description, not persisted
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub subtasks: Vec<SubtaskDraft>,
    pub estimate: Estimate,
    /// Decomposition failed and the whole task stands in as one step
    pub fallback: bool,
}
