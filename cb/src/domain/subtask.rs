//! Subtask record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use taskstore::{IndexValue, Record, now_ms};

use super::id::generate_id;
use super::task::TaskCategory;

/// One step of a Task, usually produced by the decomposer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtask {
    pub id: String,

    /// Parent task
    pub task_id: String,

    pub description: String,

    pub category: TaskCategory,

    /// Share of the parent estimate, in minutes
    pub estimated_time: Option<f64>,

    /// Sort key within the parent; duplicates are allowed
    pub order: i32,

    pub is_completed: bool,

    /// Generated by the decomposer rather than typed by the user
    pub is_implicit: bool,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,

    /// Last update timestamp (Unix milliseconds)
    pub updated_at: i64,

    pub completed_at: Option<DateTime<Utc>>,
}

impl Subtask {
    pub fn new(task_id: impl Into<String>, description: impl Into<String>, order: i32) -> Self {
        let description = description.into();
        let now = now_ms();
        Self {
            id: generate_id("subtask", &description),
            task_id: task_id.into(),
            description,
            category: TaskCategory::Unknown,
            estimated_time: None,
            order,
            is_completed: false,
            is_implicit: false,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn with_category(mut self, category: TaskCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_estimated_time(mut self, minutes: f64) -> Self {
        self.estimated_time = Some(minutes);
        self
    }

    /// Replace the share of the parent estimate
    pub fn set_estimated_time(&mut self, minutes: f64) {
        self.estimated_time = Some(minutes);
        self.updated_at = now_ms();
    }

    pub fn implicit(mut self) -> Self {
        self.is_implicit = true;
        self
    }

    /// Mark done; the first completion timestamp is kept
    pub fn complete(&mut self, at: DateTime<Utc>) {
        self.is_completed = true;
        if self.completed_at.is_none() {
            self.completed_at = Some(at);
        }
        self.updated_at = now_ms();
    }
}

impl Record for Subtask {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn collection_name() -> &'static str {
        "subtasks"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("task_id".to_string(), IndexValue::String(self.task_id.clone()));
        fields.insert("is_completed".to_string(), IndexValue::Bool(self.is_completed));
        fields
    }
}
