//! TaskPlanner - composes the estimation core with persistent state
//!
//! Every operation is scoped to a user id; records owned by someone else
//! are reported as not found.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::error::PlannerError;
use super::retry::RetryPolicy;
use super::types::{Analysis, Completion, NewTask, TaskDetail, TaskList, TaskPatch};
use crate::calibration::{AccuracyStats, CalibrationTracker, OutcomeRecord, StoreCalibrationTracker};
use crate::capacity::{CapacityAnalyzer, CapacityReport};
use crate::config::{Config, ConfidenceModelKind, EstimatorConfig, PlannerConfig};
use crate::domain::{
    Actual, CapacityPreferences, IdResolver, Page, PreferencesPatch, Subtask, Task, TaskStatus, User,
};
use crate::estimation::{
    Estimate, EstimationError, FixedConfidence, HistoricalConfidence, SubtaskDecomposer, SubtaskDraft, TimeEstimator,
};
use crate::llm::LlmClient;
use crate::state::{StateManager, TaskQuery};

/// Largest page a listing will return
const MAX_PAGE_SIZE: usize = 100;

/// Task operations for one store
pub struct TaskPlanner {
    state: StateManager,
    decomposer: Option<SubtaskDecomposer>,
    estimator: TimeEstimator,
    analyzer: CapacityAnalyzer,
    tracker: Arc<dyn CalibrationTracker>,
    retry: RetryPolicy,
    estimator_config: EstimatorConfig,
    planner_config: PlannerConfig,
    active_statuses: Vec<TaskStatus>,
}

impl TaskPlanner {
    /// Build a planner; without an LLM client every task falls back to a single step
    pub fn new(state: StateManager, llm: Option<Arc<dyn LlmClient>>, config: &Config) -> Result<Self, PlannerError> {
        debug!(has_llm = llm.is_some(), "TaskPlanner::new: called");
        let decomposer = llm.map(|llm| SubtaskDecomposer::new(llm, config.decomposer.clone()));
        let tracker: Arc<dyn CalibrationTracker> = Arc::new(StoreCalibrationTracker::new(state.clone()));
        Ok(Self {
            estimator: TimeEstimator::new(&config.estimator)?,
            analyzer: CapacityAnalyzer::new(&config.capacity),
            retry: RetryPolicy::from_config(&config.planner),
            estimator_config: config.estimator.clone(),
            planner_config: config.planner.clone(),
            active_statuses: config.capacity.active_statuses.clone(),
            state,
            decomposer,
            tracker,
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    // === Users ===

    /// Fetch the user, creating it with default preferences on first use
    pub async fn get_or_create_user(&self, user_id: &str, email: &str) -> Result<User, PlannerError> {
        debug!(%user_id, "get_or_create_user: called");
        if let Some(user) = self.state.get_user(user_id).await? {
            return Ok(user);
        }
        let user = User::new(user_id, email);
        self.state.upsert_user(user.clone()).await?;
        info!(%user_id, "Created user with default preferences");
        Ok(user)
    }

    async fn user(&self, user_id: &str) -> Result<User, PlannerError> {
        self.state
            .get_user(user_id)
            .await?
            .ok_or_else(|| PlannerError::NotFound(format!("user {}", user_id)))
    }

    pub async fn preferences(&self, user_id: &str) -> Result<CapacityPreferences, PlannerError> {
        Ok(self.user(user_id).await?.preferences)
    }

    /// Apply a partial preference update after validating the result
    pub async fn update_preferences(
        &self,
        user_id: &str,
        patch: PreferencesPatch,
    ) -> Result<CapacityPreferences, PlannerError> {
        debug!(%user_id, ?patch, "update_preferences: called");
        let mut user = self.user(user_id).await?;
        if patch.is_empty() {
            return Ok(user.preferences);
        }
        user.preferences = patch.apply(&user.preferences)?;
        user.updated_at = taskstore::now_ms();
        self.state.upsert_user(user.clone()).await?;
        info!(%user_id, "Updated preferences");
        Ok(user.preferences)
    }

    // === Estimation ===

    /// Decompose and estimate a description without persisting anything
    pub async fn analyze(&self, user_id: &str, description: &str) -> Result<Analysis, PlannerError> {
        debug!(%user_id, description_len = description.len(), "analyze: called");
        let description = description.trim();
        if description.is_empty() {
            return Err(EstimationError::InvalidInput("task description is empty".to_string()).into());
        }

        let (subtasks, fallback) = self.decompose(description).await?;
        let estimate = self.estimator_for(user_id).await?.estimate(description, &subtasks)?;
        Ok(Analysis {
            subtasks,
            estimate,
            fallback,
        })
    }

    /// Decompose with retries, degrading to one implicit step when allowed
    async fn decompose(&self, description: &str) -> Result<(Vec<SubtaskDraft>, bool), PlannerError> {
        let Some(decomposer) = self.decomposer.as_ref() else {
            warn!("decompose: no LLM client configured, using single-step fallback");
            return Ok((vec![SubtaskDraft::whole_task(description)], true));
        };

        match self.retry.run(move || decomposer.decompose(description)).await {
            Ok(drafts) => Ok((drafts, false)),
            Err(e @ EstimationError::InvalidInput(_)) => Err(e.into()),
            Err(e) if self.planner_config.fallback_on_failure => {
                warn!(error = %e, "decompose: failed, using single-step fallback");
                Ok((vec![SubtaskDraft::whole_task(description)], true))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Estimator for a user, personalised when history-based confidence is configured
    async fn estimator_for(&self, user_id: &str) -> Result<TimeEstimator, PlannerError> {
        match self.estimator_config.confidence_model {
            ConfidenceModelKind::Fixed => Ok(self.estimator.clone()),
            ConfidenceModelKind::Historical => {
                let stats = self.tracker.accuracy_for(user_id).await?;
                let model = HistoricalConfidence::new(
                    stats,
                    self.estimator_config.min_calibration_samples,
                    FixedConfidence(self.estimator_config.default_confidence),
                );
                Ok(self.estimator.clone().with_confidence(Arc::new(model)))
            }
        }
    }

    // === Tasks ===

    /// Create a task, estimating it unless the caller supplied minutes
    ///
    /// The task, its subtasks and the initial prediction are written together.
    pub async fn create_task(&self, user_id: &str, new: NewTask) -> Result<TaskDetail, PlannerError> {
        debug!(%user_id, title = %new.title, "create_task: called");
        if new.title.trim().is_empty() {
            return Err(PlannerError::InvalidInput("task title is empty".to_string()));
        }

        let mut task = Task::new(user_id, new.title.trim())
            .with_category(new.category)
            .with_priority(new.priority);
        if let Some(description) = new.description.filter(|d| !d.trim().is_empty()) {
            task = task.with_description(description);
        }
        if let Some(deadline) = new.deadline {
            task = task.with_deadline(deadline);
        }

        let (subtasks, prediction) = if let Some(minutes) = new.estimated_minutes {
            task = task.with_estimated_time(minutes);
            let subtasks = manual_subtasks(&task.id, &new.subtasks);
            (subtasks, None)
        } else {
            let drafts = if new.subtasks.is_empty() {
                self.decompose(task.work_text()).await?.0
            } else {
                new.subtasks
                    .iter()
                    .filter(|s| !s.trim().is_empty())
                    .enumerate()
                    .map(|(i, s)| SubtaskDraft {
                        order: i as i32 + 1,
                        description: s.trim().to_string(),
                        category: Default::default(),
                        is_implicit: false,
                    })
                    .collect()
            };
            let estimate = self.estimator_for(user_id).await?.estimate(task.work_text(), &drafts)?;
            apply_estimate(&mut task, &estimate)?;
            let subtasks = draft_subtasks(&task.id, &drafts, estimate.per_subtask());
            (subtasks, Some(estimate.to_prediction(&task.id)))
        };
        task.validate()?;

        self.state
            .create_task(task.clone(), subtasks.clone(), prediction.clone())
            .await?;
        info!(task_id = %task.id, subtask_count = subtasks.len(), "Created task");

        let mut subtasks = subtasks;
        subtasks.sort_by_key(|s| s.order);
        Ok(TaskDetail {
            task,
            subtasks,
            prediction,
        })
    }

    /// Recompute the estimate for an existing task from its stored subtasks
    ///
    /// Each subtask's share is refreshed so the subtasks sum to the new
    /// realistic time. A task stored without subtasks is decomposed first.
    /// Every write lands in one batch.
    pub async fn reestimate(&self, user_id: &str, task_ref: &str) -> Result<TaskDetail, PlannerError> {
        debug!(%user_id, %task_ref, "reestimate: called");
        let mut task = self.owned_task(user_id, task_ref).await?;
        if task.status == TaskStatus::Completed {
            return Err(PlannerError::InvalidInput(format!("task {} is already completed", task.id)));
        }

        let mut stored = self.state.list_subtasks(&task.id).await?;
        let drafts = if stored.is_empty() {
            self.decompose(task.work_text()).await?.0
        } else {
            stored.iter().map(stored_draft).collect()
        };
        let estimate = self.estimator_for(user_id).await?.estimate(task.work_text(), &drafts)?;
        apply_estimate(&mut task, &estimate)?;

        let created = if stored.is_empty() {
            draft_subtasks(&task.id, &drafts, estimate.per_subtask())
        } else {
            for subtask in &mut stored {
                subtask.set_estimated_time(estimate.per_subtask());
            }
            Vec::new()
        };
        let prediction = estimate.to_prediction(&task.id);
        self.state
            .reestimate_task(task.clone(), stored, created, prediction)
            .await?;
        info!(task_id = %task.id, realistic = estimate.realistic, "Re-estimated task");
        self.detail(task).await
    }

    /// One page of a user's tasks, newest first
    pub async fn list_tasks(
        &self,
        user_id: &str,
        status: Option<TaskStatus>,
        page: usize,
        page_size: Option<usize>,
    ) -> Result<TaskList, PlannerError> {
        let page = page.max(1);
        let page_size = page_size
            .unwrap_or(self.planner_config.page_size)
            .clamp(1, MAX_PAGE_SIZE);
        debug!(%user_id, ?status, page, page_size, "list_tasks: called");

        let mut query = TaskQuery::for_user(user_id).with_page(Page::number(page, page_size));
        if let Some(status) = status {
            query = query.with_statuses([status]);
        }
        let (tasks, total) = self.state.list_tasks(query).await?;
        Ok(TaskList {
            tasks,
            total,
            page,
            page_size,
        })
    }

    /// Fetch a task with its subtasks and current prediction
    pub async fn get_task(&self, user_id: &str, task_ref: &str) -> Result<TaskDetail, PlannerError> {
        debug!(%user_id, %task_ref, "get_task: called");
        let task = self.owned_task(user_id, task_ref).await?;
        self.detail(task).await
    }

    async fn detail(&self, task: Task) -> Result<TaskDetail, PlannerError> {
        let subtasks = self.state.list_subtasks(&task.id).await?;
        let prediction = self.state.current_prediction(&task.id).await?;
        Ok(TaskDetail {
            task,
            subtasks,
            prediction,
        })
    }

    /// Apply a partial update; fields left as None are untouched
    pub async fn update_task(&self, user_id: &str, task_ref: &str, patch: TaskPatch) -> Result<Task, PlannerError> {
        debug!(%user_id, %task_ref, ?patch, "update_task: called");
        let mut task = self.owned_task(user_id, task_ref).await?;
        if patch.is_empty() {
            return Ok(task);
        }

        if let Some(title) = patch.title {
            if title.trim().is_empty() {
                return Err(PlannerError::InvalidInput("task title is empty".to_string()));
            }
            task.title = title.trim().to_string();
        }
        if let Some(description) = patch.description {
            task.description = Some(description).filter(|d| !d.trim().is_empty());
        }
        if let Some(category) = patch.category {
            task.category = category;
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        if let Some(deadline) = patch.deadline {
            task.deadline = Some(deadline);
        }
        if let Some(minutes) = patch.estimated_minutes {
            task.estimated_time = Some(minutes);
        }
        if let Some(status) = patch.status {
            if status == TaskStatus::Completed {
                return Err(PlannerError::InvalidInput(
                    "use complete with an actual time to finish a task".to_string(),
                ));
            }
            task.set_status(status)?;
        }
        task.touch();
        task.validate()?;

        self.state.update_task(task.clone()).await?;
        info!(task_id = %task.id, "Updated task");
        Ok(task)
    }

    pub async fn delete_task(&self, user_id: &str, task_ref: &str) -> Result<(), PlannerError> {
        debug!(%user_id, %task_ref, "delete_task: called");
        let task = self.owned_task(user_id, task_ref).await?;
        if !self.state.delete_task(&task.id).await? {
            return Err(PlannerError::NotFound(format!("task {}", task.id)));
        }
        info!(task_id = %task.id, "Deleted task");
        Ok(())
    }

    pub async fn start_task(&self, user_id: &str, task_ref: &str) -> Result<Task, PlannerError> {
        self.transition(user_id, task_ref, TaskStatus::InProgress).await
    }

    pub async fn defer_task(&self, user_id: &str, task_ref: &str) -> Result<Task, PlannerError> {
        self.transition(user_id, task_ref, TaskStatus::Deferred).await
    }

    async fn transition(&self, user_id: &str, task_ref: &str, status: TaskStatus) -> Result<Task, PlannerError> {
        let patch = TaskPatch {
            status: Some(status),
            ..Default::default()
        };
        self.update_task(user_id, task_ref, patch).await
    }

    /// Finish a task and record one calibration outcome for it
    ///
    /// The outcome carries the current prediction, or none if the task was
    /// never estimated by the model.
    pub async fn complete_task(
        &self,
        user_id: &str,
        task_ref: &str,
        completion: Completion,
    ) -> Result<(Task, Actual), PlannerError> {
        debug!(%user_id, %task_ref, actual = completion.actual_minutes, "complete_task: called");
        let mut task = self.owned_task(user_id, task_ref).await?;
        if task.status == TaskStatus::Completed {
            return Err(PlannerError::InvalidInput(format!("task {} is already completed", task.id)));
        }

        let now = Utc::now();
        task.complete(completion.actual_minutes, now)?;
        let predicted = self
            .state
            .current_prediction(&task.id)
            .await?
            .map(|p| p.predicted_time);

        let outcome = OutcomeRecord {
            task_id: task.id.clone(),
            user_id: user_id.to_string(),
            predicted,
            actual: completion.actual_minutes,
            delay_reason: completion.delay_reason,
            notes: completion.notes.filter(|n| !n.trim().is_empty()),
            completed_at: now,
        };

        let actual = self.tracker.record_completion(task.clone(), outcome).await?;
        info!(task_id = %task.id, actual = completion.actual_minutes, ?predicted, "Completed task");
        Ok((task, actual))
    }

    /// Mark one subtask done; completing twice keeps the first timestamp
    pub async fn complete_subtask(&self, user_id: &str, subtask_id: &str) -> Result<Subtask, PlannerError> {
        debug!(%user_id, %subtask_id, "complete_subtask: called");
        let mut subtask = self
            .state
            .get_subtask(subtask_id)
            .await?
            .ok_or_else(|| PlannerError::NotFound(format!("subtask {}", subtask_id)))?;

        // Ownership is checked through the parent task
        match self.state.get_task(&subtask.task_id).await? {
            Some(task) if task.user_id == user_id => {}
            _ => return Err(PlannerError::NotFound(format!("subtask {}", subtask_id))),
        }

        subtask.complete(Utc::now());
        self.state.update_subtask(subtask.clone()).await?;
        Ok(subtask)
    }

    // === Capacity and calibration ===

    /// Capacity over the configured active statuses
    pub async fn capacity_report(&self, user_id: &str) -> Result<CapacityReport, PlannerError> {
        debug!(%user_id, statuses = ?self.active_statuses, "capacity_report: called");
        let user = self.user(user_id).await?;
        let query = TaskQuery::for_user(user_id).with_statuses(self.active_statuses.iter().copied());
        let (tasks, _) = self.state.list_tasks(query).await?;
        Ok(self.analyzer.analyze(&tasks, &user.preferences))
    }

    pub async fn accuracy(&self, user_id: &str) -> Result<AccuracyStats, PlannerError> {
        debug!(%user_id, "accuracy: called");
        Ok(self.tracker.accuracy_for(user_id).await?)
    }

    /// Resolve a full id, hex prefix, or slug fragment to one of the user's tasks
    async fn owned_task(&self, user_id: &str, task_ref: &str) -> Result<Task, PlannerError> {
        if let Some(task) = self.state.get_task(task_ref).await? {
            return if task.user_id == user_id {
                Ok(task)
            } else {
                Err(PlannerError::NotFound(format!("task {}", task_ref)))
            };
        }

        let (tasks, _) = self.state.list_tasks(TaskQuery::for_user(user_id)).await?;
        let names: HashMap<String, String> = tasks.iter().map(|t| (t.id.clone(), t.title.clone())).collect();
        match IdResolver::new(&names).resolve(task_ref) {
            Ok(Some(id)) => tasks
                .into_iter()
                .find(|t| t.id == id)
                .ok_or_else(|| PlannerError::NotFound(format!("task {}", task_ref))),
            Ok(None) => Err(PlannerError::NotFound(format!("task {}", task_ref))),
            Err(candidates) => Err(PlannerError::InvalidInput(format!(
                "'{}' matches several tasks: {}",
                task_ref,
                candidates.join(", ")
            ))),
        }
    }
}

fn apply_estimate(task: &mut Task, estimate: &Estimate) -> Result<(), PlannerError> {
    task.set_estimate(estimate.optimistic, estimate.realistic, estimate.pessimistic)?;
    Ok(())
}

fn draft_subtasks(task_id: &str, drafts: &[SubtaskDraft], minutes_each: f64) -> Vec<Subtask> {
    drafts
        .iter()
        .map(|d| {
            let subtask = Subtask::new(task_id, &d.description, d.order)
                .with_category(d.category)
                .with_estimated_time(minutes_each);
            if d.is_implicit { subtask.implicit() } else { subtask }
        })
        .collect()
}

fn stored_draft(subtask: &Subtask) -> SubtaskDraft {
    SubtaskDraft {
        order: subtask.order,
        description: subtask.description.clone(),
        category: subtask.category,
        is_implicit: subtask.is_implicit,
    }
}

/// Subtasks named by the user alongside a manual estimate; left unestimated
fn manual_subtasks(task_id: &str, descriptions: &[String]) -> Vec<Subtask> {
    descriptions
        .iter()
        .filter(|s| !s.trim().is_empty())
        .enumerate()
        .map(|(i, s)| Subtask::new(task_id, s.trim(), i as i32 + 1))
        .collect()
}
