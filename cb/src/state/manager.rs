//! StateManager - actor that owns TaskStore
//!
//! Processes commands via channels for thread-safe access to persistent state.

use std::path::Path;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::domain::{Actual, Filter, Prediction, Record, Store, Subtask, Task, TaskStatus, User};

use super::messages::{StateCommand, StateError, StateResponse, TaskQuery};

/// Collections removed together with their parent task
const TASK_CHILDREN: [&str; 3] = ["subtasks", "predictions", "actuals"];

/// Handle to send commands to the StateManager
#[derive(Clone)]
pub struct StateManager {
    tx: mpsc::Sender<StateCommand>,
}

impl StateManager {
    /// Spawn a new StateManager actor over the store at `store_path`
    pub fn spawn(store_path: impl AsRef<Path>) -> eyre::Result<Self> {
        debug!(store_path = %store_path.as_ref().display(), "spawn: called");
        let store = Store::open(store_path.as_ref())?;
        Self::spawn_with_store(store)
    }

    /// Spawn over an already opened store
    pub fn spawn_with_store(mut store: Store) -> eyre::Result<Self> {
        let task_count = store.rebuild_indexes::<Task>()?;
        let user_count = store.rebuild_indexes::<User>()?;
        info!(task_count, user_count, "Rebuilt indexes for Task and User records");

        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(actor_loop(store, rx));

        info!("StateManager spawned");
        Ok(Self { tx })
    }

    /// Send a command and wait for its reply
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<StateResponse<T>>) -> StateCommand,
    ) -> StateResponse<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    // === Task operations ===

    /// Create a task with its subtasks and initial prediction in one transaction
    pub async fn create_task(
        &self,
        task: Task,
        subtasks: Vec<Subtask>,
        prediction: Option<Prediction>,
    ) -> StateResponse<String> {
        debug!(task_id = %task.id, subtask_count = subtasks.len(), "create_task: called");
        self.request(|reply| StateCommand::CreateTask {
            task,
            subtasks,
            prediction,
            reply,
        })
        .await
    }

    pub async fn get_task(&self, id: &str) -> StateResponse<Option<Task>> {
        debug!(%id, "get_task: called");
        self.request(|reply| StateCommand::GetTask {
            id: id.to_string(),
            reply,
        })
        .await
    }

    /// Get a Task by ID, returning error if not found
    pub async fn get_task_required(&self, id: &str) -> StateResponse<Task> {
        self.get_task(id)
            .await?
            .ok_or_else(|| StateError::NotFound(format!("Task {}", id)))
    }

    pub async fn update_task(&self, task: Task) -> StateResponse<()> {
        debug!(task_id = %task.id, status = %task.status, "update_task: called");
        self.request(|reply| StateCommand::UpdateTask { task, reply }).await
    }

    /// Delete a task and everything hanging off it; false if it did not exist
    pub async fn delete_task(&self, id: &str) -> StateResponse<bool> {
        debug!(%id, "delete_task: called");
        self.request(|reply| StateCommand::DeleteTask {
            id: id.to_string(),
            reply,
        })
        .await
    }

    /// List a user's tasks newest first, with the total match count
    pub async fn list_tasks(&self, query: TaskQuery) -> StateResponse<(Vec<Task>, usize)> {
        debug!(user_id = %query.user_id, statuses = ?query.statuses, page = ?query.page, "list_tasks: called");
        self.request(|reply| StateCommand::ListTasks { query, reply }).await
    }

    /// Persist a completed task and its outcome record together
    pub async fn complete_task(&self, task: Task, actual: Actual) -> StateResponse<()> {
        debug!(task_id = %task.id, actual_time = actual.actual_time, "complete_task: called");
        self.request(|reply| StateCommand::CompleteTask { task, actual, reply })
            .await
    }

    /// Persist a re-estimated task, its subtasks and the new prediction together
    pub async fn reestimate_task(
        &self,
        task: Task,
        updated: Vec<Subtask>,
        created: Vec<Subtask>,
        prediction: Prediction,
    ) -> StateResponse<()> {
        debug!(task_id = %task.id, updated = updated.len(), created = created.len(), "reestimate_task: called");
        self.request(|reply| StateCommand::ReestimateTask {
            task,
            updated,
            created,
            prediction,
            reply,
        })
        .await
    }

    // === Subtask operations ===

    pub async fn get_subtask(&self, id: &str) -> StateResponse<Option<Subtask>> {
        debug!(%id, "get_subtask: called");
        self.request(|reply| StateCommand::GetSubtask {
            id: id.to_string(),
            reply,
        })
        .await
    }

    pub async fn update_subtask(&self, subtask: Subtask) -> StateResponse<()> {
        debug!(subtask_id = %subtask.id, "update_subtask: called");
        self.request(|reply| StateCommand::UpdateSubtask { subtask, reply })
            .await
    }

    /// Subtasks of a task in display order
    pub async fn list_subtasks(&self, task_id: &str) -> StateResponse<Vec<Subtask>> {
        debug!(%task_id, "list_subtasks: called");
        self.request(|reply| StateCommand::ListSubtasks {
            task_id: task_id.to_string(),
            reply,
        })
        .await
    }

    // === Prediction operations ===

    pub async fn append_prediction(&self, prediction: Prediction) -> StateResponse<String> {
        debug!(task_id = %prediction.task_id, "append_prediction: called");
        self.request(|reply| StateCommand::AppendPrediction { prediction, reply })
            .await
    }

    /// Predictions for a task, newest first
    pub async fn list_predictions(&self, task_id: &str) -> StateResponse<Vec<Prediction>> {
        debug!(%task_id, "list_predictions: called");
        self.request(|reply| StateCommand::ListPredictions {
            task_id: task_id.to_string(),
            reply,
        })
        .await
    }

    /// The newest prediction for a task, if any
    pub async fn current_prediction(&self, task_id: &str) -> StateResponse<Option<Prediction>> {
        Ok(self.list_predictions(task_id).await?.into_iter().next())
    }

    // === Actual operations ===

    pub async fn append_actual(&self, actual: Actual) -> StateResponse<String> {
        debug!(task_id = %actual.task_id, "append_actual: called");
        self.request(|reply| StateCommand::AppendActual { actual, reply }).await
    }

    pub async fn list_actuals(&self, user_id: &str) -> StateResponse<Vec<Actual>> {
        debug!(%user_id, "list_actuals: called");
        self.request(|reply| StateCommand::ListActuals {
            user_id: user_id.to_string(),
            reply,
        })
        .await
    }

    // === User operations ===

    pub async fn get_user(&self, id: &str) -> StateResponse<Option<User>> {
        debug!(%id, "get_user: called");
        self.request(|reply| StateCommand::GetUser {
            id: id.to_string(),
            reply,
        })
        .await
    }

    /// Create the user or replace the stored copy
    pub async fn upsert_user(&self, user: User) -> StateResponse<()> {
        debug!(user_id = %user.id, "upsert_user: called");
        self.request(|reply| StateCommand::UpsertUser { user, reply }).await
    }

    pub async fn list_users(&self, active_only: bool) -> StateResponse<Vec<User>> {
        debug!(%active_only, "list_users: called");
        self.request(|reply| StateCommand::ListUsers { active_only, reply })
            .await
    }

    // === Maintenance ===

    pub async fn rebuild_indexes(&self) -> StateResponse<usize> {
        debug!("rebuild_indexes: called");
        self.request(|reply| StateCommand::RebuildIndexes { reply }).await
    }

    /// Shutdown the StateManager
    pub async fn shutdown(&self) -> Result<(), StateError> {
        debug!("shutdown: called");
        self.tx
            .send(StateCommand::Shutdown)
            .await
            .map_err(|_| StateError::ChannelError)
    }
}

fn store_err(e: eyre::Report) -> StateError {
    StateError::StoreError(e.to_string())
}

fn create_task(
    store: &mut Store,
    task: Task,
    subtasks: Vec<Subtask>,
    prediction: Option<Prediction>,
) -> eyre::Result<String> {
    let batch = store.batch()?;
    let id = batch.create(&task)?;
    for subtask in &subtasks {
        batch.create(subtask)?;
    }
    if let Some(prediction) = &prediction {
        batch.create(prediction)?;
    }
    batch.commit()?;
    Ok(id)
}

fn complete_task(store: &mut Store, task: Task, actual: Actual) -> eyre::Result<()> {
    let batch = store.batch()?;
    batch.update(&task)?;
    batch.create(&actual)?;
    batch.commit()
}

fn reestimate_task(
    store: &mut Store,
    task: Task,
    updated: Vec<Subtask>,
    created: Vec<Subtask>,
    prediction: Prediction,
) -> eyre::Result<()> {
    let batch = store.batch()?;
    batch.update(&task)?;
    for subtask in &updated {
        batch.update(subtask)?;
    }
    for subtask in &created {
        batch.create(subtask)?;
    }
    batch.create(&prediction)?;
    batch.commit()
}

fn list_tasks(store: &Store, query: TaskQuery) -> eyre::Result<(Vec<Task>, usize)> {
    let user = Filter::eq("user_id", query.user_id.as_str());

    // A single status (or none) maps directly onto store filters
    if query.statuses.len() <= 1 {
        let mut filters = vec![user];
        if let Some(status) = query.statuses.first() {
            filters.push(Filter::eq("status", status.to_string()));
        }
        return match query.page {
            Some(page) => store.list_page(&filters, page),
            None => {
                let tasks: Vec<Task> = store.list(&filters)?;
                let total = tasks.len();
                Ok((tasks, total))
            }
        };
    }

    // Several statuses: union in memory, keep newest-first order
    let mut tasks: Vec<Task> = Vec::new();
    for status in dedup_statuses(&query.statuses) {
        let filters = [user.clone(), Filter::eq("status", status.to_string())];
        tasks.extend(store.list::<Task>(&filters)?);
    }
    tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
    let total = tasks.len();
    let tasks = match query.page {
        Some(page) => tasks.into_iter().skip(page.offset).take(page.limit).collect(),
        None => tasks,
    };
    Ok((tasks, total))
}

fn dedup_statuses(statuses: &[TaskStatus]) -> Vec<TaskStatus> {
    let mut seen = Vec::new();
    for s in statuses {
        if !seen.contains(s) {
            seen.push(*s);
        }
    }
    seen
}

fn upsert_user(store: &mut Store, user: User) -> eyre::Result<()> {
    if store.get::<User>(user.id())?.is_some() {
        store.update(user)
    } else {
        store.create(user).map(|_| ())
    }
}

/// The actor loop that processes commands
async fn actor_loop(mut store: Store, mut rx: mpsc::Receiver<StateCommand>) {
    debug!("StateManager actor started");

    while let Some(cmd) = rx.recv().await {
        match cmd {
            StateCommand::CreateTask {
                task,
                subtasks,
                prediction,
                reply,
            } => {
                debug!(task_id = %task.id, "actor_loop: CreateTask command");
                let result = create_task(&mut store, task, subtasks, prediction).map_err(store_err);
                let _ = reply.send(result);
            }

            StateCommand::GetTask { id, reply } => {
                debug!(%id, "actor_loop: GetTask command");
                let _ = reply.send(store.get(&id).map_err(store_err));
            }

            StateCommand::UpdateTask { task, reply } => {
                debug!(task_id = %task.id, "actor_loop: UpdateTask command");
                let _ = reply.send(store.update(task).map_err(store_err));
            }

            StateCommand::DeleteTask { id, reply } => {
                debug!(%id, "actor_loop: DeleteTask command");
                let result = store
                    .delete_with_children::<Task>(&id, "task_id", &TASK_CHILDREN)
                    .map_err(store_err);
                let _ = reply.send(result);
            }

            StateCommand::ListTasks { query, reply } => {
                debug!(user_id = %query.user_id, "actor_loop: ListTasks command");
                let _ = reply.send(list_tasks(&store, query).map_err(store_err));
            }

            StateCommand::CompleteTask { task, actual, reply } => {
                debug!(task_id = %task.id, "actor_loop: CompleteTask command");
                let _ = reply.send(complete_task(&mut store, task, actual).map_err(store_err));
            }

            StateCommand::ReestimateTask {
                task,
                updated,
                created,
                prediction,
                reply,
            } => {
                debug!(task_id = %task.id, "actor_loop: ReestimateTask command");
                let result = reestimate_task(&mut store, task, updated, created, prediction).map_err(store_err);
                let _ = reply.send(result);
            }

            StateCommand::GetSubtask { id, reply } => {
                debug!(%id, "actor_loop: GetSubtask command");
                let _ = reply.send(store.get(&id).map_err(store_err));
            }

            StateCommand::UpdateSubtask { subtask, reply } => {
                debug!(subtask_id = %subtask.id, "actor_loop: UpdateSubtask command");
                let _ = reply.send(store.update(subtask).map_err(store_err));
            }

            StateCommand::ListSubtasks { task_id, reply } => {
                debug!(%task_id, "actor_loop: ListSubtasks command");
                let result = store
                    .list::<Subtask>(&[Filter::eq("task_id", task_id)])
                    .map(|mut subtasks| {
                        subtasks.sort_by(|a, b| a.order.cmp(&b.order).then(a.created_at.cmp(&b.created_at)));
                        subtasks
                    })
                    .map_err(store_err);
                let _ = reply.send(result);
            }

            StateCommand::AppendPrediction { prediction, reply } => {
                debug!(prediction_id = %prediction.id, "actor_loop: AppendPrediction command");
                let _ = reply.send(store.create(prediction).map_err(store_err));
            }

            StateCommand::ListPredictions { task_id, reply } => {
                debug!(%task_id, "actor_loop: ListPredictions command");
                let _ = reply.send(store.list(&[Filter::eq("task_id", task_id)]).map_err(store_err));
            }

            StateCommand::AppendActual { actual, reply } => {
                debug!(actual_id = %actual.id, "actor_loop: AppendActual command");
                let _ = reply.send(store.create(actual).map_err(store_err));
            }

            StateCommand::ListActuals { user_id, reply } => {
                debug!(%user_id, "actor_loop: ListActuals command");
                let _ = reply.send(store.list(&[Filter::eq("user_id", user_id)]).map_err(store_err));
            }

            StateCommand::GetUser { id, reply } => {
                debug!(%id, "actor_loop: GetUser command");
                let _ = reply.send(store.get(&id).map_err(store_err));
            }

            StateCommand::UpsertUser { user, reply } => {
                debug!(user_id = %user.id, "actor_loop: UpsertUser command");
                let _ = reply.send(upsert_user(&mut store, user).map_err(store_err));
            }

            StateCommand::ListUsers { active_only, reply } => {
                debug!(%active_only, "actor_loop: ListUsers command");
                let filters = if active_only {
                    vec![Filter::eq("is_active", true)]
                } else {
                    vec![]
                };
                let _ = reply.send(store.list(&filters).map_err(store_err));
            }

            StateCommand::RebuildIndexes { reply } => {
                debug!("actor_loop: RebuildIndexes command");
                let result = (|| -> eyre::Result<usize> {
                    let mut count = store.rebuild_indexes::<Task>()?;
                    count += store.rebuild_indexes::<Subtask>()?;
                    count += store.rebuild_indexes::<Prediction>()?;
                    count += store.rebuild_indexes::<Actual>()?;
                    count += store.rebuild_indexes::<User>()?;
                    Ok(count)
                })()
                .map_err(store_err);
                let _ = reply.send(result);
            }

            StateCommand::Shutdown => {
                info!("StateManager shutting down");
                break;
            }
        }
    }

    debug!("StateManager actor stopped");
}
