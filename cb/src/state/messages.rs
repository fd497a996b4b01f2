//! State manager messages
//!
//! Commands and responses for the actor pattern.

use thiserror::Error;
use tokio::sync::oneshot;

use crate::domain::{Actual, Page, Prediction, Subtask, Task, TaskStatus, User};

/// Errors from state operations
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Channel error")]
    ChannelError,
}

/// Response from state operations
pub type StateResponse<T> = Result<T, StateError>;

/// Selection of a user's tasks
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskQuery {
    pub user_id: String,
    /// Match any of these; empty means every status
    pub statuses: Vec<TaskStatus>,
    /// None returns every match
    pub page: Option<Page>,
}

impl TaskQuery {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = TaskStatus>) -> Self {
        self.statuses = statuses.into_iter().collect();
        self
    }

    pub fn with_page(mut self, page: Page) -> Self {
        self.page = Some(page);
        self
    }
}

/// Commands sent to the StateManager actor
#[derive(Debug)]
pub enum StateCommand {
    // Task operations
    CreateTask {
        task: Task,
        subtasks: Vec<Subtask>,
        prediction: Option<Prediction>,
        reply: oneshot::Sender<StateResponse<String>>,
    },
    GetTask {
        id: String,
        reply: oneshot::Sender<StateResponse<Option<Task>>>,
    },
    UpdateTask {
        task: Task,
        reply: oneshot::Sender<StateResponse<()>>,
    },
    DeleteTask {
        id: String,
        reply: oneshot::Sender<StateResponse<bool>>,
    },
    ListTasks {
        query: TaskQuery,
        reply: oneshot::Sender<StateResponse<(Vec<Task>, usize)>>,
    },
    CompleteTask {
        task: Task,
        actual: Actual,
        reply: oneshot::Sender<StateResponse<()>>,
    },
    /// Updated estimates: the task, refreshed or newly drafted subtasks, one new prediction
    ReestimateTask {
        task: Task,
        updated: Vec<Subtask>,
        created: Vec<Subtask>,
        prediction: Prediction,
        reply: oneshot::Sender<StateResponse<()>>,
    },

    // Subtask operations
    GetSubtask {
        id: String,
        reply: oneshot::Sender<StateResponse<Option<Subtask>>>,
    },
    UpdateSubtask {
        subtask: Subtask,
        reply: oneshot::Sender<StateResponse<()>>,
    },
    ListSubtasks {
        task_id: String,
        reply: oneshot::Sender<StateResponse<Vec<Subtask>>>,
    },

    // Prediction operations (append-only)
    AppendPrediction {
        prediction: Prediction,
        reply: oneshot::Sender<StateResponse<String>>,
    },
    ListPredictions {
        task_id: String,
        reply: oneshot::Sender<StateResponse<Vec<Prediction>>>,
    },

    // Actual operations (append-only)
    AppendActual {
        actual: Actual,
        reply: oneshot::Sender<StateResponse<String>>,
    },
    ListActuals {
        user_id: String,
        reply: oneshot::Sender<StateResponse<Vec<Actual>>>,
    },

    // User operations
    GetUser {
        id: String,
        reply: oneshot::Sender<StateResponse<Option<User>>>,
    },
    UpsertUser {
        user: User,
        reply: oneshot::Sender<StateResponse<()>>,
    },
    ListUsers {
        active_only: bool,
        reply: oneshot::Sender<StateResponse<Vec<User>>>,
    },

    // Maintenance
    RebuildIndexes {
        reply: oneshot::Sender<StateResponse<usize>>,
    },

    // Shutdown
    Shutdown,
}
