//! CLI command definitions and subcommands

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use crate::domain::{DelayReason, TaskCategory, TaskPriority, TaskStatus};

/// Calibrate - task planning with AI time estimates
#[derive(Parser)]
#[command(
    name = "cb",
    about = "Task planning with AI time estimates and capacity warnings",
    version,
    after_help = generate_after_help(),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Act as this user instead of the configured one
    #[arg(short, long, global = true)]
    pub user: Option<String>,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create, inspect and finish tasks
    Task {
        #[command(subcommand)]
        command: TaskCommand,
    },

    /// Work with individual subtasks
    Subtask {
        #[command(subcommand)]
        command: SubtaskCommand,
    },

    /// Break a description into subtasks and estimate it without saving
    Analyze {
        /// What needs doing
        description: String,
    },

    /// Show today's planned load against available hours
    Capacity,

    /// Show how close past estimates were to actual time
    Accuracy,

    /// Show or change capacity preferences
    Prefs {
        #[command(subcommand)]
        command: PrefsCommand,
    },

    /// Summarise yesterday's completed and overdue tasks
    Digest {
        /// Send digests to every subscribed user through the log sink
        #[arg(long)]
        all: bool,
    },
}

/// Task subcommands
#[derive(Debug, Subcommand)]
pub enum TaskCommand {
    /// Add a task; estimated by the model unless --minutes is given
    Add {
        title: String,

        #[arg(short, long)]
        description: Option<String>,

        /// creative, analytical, administrative, collaborative
        #[arg(long)]
        category: Option<TaskCategory>,

        /// low, medium, high, urgent
        #[arg(short, long)]
        priority: Option<TaskPriority>,

        /// RFC 3339 timestamp or YYYY-MM-DD (end of that day, UTC)
        #[arg(long, value_parser = parse_deadline)]
        deadline: Option<DateTime<Utc>>,

        /// Manual estimate in minutes; skips the model
        #[arg(short, long)]
        minutes: Option<f64>,

        /// Subtask to include (repeatable); skips decomposition
        #[arg(short, long = "subtask")]
        subtasks: Vec<String>,
    },

    /// List tasks, newest first
    List {
        /// planned, in_progress, completed, deferred, delegated
        #[arg(short, long)]
        status: Option<TaskStatus>,

        #[arg(long, default_value = "1")]
        page: usize,

        #[arg(long)]
        page_size: Option<usize>,
    },

    /// Show a task with subtasks and its current estimate
    Show {
        /// Task ID (or partial match)
        id: String,
    },

    /// Change task fields; omitted fields stay as they are
    Update {
        /// Task ID (or partial match)
        id: String,

        #[arg(long)]
        title: Option<String>,

        /// Empty string clears the description
        #[arg(short, long)]
        description: Option<String>,

        #[arg(long)]
        category: Option<TaskCategory>,

        #[arg(short, long)]
        priority: Option<TaskPriority>,

        #[arg(long, value_parser = parse_deadline)]
        deadline: Option<DateTime<Utc>>,

        #[arg(short, long)]
        minutes: Option<f64>,

        #[arg(short, long)]
        status: Option<TaskStatus>,
    },

    /// Delete a task with its subtasks and history
    Delete {
        /// Task ID (or partial match)
        id: String,
    },

    /// Mark a task in progress
    Start {
        /// Task ID (or partial match)
        id: String,
    },

    /// Mark a task done with the time it actually took
    Complete {
        /// Task ID (or partial match)
        id: String,

        /// Minutes actually spent
        #[arg(short, long)]
        minutes: f64,

        /// interruptions, scope_creep, underestimated, other
        #[arg(short, long)]
        reason: Option<DelayReason>,

        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Push a task out of today's plan
    Defer {
        /// Task ID (or partial match)
        id: String,
    },

    /// Recompute the estimate from the task's subtasks and record it
    Reestimate {
        /// Task ID (or partial match)
        id: String,
    },
}

/// Subtask subcommands
#[derive(Debug, Subcommand)]
pub enum SubtaskCommand {
    /// Mark a subtask completed
    Done {
        /// Subtask ID
        id: String,
    },
}

/// Preference subcommands
#[derive(Debug, Subcommand)]
pub enum PrefsCommand {
    /// Print current preferences
    Show,

    /// Change preferences; omitted values stay as they are
    Set {
        #[arg(long)]
        work_hours: Option<f64>,

        #[arg(long)]
        buffer_percent: Option<u32>,

        /// Utilisation percentage that triggers the caution alert
        #[arg(long)]
        caution_threshold: Option<u32>,

        /// IANA zone name, e.g. Europe/Berlin
        #[arg(long)]
        timezone: Option<String>,

        #[arg(long)]
        notifications: Option<bool>,
    },
}

/// Parse a deadline from RFC 3339 or a bare date
pub fn parse_deadline(s: &str) -> Result<DateTime<Utc>, String> {
    debug!(%s, "parse_deadline: called");
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| format!("Invalid deadline '{}': use YYYY-MM-DD or RFC 3339", s))?;
    let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
    Ok(date.and_time(end_of_day).and_utc())
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("calibrate")
        .join("logs")
        .join("calibrate.log")
}

/// After-help text pointing at the log file
pub fn generate_after_help() -> String {
    format!("Logs are written to: {}", get_log_path().display())
}

/// Output format for commands that print records
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}
