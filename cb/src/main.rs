//! Calibrate - task planning with AI time estimates
//!
//! CLI entry point.

use std::fs;
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use calibrate::calibration::AccuracyStats;
use calibrate::capacity::{CapacityReport, Severity};
use calibrate::cli::{Cli, Command, OutputFormat, PrefsCommand, SubtaskCommand, TaskCommand, get_log_path};
use calibrate::config::Config;
use calibrate::digest::{DigestBuilder, LogSink, format_time};
use calibrate::domain::{CapacityPreferences, PreferencesPatch, Task, TaskStatus, User};
use calibrate::llm::{LlmClient, create_client};
use calibrate::planner::{Analysis, Completion, NewTask, TaskDetail, TaskList, TaskPatch, TaskPlanner};
use calibrate::state::StateManager;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level).map(|s| s.to_uppercase()) {
        Some(s) => match s.as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref()).context("Failed to setup logging")?;
    config.validate().context("Invalid configuration")?;

    let user_id = cli.user.clone().unwrap_or_else(|| config.user.id.clone());
    let email = if user_id == config.user.id {
        config.user.email.clone()
    } else {
        format!("{}@localhost", user_id)
    };

    let state = StateManager::spawn(&config.storage.path).context("Failed to spawn StateManager")?;
    let llm = if needs_llm(&cli.command) { llm_client(&config) } else { None };
    let planner = TaskPlanner::new(state.clone(), llm, &config)?;
    let user = planner.get_or_create_user(&user_id, &email).await?;

    debug!(command = ?cli.command, %user_id, "main: dispatching command");
    let result = dispatch(&planner, &user, cli.command, cli.format).await;

    if let Err(e) = state.shutdown().await {
        warn!(error = %e, "main: StateManager shutdown failed");
    }
    result
}

/// Commands that may call the model
fn needs_llm(command: &Command) -> bool {
    match command {
        Command::Analyze { .. } => true,
        Command::Task { command } => match command {
            TaskCommand::Add { minutes, subtasks, .. } => minutes.is_none() && subtasks.is_empty(),
            TaskCommand::Reestimate { .. } => true,
            _ => false,
        },
        _ => false,
    }
}

/// Build the LLM client; a missing key degrades to single-step estimates
fn llm_client(config: &Config) -> Option<Arc<dyn LlmClient>> {
    match create_client(&config.llm) {
        Ok(client) => {
            debug!(provider = %config.llm.provider, model = %config.llm.model, "llm_client: created");
            Some(client)
        }
        Err(e) => {
            warn!(error = %e, "llm_client: unavailable, estimates will not be decomposed");
            eprintln!("{} {}", "warning:".yellow(), e);
            None
        }
    }
}

async fn dispatch(planner: &TaskPlanner, user: &User, command: Command, format: OutputFormat) -> Result<()> {
    let user_id = user.id.as_str();
    match command {
        Command::Task { command } => cmd_task(planner, user_id, command, format).await,
        Command::Subtask {
            command: SubtaskCommand::Done { id },
        } => {
            let subtask = planner.complete_subtask(user_id, &id).await?;
            match format {
                OutputFormat::Json => print_json(&subtask),
                OutputFormat::Text => {
                    println!("{} Completed subtask: {}", "✓".green(), subtask.description);
                    Ok(())
                }
            }
        }
        Command::Analyze { description } => {
            let analysis = planner.analyze(user_id, &description).await?;
            match format {
                OutputFormat::Json => print_json(&analysis),
                OutputFormat::Text => {
                    print_analysis(&analysis);
                    Ok(())
                }
            }
        }
        Command::Capacity => {
            let report = planner.capacity_report(user_id).await?;
            match format {
                OutputFormat::Json => print_json(&report),
                OutputFormat::Text => {
                    print_capacity(&report);
                    Ok(())
                }
            }
        }
        Command::Accuracy => {
            let stats = planner.accuracy(user_id).await?;
            match format {
                OutputFormat::Json => print_json(&stats),
                OutputFormat::Text => {
                    print_accuracy(&stats);
                    Ok(())
                }
            }
        }
        Command::Prefs { command } => {
            let prefs = match command {
                PrefsCommand::Show => planner.preferences(user_id).await?,
                PrefsCommand::Set {
                    work_hours,
                    buffer_percent,
                    caution_threshold,
                    timezone,
                    notifications,
                } => {
                    let patch = PreferencesPatch {
                        work_hours_per_day: work_hours,
                        buffer_percent,
                        alert_caution_threshold: caution_threshold,
                        timezone,
                        notifications_enabled: notifications,
                    };
                    planner.update_preferences(user_id, patch).await?
                }
            };
            match format {
                OutputFormat::Json => print_json(&prefs),
                OutputFormat::Text => {
                    print_prefs(&prefs);
                    Ok(())
                }
            }
        }
        Command::Digest { all } => cmd_digest(planner, user, all, format).await,
    }
}

async fn cmd_task(planner: &TaskPlanner, user_id: &str, command: TaskCommand, format: OutputFormat) -> Result<()> {
    debug!(?command, "cmd_task: called");
    match command {
        TaskCommand::Add {
            title,
            description,
            category,
            priority,
            deadline,
            minutes,
            subtasks,
        } => {
            let new = NewTask {
                title,
                description,
                category: category.unwrap_or_default(),
                priority: priority.unwrap_or_default(),
                deadline,
                subtasks,
                estimated_minutes: minutes,
            };
            let detail = planner.create_task(user_id, new).await?;
            match format {
                OutputFormat::Json => print_json(&detail),
                OutputFormat::Text => {
                    println!("{} Created task: {}", "✓".green(), detail.task.id.cyan());
                    print_detail(&detail);
                    Ok(())
                }
            }
        }
        TaskCommand::List {
            status,
            page,
            page_size,
        } => {
            let list = planner.list_tasks(user_id, status, page, page_size).await?;
            match format {
                OutputFormat::Json => print_json(&list),
                OutputFormat::Text => {
                    print_list(&list);
                    Ok(())
                }
            }
        }
        TaskCommand::Show { id } => {
            let detail = planner.get_task(user_id, &id).await?;
            match format {
                OutputFormat::Json => print_json(&detail),
                OutputFormat::Text => {
                    print_detail(&detail);
                    Ok(())
                }
            }
        }
        TaskCommand::Update {
            id,
            title,
            description,
            category,
            priority,
            deadline,
            minutes,
            status,
        } => {
            let patch = TaskPatch {
                title,
                description,
                category,
                priority,
                status,
                deadline,
                estimated_minutes: minutes,
            };
            let task = planner.update_task(user_id, &id, patch).await?;
            print_task_result(&task, "Updated", format)
        }
        TaskCommand::Delete { id } => {
            planner.delete_task(user_id, &id).await?;
            match format {
                OutputFormat::Json => print_json(&serde_json::json!({ "deleted": id })),
                OutputFormat::Text => {
                    println!("{} Deleted task: {}", "✓".green(), id);
                    Ok(())
                }
            }
        }
        TaskCommand::Start { id } => {
            let task = planner.start_task(user_id, &id).await?;
            print_task_result(&task, "Started", format)
        }
        TaskCommand::Defer { id } => {
            let task = planner.defer_task(user_id, &id).await?;
            print_task_result(&task, "Deferred", format)
        }
        TaskCommand::Complete {
            id,
            minutes,
            reason,
            notes,
        } => {
            let completion = Completion {
                actual_minutes: minutes,
                delay_reason: reason,
                notes,
            };
            let (task, actual) = planner.complete_task(user_id, &id, completion).await?;
            match format {
                OutputFormat::Json => print_json(&serde_json::json!({ "task": task, "outcome": actual })),
                OutputFormat::Text => {
                    println!("{} Completed task: {}", "✓".green(), task.title);
                    match actual.predicted_time {
                        Some(predicted) => println!(
                            "  Estimated {}, took {}",
                            format_time(predicted),
                            format_time(actual.actual_time)
                        ),
                        None => println!("  Took {} (no prior estimate)", format_time(actual.actual_time)),
                    }
                    Ok(())
                }
            }
        }
        TaskCommand::Reestimate { id } => {
            let detail = planner.reestimate(user_id, &id).await?;
            match format {
                OutputFormat::Json => print_json(&detail),
                OutputFormat::Text => {
                    print_detail(&detail);
                    Ok(())
                }
            }
        }
    }
}

async fn cmd_digest(planner: &TaskPlanner, user: &User, all: bool, format: OutputFormat) -> Result<()> {
    debug!(user_id = %user.id, all, "cmd_digest: called");
    let builder = DigestBuilder::new(planner.state().clone());
    let now = Utc::now();

    if all {
        let run = builder.run_all(now, &LogSink).await?;
        return match format {
            OutputFormat::Json => print_json(&run),
            OutputFormat::Text => {
                println!("Sent {} digest(s), {} failed", run.sent, run.failed);
                Ok(())
            }
        };
    }

    let digest = builder.build(user, now).await?;
    match format {
        OutputFormat::Json => print_json(&digest),
        OutputFormat::Text => {
            println!("{}", digest.subject().bold());
            println!();
            print!("{}", digest.render(user.full_name.as_deref().unwrap_or("User")));
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_task_result(task: &Task, verb: &str, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(task),
        OutputFormat::Text => {
            println!("{} {} task: {} [{}]", "✓".green(), verb, task.title, colored_status(task.status));
            Ok(())
        }
    }
}

fn colored_status(status: TaskStatus) -> ColoredString {
    let s = status.to_string();
    match status {
        TaskStatus::Planned => s.normal(),
        TaskStatus::InProgress => s.yellow(),
        TaskStatus::Completed => s.green(),
        TaskStatus::Deferred | TaskStatus::Delegated => s.dimmed(),
    }
}

fn minutes_label(minutes: Option<f64>) -> String {
    minutes.map(format_time).unwrap_or_else(|| "-".to_string())
}

fn print_list(list: &TaskList) {
    if list.tasks.is_empty() {
        println!("No tasks");
        return;
    }
    for task in &list.tasks {
        println!(
            "{}  {:<12} {:>9}  {} {}",
            task.id.yellow(),
            colored_status(task.status),
            minutes_label(task.estimated_time),
            task.title,
            format!("({}, {})", task.category, task.priority).dimmed()
        );
    }
    let pages = list.total.div_ceil(list.page_size.max(1));
    println!(
        "{}",
        format!("Page {} of {} ({} tasks)", list.page, pages.max(1), list.total).dimmed()
    );
}

fn print_detail(detail: &TaskDetail) {
    let task = &detail.task;
    println!("{}", task.title.bold());
    println!("  ID:        {}", task.id.yellow());
    println!("  Status:    {}", colored_status(task.status));
    println!("  Category:  {}", task.category);
    println!("  Priority:  {}", task.priority);
    if let Some(description) = &task.description {
        println!("  About:     {}", description);
    }
    if let Some(deadline) = task.deadline {
        println!("  Deadline:  {}", deadline.format("%Y-%m-%d %H:%M UTC"));
    }
    if let (Some(o), Some(r), Some(p)) = (task.optimistic_time, task.realistic_time, task.pessimistic_time) {
        println!(
            "  Estimate:  {} best / {} realistic / {} worst",
            format_time(o),
            format_time(r).bold(),
            format_time(p)
        );
    } else if let Some(minutes) = task.estimated_time {
        println!("  Estimate:  {}", format_time(minutes));
    }
    if let Some(prediction) = &detail.prediction {
        println!(
            "  Confidence: {:.0}% ({})",
            prediction.confidence * 100.0,
            prediction.prediction_basis
        );
    }
    if let Some(actual) = task.actual_time {
        println!("  Actual:    {}", format_time(actual));
    }
    if !detail.subtasks.is_empty() {
        println!("  Subtasks:");
        for subtask in &detail.subtasks {
            let mark = if subtask.is_completed { "✓".green() } else { "·".normal() };
            println!(
                "    {} {} {} {}",
                mark,
                subtask.description,
                format!("[{}]", subtask.category).dimmed(),
                subtask.id.dimmed()
            );
        }
    }
}

fn print_analysis(analysis: &Analysis) {
    if analysis.fallback {
        println!("{} could not break this down; estimating it as a single step", "note:".yellow());
    }
    println!("Subtasks:");
    for draft in &analysis.subtasks {
        println!("  {}. {} {}", draft.order, draft.description, format!("[{}]", draft.category).dimmed());
    }
    let estimate = &analysis.estimate;
    println!(
        "Estimate: {} best / {} realistic / {} worst",
        format_time(estimate.optimistic),
        format_time(estimate.realistic).bold(),
        format_time(estimate.pessimistic)
    );
    println!("Confidence: {:.0}% ({})", estimate.confidence * 100.0, estimate.basis);
}

fn print_capacity(report: &CapacityReport) {
    let utilization = format!("{}%", report.utilization_percent);
    let utilization = match report.severity {
        Severity::Critical => utilization.red().bold(),
        Severity::Warning => utilization.red(),
        Severity::Caution => utilization.yellow(),
        Severity::None => utilization.green(),
    };
    println!("Capacity:    {}", format_time(report.total_capacity_minutes as f64));
    println!("Planned:     {}", format_time(report.planned_minutes as f64));
    println!("Buffer:      {}", format_time(report.buffer_minutes as f64));
    println!("Utilization: {}", utilization);
    if let Some(message) = &report.alert_message {
        println!("{} {}", format!("{}:", report.severity).yellow().bold(), message);
    }
    if !report.energy_budget.is_empty() {
        println!("Energy budget:");
        for (category, minutes) in &report.energy_budget {
            println!("  {:<15} {}", category.to_string(), format_time(*minutes as f64));
        }
    }
}

fn print_accuracy(stats: &AccuracyStats) {
    println!("Estimated outcomes:   {}", stats.samples);
    println!("Unestimated outcomes: {}", stats.unpredicted);
    match (stats.mape, stats.mean_bias_minutes) {
        (Some(mape), Some(bias)) => {
            println!("Mean error:           {:.1}%", mape * 100.0);
            let direction = if bias >= 0.0 { "over" } else { "under" };
            println!("Typical overrun:      {:.0} min {}", bias.abs(), direction);
        }
        _ => println!("{}", "Complete some estimated tasks to see accuracy".dimmed()),
    }
}

fn print_prefs(prefs: &CapacityPreferences) {
    println!("work-hours-per-day:      {}", prefs.work_hours_per_day);
    println!("buffer-percent:          {}", prefs.buffer_percent);
    println!("alert-caution-threshold: {}", prefs.alert_caution_threshold);
    println!("alert-warning-threshold: {}", prefs.alert_warning_threshold);
    println!("timezone:                {}", prefs.timezone);
    println!("notifications:           {}", prefs.notifications_enabled);
}
