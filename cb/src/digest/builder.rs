//! DigestBuilder - the daily summary of yesterday's work
//!
//! "Yesterday" is the calendar day before `now` in the user's own timezone.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info};

use super::sink::{Notification, NotificationSink, NotifyError};
use crate::domain::{DomainError, Task, TaskStatus, User};
use crate::state::{StateError, StateManager, TaskQuery};

#[derive(Debug, Error)]
pub enum DigestError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Preferences(#[from] DomainError),

    #[error(transparent)]
    Notify(#[from] NotifyError),
}

/// One task line in the digest
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DigestLine {
    pub task_id: String,
    pub title: String,
    pub minutes: Option<f64>,
}

/// Summary of one user's day
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Digest {
    pub user_id: String,
    pub date: NaiveDate,
    pub completed: Vec<DigestLine>,
    pub overdue: Vec<DigestLine>,
    /// Actual time where recorded, else the estimate
    pub completed_minutes: f64,
}

impl Digest {
    pub fn subject(&self) -> String {
        format!("Your Calibrate Digest: {} tasks completed", self.completed.len())
    }

    /// Plain-text body
    pub fn render(&self, name: &str) -> String {
        let mut body = format!(
            "Hello {},\n\nHere is your summary for {}:\n\nTime completed: {}\nTasks done: {}\n\nCompleted tasks:\n",
            name,
            self.date.format("%A, %B %d"),
            format_time(self.completed_minutes),
            self.completed.len()
        );
        push_lines(&mut body, &self.completed, "No tasks completed yesterday.");
        body.push_str("\nRollover/overdue tasks:\n");
        push_lines(&mut body, &self.overdue, "No overdue tasks! Great job.");
        body
    }
}

fn push_lines(body: &mut String, lines: &[DigestLine], empty: &str) {
    if lines.is_empty() {
        body.push_str(&format!("  {}\n", empty));
    }
    for line in lines {
        body.push_str(&format!("  - {} ({})\n", line.title, format_time(line.minutes.unwrap_or(0.0))));
    }
}

/// Minutes as "1h 35min", or "35min" under an hour
pub fn format_time(minutes: f64) -> String {
    if !minutes.is_finite() || minutes <= 0.0 {
        return "0min".to_string();
    }
    let hours = (minutes / 60.0).floor() as u64;
    let mins = (minutes % 60.0).floor() as u64;
    if hours > 0 {
        format!("{}h {}min", hours, mins)
    } else {
        format!("{}min", mins)
    }
}

/// Outcome of a digest run over every subscribed user
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DigestRun {
    pub sent: usize,
    pub failed: usize,
}

/// Builds and sends daily digests
pub struct DigestBuilder {
    state: StateManager,
}

impl DigestBuilder {
    pub fn new(state: StateManager) -> Self {
        Self { state }
    }

    /// Build the digest covering the day before `now` for one user
    pub async fn build(&self, user: &User, now: DateTime<Utc>) -> Result<Digest, DigestError> {
        debug!(user_id = %user.id, %now, "build: called");
        let tz = user.preferences.tz()?;
        let today = now.with_timezone(&tz).date_naive();
        let yesterday = today.pred_opt().unwrap_or(today);
        let start = local_midnight(tz, yesterday);
        let end = local_midnight(tz, today);
        let cutoff = end - Duration::microseconds(1);

        let (done, _) = self
            .state
            .list_tasks(TaskQuery::for_user(&user.id).with_statuses([TaskStatus::Completed]))
            .await?;
        let completed: Vec<&Task> = done
            .iter()
            .filter(|t| t.completed_at.is_some_and(|at| at >= start && at < end))
            .collect();

        let (open, _) = self
            .state
            .list_tasks(TaskQuery::for_user(&user.id).with_statuses([TaskStatus::Planned, TaskStatus::InProgress]))
            .await?;
        let overdue: Vec<DigestLine> = open
            .iter()
            .filter(|t| t.is_overdue(cutoff))
            .map(|t| line(t, t.estimated_time))
            .collect();

        let completed_minutes = completed
            .iter()
            .map(|t| t.actual_time.or(t.estimated_time).unwrap_or(0.0))
            .sum();

        Ok(Digest {
            user_id: user.id.clone(),
            date: yesterday,
            completed: completed
                .iter()
                .map(|t| line(t, t.actual_time.or(t.estimated_time)))
                .collect(),
            overdue,
            completed_minutes,
        })
    }

    /// Build and send one user's digest
    pub async fn send(&self, user: &User, now: DateTime<Utc>, sink: &dyn NotificationSink) -> Result<Digest, DigestError> {
        let digest = self.build(user, now).await?;
        let notification = Notification {
            subject: digest.subject(),
            recipient: user.email.clone(),
            body: digest.render(user.full_name.as_deref().unwrap_or("User")),
        };
        sink.send(&notification).await?;
        Ok(digest)
    }

    /// Send digests to every active user with notifications on
    ///
    /// A failure for one user is logged and does not stop the others.
    pub async fn run_all(&self, now: DateTime<Utc>, sink: &dyn NotificationSink) -> Result<DigestRun, DigestError> {
        debug!(%now, "run_all: called");
        let users = self.state.list_users(true).await?;
        let mut run = DigestRun::default();

        for user in users.iter().filter(|u| u.preferences.notifications_enabled) {
            match self.send(user, now, sink).await {
                Ok(digest) => {
                    debug!(user_id = %user.id, completed = digest.completed.len(), "run_all: sent");
                    run.sent += 1;
                }
                Err(e) => {
                    error!(user_id = %user.id, error = %e, "Failed to send digest");
                    run.failed += 1;
                }
            }
        }

        info!(sent = run.sent, failed = run.failed, "Digest run finished");
        Ok(run)
    }
}

fn line(task: &Task, minutes: Option<f64>) -> DigestLine {
    DigestLine {
        task_id: task.id.clone(),
        title: task.title.clone(),
        minutes,
    }
}

/// First instant of `date` in `tz`, skipping forward over DST gaps
fn local_midnight(tz: Tz, date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(chrono::NaiveTime::MIN);
    (0..3)
        .find_map(|h| tz.from_local_datetime(&(midnight + Duration::hours(h))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}

#[cfg(test)]
mod tests {
    use super::super::sink::mock::MemorySink;
    use super::*;
    use tempfile::tempdir;

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn completed(title: &str, actual: f64, when: &str) -> Task {
        let mut task = Task::new("user-1", title).with_estimated_time(60.0);
        task.complete(actual, at(when)).unwrap();
        task
    }

    async fn seeded() -> (StateManager, tempfile::TempDir) {
        let temp = tempdir().unwrap();
        let state = StateManager::spawn(temp.path()).unwrap();

        let mut deferred = Task::new("user-1", "Old deferred").with_deadline(at("2026-10-10T12:00:00Z"));
        deferred.set_status(TaskStatus::Deferred).unwrap();

        for task in [
            completed("Yesterday's report", 95.0, "2026-10-17T15:00:00Z"),
            completed("Two days ago", 30.0, "2026-10-16T15:00:00Z"),
            completed("Early today", 20.0, "2026-10-18T01:00:00Z"),
            Task::new("user-1", "Missed deadline")
                .with_estimated_time(30.0)
                .with_deadline(at("2026-10-17T12:00:00Z")),
            Task::new("user-1", "Due tomorrow").with_deadline(at("2026-10-19T12:00:00Z")),
            deferred,
        ] {
            state.create_task(task, vec![], None).await.unwrap();
        }
        (state, temp)
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0.0), "0min");
        assert_eq!(format_time(45.0), "45min");
        assert_eq!(format_time(95.0), "1h 35min");
        assert_eq!(format_time(120.0), "2h 0min");
    }

    #[tokio::test]
    async fn test_build_selects_yesterday_and_overdue() {
        let (state, _temp) = seeded().await;
        let user = User::new("user-1", "one@example.com");
        let digest = DigestBuilder::new(state)
            .build(&user, at("2026-10-18T09:00:00Z"))
            .await
            .unwrap();

        assert_eq!(digest.date, NaiveDate::from_ymd_opt(2026, 10, 17).unwrap());
        assert_eq!(digest.completed.len(), 1);
        assert_eq!(digest.completed[0].title, "Yesterday's report");
        assert_eq!(digest.completed_minutes, 95.0);
        assert_eq!(digest.overdue.len(), 1);
        assert_eq!(digest.overdue[0].title, "Missed deadline");
        assert_eq!(digest.subject(), "Your Calibrate Digest: 1 tasks completed");

        let body = digest.render("Sam");
        assert!(body.contains("Saturday, October 17"));
        assert!(body.contains("Time completed: 1h 35min"));
        assert!(body.contains("  - Missed deadline (30min)"));
    }

    #[tokio::test]
    async fn test_build_uses_user_timezone() {
        let (state, _temp) = seeded().await;
        let mut user = User::new("user-1", "one@example.com");
        user.preferences.timezone = "America/New_York".to_string();

        // 23:00 on the 17th in New York, so yesterday is the 16th
        let digest = DigestBuilder::new(state)
            .build(&user, at("2026-10-18T03:00:00Z"))
            .await
            .unwrap();
        assert_eq!(digest.date, NaiveDate::from_ymd_opt(2026, 10, 16).unwrap());
        assert_eq!(digest.completed.len(), 1);
        assert_eq!(digest.completed[0].title, "Two days ago");
    }

    #[tokio::test]
    async fn test_empty_digest_body() {
        let temp = tempdir().unwrap();
        let state = StateManager::spawn(temp.path()).unwrap();
        let user = User::new("nobody", "nobody@example.com");
        let digest = DigestBuilder::new(state).build(&user, Utc::now()).await.unwrap();
        let body = digest.render("User");
        assert!(body.contains("No tasks completed yesterday."));
        assert!(body.contains("No overdue tasks! Great job."));
        assert_eq!(digest.subject(), "Your Calibrate Digest: 0 tasks completed");
    }

    #[tokio::test]
    async fn test_run_all_isolates_failures() {
        let (state, _temp) = seeded().await;

        let one = User::new("user-1", "one@example.com");
        let two = User::new("user-2", "two@example.com");
        let mut muted = User::new("user-3", "three@example.com");
        muted.preferences.notifications_enabled = false;
        let mut inactive = User::new("user-4", "four@example.com");
        inactive.is_active = false;
        for user in [one, two, muted, inactive] {
            state.upsert_user(user).await.unwrap();
        }

        let sink = MemorySink {
            failing: vec!["two@example.com".to_string()],
            ..Default::default()
        };
        let run = DigestBuilder::new(state)
            .run_all(at("2026-10-18T09:00:00Z"), &sink)
            .await
            .unwrap();

        assert_eq!(run, DigestRun { sent: 1, failed: 1 });
        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, "one@example.com");
        assert!(sent[0].body.starts_with("Hello User,"));
    }
}
