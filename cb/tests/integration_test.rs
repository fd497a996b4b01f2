//! Integration tests for Calibrate
//!
//! These tests drive the planner end to end against a real store, with the
//! model replaced by a scripted client.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::json;
use tempfile::TempDir;

use calibrate::calibration::{CalibrationTracker, OutcomeRecord, StoreCalibrationTracker};
use calibrate::capacity::Severity;
use calibrate::config::Config;
use calibrate::digest::DigestBuilder;
use calibrate::domain::{DelayReason, PreferencesPatch, PredictionBasis, TaskStatus};
use calibrate::estimation::SUBMIT_TOOL;
use calibrate::llm::{CompletionRequest, CompletionResponse, LlmClient, LlmError};
use calibrate::planner::{Completion, NewTask, PlannerError, TaskPlanner};
use calibrate::state::StateManager;

/// Replays canned results and counts calls
struct ScriptedLlm {
    results: Mutex<VecDeque<Result<CompletionResponse, LlmError>>>,
    calls: Mutex<usize>,
}

impl ScriptedLlm {
    fn new(results: Vec<Result<CompletionResponse, LlmError>>) -> Arc<Self> {
        Arc::new(Self {
            results: Mutex::new(results.into()),
            calls: Mutex::new(0),
        })
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        *self.calls.lock().unwrap() += 1;
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::InvalidResponse("script exhausted".to_string())))
    }
}

fn subtasks_response(items: &[(&str, &str)]) -> CompletionResponse {
    let subtasks: Vec<_> = items
        .iter()
        .enumerate()
        .map(|(i, (description, category))| json!({ "id": i + 1, "description": description, "category": category }))
        .collect();
    CompletionResponse::tool_call(SUBMIT_TOOL, json!({ "subtasks": subtasks }))
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.planner.max_retries = 1;
    config.planner.initial_backoff_ms = 1;
    config
}

async fn planner_with(llm: Option<Arc<ScriptedLlm>>, config: &Config) -> (TaskPlanner, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let state = StateManager::spawn(temp_dir.path()).expect("Failed to spawn StateManager");
    let llm = llm.map(|l| l as Arc<dyn LlmClient>);
    let planner = TaskPlanner::new(state, llm, config).expect("Failed to build planner");
    planner
        .get_or_create_user("alice", "alice@example.com")
        .await
        .expect("Failed to create user");
    (planner, temp_dir)
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

// =============================================================================
// Estimate, capacity and calibration
// =============================================================================

#[tokio::test]
async fn test_estimate_capacity_and_calibration_flow() {
    let llm = ScriptedLlm::new(vec![Ok(subtasks_response(&[
        ("Gather last quarter's numbers", "analytical"),
        ("Draft the summary", "creative"),
        ("Send to the team", "collaborative"),
    ]))]);
    let (planner, _temp) = planner_with(Some(llm.clone()), &test_config()).await;

    let detail = planner
        .create_task("alice", NewTask::new("Write quarterly report"))
        .await
        .unwrap();
    assert_eq!(llm.calls(), 1);
    assert_eq!(detail.subtasks.len(), 3);
    assert!(detail.subtasks.iter().all(|s| s.is_implicit));
    assert!(close(detail.task.optimistic_time.unwrap(), 90.0));
    assert!(close(detail.task.realistic_time.unwrap(), 135.0));
    assert!(close(detail.task.pessimistic_time.unwrap(), 189.0));
    assert_eq!(detail.task.estimated_time, detail.task.realistic_time);

    let prediction = detail.prediction.clone().expect("model estimate records a prediction");
    assert!(close(prediction.predicted_time, 135.0));
    assert_eq!(prediction.prediction_basis, PredictionBasis::Baseline);

    // 135 of 480 minutes
    let report = planner.capacity_report("alice").await.unwrap();
    assert_eq!(report.planned_minutes, 135);
    assert_eq!(report.utilization_percent, 28);
    assert_eq!(report.severity, Severity::None);

    // A manual 4h task pushes the day to 375 of 480 minutes
    let mut manual = NewTask::new("Review contracts");
    manual.estimated_minutes = Some(240.0);
    let manual = planner.create_task("alice", manual).await.unwrap();
    assert!(manual.prediction.is_none());
    assert_eq!(llm.calls(), 1);

    let report = planner.capacity_report("alice").await.unwrap();
    assert_eq!(report.planned_minutes, 375);
    assert_eq!(report.utilization_percent, 78);
    assert_eq!(report.severity, Severity::None);

    planner
        .update_preferences(
            "alice",
            PreferencesPatch {
                work_hours_per_day: Some(6.0),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let report = planner.capacity_report("alice").await.unwrap();
    assert_eq!(report.utilization_percent, 104);
    assert_eq!(report.severity, Severity::Warning);
    assert!(report.alert_message.unwrap().contains("only 6 hours available"));

    // Completing both tasks records one outcome each
    let (task, actual) = planner
        .complete_task(
            "alice",
            &detail.task.id,
            Completion {
                actual_minutes: 150.0,
                delay_reason: Some(DelayReason::Interruptions),
                notes: Some("phone kept ringing".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(actual.predicted_time, Some(prediction.predicted_time));
    assert_eq!(actual.delay_reason, Some(DelayReason::Interruptions));

    planner
        .complete_task(
            "alice",
            &manual.task.id,
            Completion {
                actual_minutes: 200.0,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let stats = planner.accuracy("alice").await.unwrap();
    assert_eq!(stats.samples, 1);
    assert_eq!(stats.unpredicted, 1);
    assert!(close(stats.mape.unwrap(), 0.1));
    assert!(close(stats.mean_bias_minutes.unwrap(), 15.0));

    let report = planner.capacity_report("alice").await.unwrap();
    assert_eq!(report.planned_minutes, 0);
    assert!(report.energy_budget.is_empty());
}

#[tokio::test]
async fn test_completing_twice_is_rejected() {
    let (planner, _temp) = planner_with(None, &test_config()).await;
    let mut new = NewTask::new("Water plants");
    new.estimated_minutes = Some(10.0);
    let detail = planner.create_task("alice", new).await.unwrap();

    let completion = Completion {
        actual_minutes: 12.0,
        ..Default::default()
    };
    planner
        .complete_task("alice", &detail.task.id, completion.clone())
        .await
        .unwrap();
    let err = planner
        .complete_task("alice", &detail.task.id, completion)
        .await
        .unwrap_err();
    assert!(matches!(err, PlannerError::InvalidInput(_)));

    let actuals = planner.state().list_actuals("alice").await.unwrap();
    assert_eq!(actuals.len(), 1);
}

// =============================================================================
// Decomposition failures
// =============================================================================

#[tokio::test]
async fn test_retry_then_success() {
    let llm = ScriptedLlm::new(vec![
        Err(LlmError::RateLimited {
            retry_after: std::time::Duration::from_millis(1),
        }),
        Ok(subtasks_response(&[("Book venue", "administrative"), ("Invite guests", "collaborative")])),
    ]);
    let (planner, _temp) = planner_with(Some(llm.clone()), &test_config()).await;

    let detail = planner.create_task("alice", NewTask::new("Plan offsite")).await.unwrap();
    assert_eq!(llm.calls(), 2);
    assert_eq!(detail.subtasks.len(), 2);
}

#[tokio::test]
async fn test_unusable_output_falls_back_to_single_step() {
    let llm = ScriptedLlm::new(vec![Ok(CompletionResponse::text("I'd be happy to help with that!"))]);
    let (planner, _temp) = planner_with(Some(llm.clone()), &test_config()).await;

    let detail = planner
        .create_task("alice", NewTask::new("Clean the garage"))
        .await
        .unwrap();
    assert_eq!(detail.subtasks.len(), 1);
    assert_eq!(detail.subtasks[0].description, "Clean the garage");
    assert!(detail.subtasks[0].is_implicit);
    assert!(close(detail.task.realistic_time.unwrap(), 45.0));
}

#[tokio::test]
async fn test_failure_without_fallback_creates_nothing() {
    let mut config = test_config();
    config.planner.fallback_on_failure = false;
    config.planner.max_retries = 0;
    let llm = ScriptedLlm::new(vec![Ok(CompletionResponse::text("not json"))]);
    let (planner, _temp) = planner_with(Some(llm), &config).await;

    let result = planner.create_task("alice", NewTask::new("Fix the fence")).await;
    assert!(matches!(result, Err(PlannerError::Estimation(_))));

    let list = planner.list_tasks("alice", None, 1, None).await.unwrap();
    assert_eq!(list.total, 0);
}

#[tokio::test]
async fn test_reestimate_appends_prediction() {
    let llm = ScriptedLlm::new(vec![
        Ok(subtasks_response(&[("Write", "creative"), ("Edit", "creative"), ("Publish", "administrative")])),
        Ok(subtasks_response(&[("Write", "creative")])),
    ]);
    let (planner, _temp) = planner_with(Some(llm.clone()), &test_config()).await;

    let detail = planner.create_task("alice", NewTask::new("Blog post")).await.unwrap();
    let again = planner.reestimate("alice", &detail.task.id).await.unwrap();
    // Estimated from the three stored subtasks; the model is not asked again
    assert!(close(again.task.realistic_time.unwrap(), 135.0));
    assert_eq!(llm.calls(), 1);

    let ids: Vec<&str> = again.subtasks.iter().map(|s| s.id.as_str()).collect();
    let original: Vec<&str> = detail.subtasks.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, original);
    let sum: f64 = again.subtasks.iter().filter_map(|s| s.estimated_time).sum();
    assert!(close(sum, 135.0));

    let predictions = planner.state().list_predictions(&detail.task.id).await.unwrap();
    assert_eq!(predictions.len(), 2);
    let current = planner.state().current_prediction(&detail.task.id).await.unwrap().unwrap();
    assert!(close(current.predicted_time, 135.0));
}

// =============================================================================
// Calibration tracker and digest
// =============================================================================

#[tokio::test]
async fn test_tracker_records_standalone_outcomes() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let state = StateManager::spawn(temp_dir.path()).unwrap();
    let tracker = StoreCalibrationTracker::new(state);

    for (predicted, actual) in [(Some(60.0), 90.0), (Some(100.0), 80.0), (None, 30.0)] {
        tracker
            .record(OutcomeRecord {
                task_id: calibrate::domain::generate_id("task", "standalone outcome"),
                user_id: "bob".to_string(),
                predicted,
                actual,
                delay_reason: None,
                notes: None,
                completed_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    let stats = tracker.accuracy_for("bob").await.unwrap();
    assert_eq!(stats.samples, 2);
    assert_eq!(stats.unpredicted, 1);
    // (30/90 + 20/80) / 2
    assert!(close(stats.mape.unwrap(), (1.0 / 3.0 + 0.25) / 2.0));
    assert!(close(stats.mean_bias_minutes.unwrap(), 5.0));

    let other = tracker.accuracy_for("carol").await.unwrap();
    assert_eq!(other.samples, 0);
    assert!(other.mape.is_none());
}

#[tokio::test]
async fn test_digest_after_a_day_of_work() {
    let (planner, _temp) = planner_with(None, &test_config()).await;

    let mut done = NewTask::new("Ship release notes");
    done.estimated_minutes = Some(30.0);
    let done = planner.create_task("alice", done).await.unwrap();
    planner
        .complete_task(
            "alice",
            &done.task.id,
            Completion {
                actual_minutes: 40.0,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let mut late = NewTask::new("File expenses");
    late.estimated_minutes = Some(20.0);
    late.deadline = Some(Utc::now() - Duration::hours(1));
    planner.create_task("alice", late).await.unwrap();

    // Run the digest as if it were tomorrow
    let user = planner.get_or_create_user("alice", "alice@example.com").await.unwrap();
    let digest = DigestBuilder::new(planner.state().clone())
        .build(&user, Utc::now() + Duration::days(1))
        .await
        .unwrap();

    assert_eq!(digest.completed.len(), 1);
    assert_eq!(digest.completed[0].title, "Ship release notes");
    assert_eq!(digest.completed_minutes, 40.0);
    assert_eq!(digest.overdue.len(), 1);
    assert_eq!(digest.overdue[0].title, "File expenses");
}
