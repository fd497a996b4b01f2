//! Calibrate configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::TaskStatus;
use crate::llm::LlmError;

/// Main Calibrate configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Three-point estimate heuristics
    pub estimator: EstimatorConfig,

    /// Subtask decomposition limits
    pub decomposer: DecomposerConfig,

    /// Capacity alert thresholds and active set
    pub capacity: CapacityConfig,

    /// Retry and fallback policy for decomposition
    pub planner: PlannerConfig,

    /// Storage configuration
    pub storage: StorageConfig,

    /// Identity used by the CLI
    pub user: UserConfig,

    /// Log level (overridden by --log-level)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        if self.capacity.warning_threshold > self.capacity.critical_threshold {
            return Err(eyre::eyre!(
                "capacity.warning-threshold ({}) must not exceed capacity.critical-threshold ({})",
                self.capacity.warning_threshold,
                self.capacity.critical_threshold
            ));
        }
        if self.capacity.active_statuses.is_empty() {
            return Err(eyre::eyre!("capacity.active-statuses must name at least one status"));
        }
        if self.capacity.active_statuses.contains(&TaskStatus::Completed) {
            return Err(eyre::eyre!("capacity.active-statuses must not include completed"));
        }
        if self.decomposer.max_subtasks == 0 {
            return Err(eyre::eyre!("decomposer.max-subtasks must be at least 1"));
        }
        if self.user.id.trim().is_empty() {
            return Err(eyre::eyre!("user.id must not be empty"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .calibrate.yml
        let local_config = PathBuf::from(".calibrate.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/calibrate/calibrate.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("calibrate").join("calibrate.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name: "openai" (any OpenAI-compatible endpoint) or "anthropic"
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "llama-3.1-8b-instant".to_string(),
            api_key_env: "GROQ_API_KEY".to_string(),
            base_url: "https://api.groq.com/openai".to_string(),
            max_tokens: 1024,
            timeout_ms: 30_000,
        }
    }
}

impl LlmConfig {
    /// Read the API key from the configured environment variable
    pub fn get_api_key(&self) -> Result<String, LlmError> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(LlmError::MissingApiKey(self.api_key_env.clone())),
        }
    }
}

/// Which confidence model the estimator uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceModelKind {
    /// Constant `default-confidence`
    #[default]
    Fixed,
    /// Derived from the user's calibration history
    Historical,
}

/// Three-point estimate heuristics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Minutes per subtask for the optimistic estimate
    #[serde(rename = "base-minutes")]
    pub base_minutes: f64,

    /// realistic = optimistic × buffer multiplier
    #[serde(rename = "buffer-multiplier")]
    pub buffer_multiplier: f64,

    /// pessimistic = realistic × overrun multiplier
    #[serde(rename = "overrun-multiplier")]
    pub overrun_multiplier: f64,

    #[serde(rename = "default-confidence")]
    pub default_confidence: f64,

    #[serde(rename = "confidence-model")]
    pub confidence_model: ConfidenceModelKind,

    /// Calibration pairs needed before historical confidence applies
    #[serde(rename = "min-calibration-samples")]
    pub min_calibration_samples: usize,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            base_minutes: 30.0,
            buffer_multiplier: 1.5,
            overrun_multiplier: 1.4,
            default_confidence: 0.78,
            confidence_model: ConfidenceModelKind::Fixed,
            min_calibration_samples: 5,
        }
    }
}

/// Subtask decomposition limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecomposerConfig {
    /// Upper bound on accepted subtasks
    #[serde(rename = "max-subtasks")]
    pub max_subtasks: usize,

    /// Bound on a single decomposition call
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Directory holding prompt overrides (e.g. decompose.hbs)
    #[serde(rename = "prompt-dir")]
    pub prompt_dir: Option<PathBuf>,
}

impl Default for DecomposerConfig {
    fn default() -> Self {
        Self {
            max_subtasks: 10,
            timeout_ms: 30_000,
            max_tokens: 1024,
            prompt_dir: None,
        }
    }
}

/// Capacity alert thresholds and active set
///
/// The caution threshold is a per-user preference; warning and critical are
/// application-wide.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityConfig {
    /// Utilisation above this is a warning
    #[serde(rename = "warning-threshold")]
    pub warning_threshold: u32,

    /// Utilisation above this is critical
    #[serde(rename = "critical-threshold")]
    pub critical_threshold: u32,

    /// Task statuses counted as load
    #[serde(rename = "active-statuses")]
    pub active_statuses: Vec<TaskStatus>,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            warning_threshold: 100,
            critical_threshold: 120,
            active_statuses: vec![TaskStatus::Planned],
        }
    }
}

/// Retry and fallback policy for decomposition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Retries after the first attempt
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Backoff before the first retry; doubles each time
    #[serde(rename = "initial-backoff-ms")]
    pub initial_backoff_ms: u64,

    /// Degrade to a single implicit subtask instead of failing
    #[serde(rename = "fallback-on-failure")]
    pub fallback_on_failure: bool,

    /// Page size for task listings
    #[serde(rename = "page-size")]
    pub page_size: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 500,
            fallback_on_failure: true,
            page_size: 20,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for TaskStore data
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        // Use XDG data directory (~/.local/share/calibrate on Linux)
        let path = dirs::data_dir()
            .map(|d| d.join("calibrate"))
            .unwrap_or_else(|| PathBuf::from(".calibrate"));

        Self { path }
    }
}

/// Identity used by the CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    pub id: String,

    pub email: String,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            id: "local".to_string(),
            email: "local@localhost".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.estimator.base_minutes, 30.0);
        assert_eq!(config.decomposer.max_subtasks, 10);
        assert_eq!(config.capacity.critical_threshold, 120);
        assert_eq!(config.capacity.active_statuses, vec![TaskStatus::Planned]);
        assert_eq!(config.planner.max_retries, 2);
        assert!(config.planner.fallback_on_failure);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_llm_config_defaults() {
        let config = LlmConfig::default();

        assert_eq!(config.model, "llama-3.1-8b-instant");
        assert_eq!(config.api_key_env, "GROQ_API_KEY");
        assert_eq!(config.base_url, "https://api.groq.com/openai");
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
llm:
  provider: anthropic
  model: claude-haiku
  api-key-env: MY_API_KEY
  base-url: https://api.example.com
  max-tokens: 2048
  timeout-ms: 60000

estimator:
  base-minutes: 25
  buffer-multiplier: 1.6
  confidence-model: historical

capacity:
  warning-threshold: 90
  critical-threshold: 110
  active-statuses: [planned, in_progress]

planner:
  max-retries: 0
  fallback-on-failure: false

storage:
  path: /tmp/calibrate-test

log-level: debug
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.llm.provider, "anthropic");
        assert_eq!(config.llm.api_key_env, "MY_API_KEY");
        assert_eq!(config.llm.max_tokens, 2048);
        assert_eq!(config.estimator.base_minutes, 25.0);
        assert_eq!(config.estimator.buffer_multiplier, 1.6);
        assert_eq!(config.estimator.overrun_multiplier, 1.4);
        assert_eq!(config.estimator.confidence_model, ConfidenceModelKind::Historical);
        assert_eq!(config.capacity.warning_threshold, 90);
        assert_eq!(
            config.capacity.active_statuses,
            vec![TaskStatus::Planned, TaskStatus::InProgress]
        );
        assert_eq!(config.planner.max_retries, 0);
        assert!(!config.planner.fallback_on_failure);
        assert_eq!(config.storage.path, PathBuf::from("/tmp/calibrate-test"));
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
llm:
  model: llama-3.3-70b-versatile
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.llm.model, "llama-3.3-70b-versatile");
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.user.id, "local");
        assert_eq!(config.decomposer.timeout_ms, 30_000);
    }

    #[test]
    fn test_validate_rejects_inverted_thresholds() {
        let mut config = Config::default();
        config.capacity.warning_threshold = 130;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_completed_in_active_set() {
        let mut config = Config::default();
        config.capacity.active_statuses.push(TaskStatus::Completed);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calibrate.yml");
        fs::write(&path, "user:\n  id: alice\n  email: alice@example.com\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.user.id, "alice");
    }

    #[test]
    fn test_load_explicit_path_missing_fails() {
        let path = PathBuf::from("/nonexistent/calibrate.yml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_missing_api_key() {
        let config = LlmConfig {
            api_key_env: "CALIBRATE_TEST_KEY_THAT_IS_NOT_SET".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.get_api_key(), Err(LlmError::MissingApiKey(_))));
    }
}
