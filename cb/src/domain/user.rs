//! User record and capacity preferences

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use taskstore::{IndexValue, Record, now_ms};

use super::error::DomainError;

/// Per-user capacity settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityPreferences {
    pub work_hours_per_day: f64,

    pub buffer_percent: u32,

    /// Utilisation percentage at which the caution alert fires
    pub alert_caution_threshold: u32,

    /// Informational; the warning threshold used by the analyzer comes from config
    pub alert_warning_threshold: u32,

    /// IANA zone name used for day boundaries in the digest
    pub timezone: String,

    pub notifications_enabled: bool,
}

impl Default for CapacityPreferences {
    fn default() -> Self {
        Self {
            work_hours_per_day: 8.0,
            buffer_percent: 20,
            alert_caution_threshold: 80,
            alert_warning_threshold: 100,
            timezone: "UTC".to_string(),
            notifications_enabled: true,
        }
    }
}

impl CapacityPreferences {
    pub fn validate(&self) -> Result<(), DomainError> {
        if !self.work_hours_per_day.is_finite() || !(0.0..=24.0).contains(&self.work_hours_per_day) {
            return Err(DomainError::InvalidPreference(format!(
                "work-hours-per-day must be between 0 and 24, got {}",
                self.work_hours_per_day
            )));
        }
        if self.buffer_percent > 100 {
            return Err(DomainError::InvalidPreference(format!(
                "buffer-percent must be at most 100, got {}",
                self.buffer_percent
            )));
        }
        if !(1..=100).contains(&self.alert_caution_threshold) {
            return Err(DomainError::InvalidPreference(format!(
                "caution threshold must be between 1 and 100, got {}",
                self.alert_caution_threshold
            )));
        }
        self.tz()?;
        Ok(())
    }

    /// Parsed timezone
    pub fn tz(&self) -> Result<chrono_tz::Tz, DomainError> {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| DomainError::InvalidPreference(format!("unknown timezone: {}", self.timezone)))
    }
}

/// Partial preference update; None leaves a field unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreferencesPatch {
    pub work_hours_per_day: Option<f64>,
    pub buffer_percent: Option<u32>,
    pub alert_caution_threshold: Option<u32>,
    pub timezone: Option<String>,
    pub notifications_enabled: Option<bool>,
}

impl PreferencesPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply onto a copy and validate the result
    pub fn apply(&self, current: &CapacityPreferences) -> Result<CapacityPreferences, DomainError> {
        let mut next = current.clone();
        if let Some(hours) = self.work_hours_per_day {
            next.work_hours_per_day = hours;
        }
        if let Some(buffer) = self.buffer_percent {
            next.buffer_percent = buffer;
        }
        if let Some(caution) = self.alert_caution_threshold {
            next.alert_caution_threshold = caution;
        }
        if let Some(tz) = &self.timezone {
            next.timezone = tz.clone();
        }
        if let Some(enabled) = self.notifications_enabled {
            next.notifications_enabled = enabled;
        }
        next.validate()?;
        Ok(next)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,

    pub email: String,

    pub full_name: Option<String>,

    pub preferences: CapacityPreferences,

    pub is_active: bool,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,

    /// Last update timestamp (Unix milliseconds)
    pub updated_at: i64,
}

impl User {
    /// Create an active user with default preferences
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            id: id.into(),
            email: email.into(),
            full_name: None,
            preferences: CapacityPreferences::default(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Record for User {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn collection_name() -> &'static str {
        "users"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("email".to_string(), IndexValue::String(self.email.clone()));
        fields.insert("is_active".to_string(), IndexValue::Bool(self.is_active));
        fields.insert(
            "notifications_enabled".to_string(),
            IndexValue::Bool(self.preferences.notifications_enabled),
        );
        fields
    }
}
