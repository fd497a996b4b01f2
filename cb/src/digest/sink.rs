//! Notification delivery

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

/// A message ready for delivery
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub subject: String,
    pub recipient: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Delivery to {recipient} failed: {message}")]
    Delivery { recipient: String, message: String },
}

/// Where notifications go
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes notifications to the log instead of delivering them
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            recipient = %notification.recipient,
            subject = %notification.subject,
            body_len = notification.body.len(),
            "Notification"
        );
        Ok(())
    }
}
