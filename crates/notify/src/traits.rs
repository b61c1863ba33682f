//! Notifier trait definition and shared error types.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

/// Errors that can occur during notification delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("SMTP delivery failed: {0}")]
    Smtp(String),

    #[error("Template rendering failed: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
}

/// A rendered notification ready for delivery.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Notification {
    /// The rendered subject/title.
    pub subject: String,
    /// The rendered body content.
    pub body: String,
    /// Additional metadata (e.g., severity, batch_id).
    pub metadata: HashMap<String, String>,
}

/// One row of `alert_events`: an operational alert raised by a pipeline
/// stage or monitor (spec.md §4.9's diagnostics threshold alerts, the
/// scheduler's emergency trigger, etc.), awaiting dispatch.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AlertEvent {
    pub id: uuid::Uuid,
    pub alert_type: String,
    pub severity: String,
    pub batch_id: Option<String>,
    pub value: Option<f64>,
    pub message: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Trait for notification channel implementations.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification through this channel.
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;

    /// Test connectivity with a sample notification.
    async fn test(&self) -> Result<(), NotifyError> {
        let test_notification = Notification {
            subject: "[TEST] feedline alert dispatch".to_string(),
            body: "This is a test notification from feedline's alert dispatcher.".to_string(),
            metadata: HashMap::from([
                ("alert_type".to_string(), "test".to_string()),
                ("severity".to_string(), "info".to_string()),
            ]),
        };
        self.send(&test_notification).await
    }

    /// Human-readable name for this channel (e.g., "webhook", "email").
    fn channel_name(&self) -> &str;
}

/// Result of dispatching a notification to a single channel.
#[derive(Debug)]
pub struct DispatchResult {
    pub channel: String,
    pub entity_key: String,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}
