//! `NotificationProvider` — external collaborator for console/email/SMS
//! delivery. Failures here are per-notification, never agent-crashing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Channel a notification is sent over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    Console,
    Email,
    Sms,
}

/// A notification to deliver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub channel: NotificationChannel,
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Outcome of a delivery attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationResult {
    pub delivered: bool,
    pub provider_message: Option<String>,
}

/// Sends notifications and reports which channels it can serve.
#[async_trait]
pub trait NotificationProvider: Send + Sync {
    async fn send(&self, request: &NotificationRequest) -> NotificationResult;
    fn supports_channel(&self, channel: NotificationChannel) -> bool;
    async fn health_check(&self) -> bool;
}
