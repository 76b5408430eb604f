//! DLQ sink — structured log writer for events whose handler invocation
//! exhausted retries. A record, not a queued retry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One failed (event, handler) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    pub event_type: String,
    pub handler_name: String,
    pub error: String,
    /// Serialized JSON form of the event; defensively truncated by the sink
    /// if it exceeds a size threshold.
    pub event_data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Sink for dead-letter records. The event bus calls this after a
/// subscriber exhausts `MaxRetries + 1` attempts.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn write(&self, record: DeadLetterRecord);
}
