//! Typed pub/sub event bus with per-handler retry, DLQ, and correlation-id
//! propagation.
//!
//! Subscriptions are keyed by [`DomainEvent::type_name`], not by a class
//! hierarchy: `Subscribe`/`Unsubscribe` register and remove
//! `(event_type, handler)` pairs, and `Publish` fans a single event out to
//! every handler registered for its type at call time. Handlers for
//! distinct subscribers run concurrently; attempts for the same
//! `(event, subscriber)` pair run sequentially, up to `MaxRetries + 1`
//! total attempts with a constant delay between attempts, per the
//! distilled spec's dispatch contract (§4.1).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::errors::MaintenanceError;
use crate::domain::models::EventEnvelope;
use crate::domain::ports::{DeadLetterRecord, DeadLetterSink};

/// Result a handler returns: `Ok(())` on success, `Err` to trigger a retry
/// (and eventually a DLQ write once retries are exhausted).
pub type HandlerResult = Result<(), MaintenanceError>;

/// A single subscriber. Handlers are identified by `name()` so that
/// `Subscribe` can be idempotent for the same `(event_type, handler)` pair.
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &str;
    async fn handle(&self, event: &EventEnvelope) -> HandlerResult;
}

/// Runtime configuration for dispatch behavior, loaded from
/// [`crate::infrastructure::config::AppConfig`].
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EventBusConfig {
    /// `EVENT_HANDLER_MAX_RETRIES`; total attempts is this plus one.
    pub max_retries: u32,
    /// `EVENT_HANDLER_RETRY_DELAY_SECONDS`, applied as a constant delay
    /// between attempts. The distilled spec permits exponential backoff;
    /// this crate documents its choice of constant delay here.
    #[serde(with = "retry_delay_seconds")]
    pub retry_delay: Duration,
    /// `DLQ_ENABLED`.
    pub dlq_enabled: bool,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_delay: Duration::from_millis(100),
            dlq_enabled: true,
        }
    }
}

/// Serializes `retry_delay` as fractional seconds so config files can write
/// `retry_delay: 0.1` instead of a `{secs, nanos}` map.
mod retry_delay_seconds {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        value.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs))
    }
}

/// Typed pub/sub bus. Cheap to clone (wraps `Arc`s internally); share one
/// instance across all agents.
pub struct EventBus {
    config: EventBusConfig,
    handlers: RwLock<HashMap<String, Vec<Arc<dyn EventHandler>>>>,
    dlq: Option<Arc<dyn DeadLetterSink>>,
    running: AtomicBool,
}

impl EventBus {
    pub fn new(config: EventBusConfig, dlq: Option<Arc<dyn DeadLetterSink>>) -> Self {
        Self {
            config,
            handlers: RwLock::new(HashMap::new()),
            dlq,
            running: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &EventBusConfig {
        &self.config
    }

    /// Marks the bus as accepting dispatches. Idempotent.
    pub fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
        tracing::info!("event bus started");
    }

    /// Stops accepting new `Publish` calls. `Publish` completes each
    /// dispatch synchronously, so by the time a caller observes `stop()`
    /// return, no dispatch from a prior `publish` call can still be
    /// in flight — there is nothing further to drain.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("event bus stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Register a handler for `event_type`. Idempotent: registering the
    /// same `(event_type, handler name)` pair twice is a no-op.
    pub async fn subscribe(&self, event_type: impl Into<String>, handler: Arc<dyn EventHandler>) {
        let event_type = event_type.into();
        let mut handlers = self.handlers.write().await;
        let bucket = handlers.entry(event_type.clone()).or_default();
        if bucket.iter().any(|h| h.name() == handler.name()) {
            tracing::debug!(event_type = %event_type, handler = handler.name(), "subscribe is a no-op, already registered");
            return;
        }
        tracing::info!(event_type = %event_type, handler = handler.name(), "handler subscribed");
        bucket.push(handler);
    }

    /// Remove a registration. A missing entry is a no-op.
    pub async fn unsubscribe(&self, event_type: &str, handler_name: &str) {
        let mut handlers = self.handlers.write().await;
        if let Some(bucket) = handlers.get_mut(event_type) {
            bucket.retain(|h| h.name() != handler_name);
        }
    }

    pub async fn subscriber_count(&self, event_type: &str) -> usize {
        self.handlers
            .read()
            .await
            .get(event_type)
            .map_or(0, Vec::len)
    }

    /// Dispatch `event` to every subscriber registered for its type at call
    /// time. Never returns an error: a subscriber's failure never affects
    /// other subscribers or the caller, per §4.1's failure semantics.
    pub async fn publish(&self, event: EventEnvelope) {
        let event_type = event.event_type();
        let subscribers = {
            let handlers = self.handlers.read().await;
            handlers.get(event_type).cloned().unwrap_or_default()
        };

        if subscribers.is_empty() {
            tracing::debug!(event_type, correlation_id = ?event.correlation_id, "no subscribers");
            return;
        }

        let event = Arc::new(event);
        let dispatches = subscribers.into_iter().map(|handler| {
            let event = Arc::clone(&event);
            let max_retries = self.config.max_retries;
            let retry_delay = self.config.retry_delay;
            async move { Self::dispatch_one(handler, event, max_retries, retry_delay).await }
        });

        let outcomes: Vec<_> = futures::future::join_all(dispatches).await;
        for outcome in outcomes {
            if let Err((handler_name, error)) = outcome {
                if self.config.dlq_enabled {
                    self.write_dead_letter(event_type, &handler_name, &error, &event)
                        .await;
                }
            }
        }
    }

    /// Run one subscriber's handler up to `max_retries + 1` times,
    /// sequentially, waiting `retry_delay` between attempts.
    async fn dispatch_one(
        handler: Arc<dyn EventHandler>,
        event: Arc<EventEnvelope>,
        max_retries: u32,
        retry_delay: Duration,
    ) -> Result<(), (String, String)> {
        let total_attempts = max_retries + 1;
        let mut last_error = String::new();
        for attempt in 1..=total_attempts {
            match handler.handle(&event).await {
                Ok(()) => {
                    tracing::debug!(
                        handler = handler.name(),
                        attempt,
                        correlation_id = ?event.correlation_id,
                        "handler succeeded"
                    );
                    return Ok(());
                }
                Err(err) => {
                    last_error = err.to_string();
                    if attempt < total_attempts {
                        tracing::warn!(
                            handler = handler.name(),
                            attempt,
                            error = %last_error,
                            "handler failed, retrying"
                        );
                        tokio::time::sleep(retry_delay).await;
                    }
                }
            }
        }
        tracing::error!(
            handler = handler.name(),
            attempts = total_attempts,
            error = %last_error,
            "handler exhausted retries"
        );
        Err((handler.name().to_string(), last_error))
    }

    async fn write_dead_letter(
        &self,
        event_type: &str,
        handler_name: &str,
        error: &str,
        event: &EventEnvelope,
    ) {
        let Some(dlq) = &self.dlq else { return };
        let event_data = serde_json::to_value(event).unwrap_or(serde_json::Value::Null);
        dlq.write(DeadLetterRecord {
            event_type: event_type.to_string(),
            handler_name: handler_name.to_string(),
            error: error.to_string(),
            event_data,
            timestamp: chrono::Utc::now(),
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::DomainEvent;
    use std::collections::HashMap as StdHashMap;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Mutex as TokioMutex;

    struct CountingHandler {
        name: String,
        calls: AtomicUsize,
        fail_always: bool,
    }

    #[async_trait]
    impl EventHandler for CountingHandler {
        fn name(&self) -> &str {
            &self.name
        }

        async fn handle(&self, _event: &EventEnvelope) -> HandlerResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_always {
                Err(MaintenanceError::AgentProcessing("always fails".into()))
            } else {
                Ok(())
            }
        }
    }

    struct RecordingDlq {
        records: TokioMutex<Vec<DeadLetterRecord>>,
    }

    #[async_trait]
    impl DeadLetterSink for RecordingDlq {
        async fn write(&self, record: DeadLetterRecord) {
            self.records.lock().await.push(record);
        }
    }

    fn sensor_event() -> EventEnvelope {
        EventEnvelope::new(DomainEvent::SensorDataReceived {
            raw_data: StdHashMap::new(),
            sensor_id: "sensor-1".into(),
        })
    }

    #[tokio::test]
    async fn successful_handler_runs_once() {
        let bus = EventBus::new(EventBusConfig::default(), None);
        let handler = Arc::new(CountingHandler {
            name: "ok-handler".into(),
            calls: AtomicUsize::new(0),
            fail_always: false,
        });
        bus.subscribe("SensorDataReceived", handler.clone()).await;
        bus.publish(sensor_event()).await;
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_handler_retries_then_writes_exactly_one_dlq_record() {
        let dlq = Arc::new(RecordingDlq {
            records: TokioMutex::new(Vec::new()),
        });
        let config = EventBusConfig {
            max_retries: 2,
            retry_delay: Duration::from_millis(1),
            dlq_enabled: true,
        };
        let bus = EventBus::new(config, Some(dlq.clone()));
        let handler = Arc::new(CountingHandler {
            name: "failing-handler".into(),
            calls: AtomicUsize::new(0),
            fail_always: true,
        });
        bus.subscribe("SensorDataReceived", handler.clone()).await;
        bus.publish(sensor_event()).await;

        assert_eq!(handler.calls.load(Ordering::SeqCst), 3); // max_retries + 1
        let records = dlq.records.lock().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event_type, "SensorDataReceived");
        assert!(records[0].handler_name.contains("failing"));
        assert!(!records[0].error.is_empty());
    }

    #[tokio::test]
    async fn one_failing_subscriber_does_not_affect_another() {
        let bus = EventBus::new(EventBusConfig::default(), None);
        let failing = Arc::new(CountingHandler {
            name: "failing".into(),
            calls: AtomicUsize::new(0),
            fail_always: true,
        });
        let ok = Arc::new(CountingHandler {
            name: "ok".into(),
            calls: AtomicUsize::new(0),
            fail_always: false,
        });
        bus.subscribe("SensorDataReceived", failing.clone()).await;
        bus.subscribe("SensorDataReceived", ok.clone()).await;
        bus.publish(sensor_event()).await;
        assert_eq!(ok.calls.load(Ordering::SeqCst), 1);
        assert!(failing.calls.load(Ordering::SeqCst) > 0);
    }

    #[tokio::test]
    async fn subscribe_is_idempotent_for_same_handler_name() {
        let bus = EventBus::new(EventBusConfig::default(), None);
        let handler = Arc::new(CountingHandler {
            name: "dup".into(),
            calls: AtomicUsize::new(0),
            fail_always: false,
        });
        bus.subscribe("SensorDataReceived", handler.clone()).await;
        bus.subscribe("SensorDataReceived", handler.clone()).await;
        assert_eq!(bus.subscriber_count("SensorDataReceived").await, 1);
    }

    #[tokio::test]
    async fn unsubscribe_missing_entry_is_a_no_op() {
        let bus = EventBus::new(EventBusConfig::default(), None);
        bus.unsubscribe("SensorDataReceived", "nobody").await;
        assert_eq!(bus.subscriber_count("SensorDataReceived").await, 0);
    }

    #[tokio::test]
    async fn correlation_id_is_preserved_on_the_published_event() {
        let bus = EventBus::new(EventBusConfig::default(), None);
        struct CaptureHandler {
            seen: TokioMutex<Option<uuid::Uuid>>,
        }
        #[async_trait]
        impl EventHandler for CaptureHandler {
            fn name(&self) -> &str {
                "capture"
            }
            async fn handle(&self, event: &EventEnvelope) -> HandlerResult {
                *self.seen.lock().await = event.correlation_id;
                Ok(())
            }
        }
        let handler = Arc::new(CaptureHandler {
            seen: TokioMutex::new(None),
        });
        bus.subscribe("SensorDataReceived", handler.clone()).await;
        let cid = uuid::Uuid::new_v4();
        bus.publish(sensor_event().with_correlation_id(cid)).await;
        assert_eq!(*handler.seen.lock().await, Some(cid));
    }
}
