//! Agent lifecycle base: status transitions, capability registration,
//! health reporting, and the error-classification/logging contract every
//! agent shares.
//!
//! Grounded in the original source's `BaseAgent`: `start()` calls
//! `register_capabilities()` before any subscription happens, `stop()`
//! cancels outstanding background tasks and awaits their cancellation, and
//! processing failures are classified and logged rather than allowed to
//! crash the agent.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::domain::errors::MaintenanceError;
use crate::domain::models::{AgentCapability, AgentHealth, AgentStatus};
use crate::services::event_bus::EventBus;

/// Shared lifecycle state every concrete agent embeds by composition
/// (never by inheritance — Rust has no class hierarchy to dispatch through).
pub struct AgentRuntime {
    agent_id: String,
    status: RwLock<AgentStatus>,
    last_error: RwLock<Option<String>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    bus: RwLock<Option<Arc<EventBus>>>,
    subscriptions: Mutex<Vec<(String, String)>>,
}

impl AgentRuntime {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            status: RwLock::new(AgentStatus::Initializing),
            last_error: RwLock::new(None),
            tasks: Mutex::new(Vec::new()),
            bus: RwLock::new(None),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub async fn status(&self) -> AgentStatus {
        *self.status.read().await
    }

    pub async fn mark_running(&self) {
        *self.status.write().await = AgentStatus::Running;
        tracing::info!(agent_id = %self.agent_id, "agent running");
    }

    /// Records that `handler_name` was registered for `event_type` on
    /// `bus`, so `stop()` can unsubscribe it later. Call once per
    /// `bus.subscribe(...)` performed in `start()`.
    pub async fn track_subscription(
        &self,
        bus: &Arc<EventBus>,
        event_type: impl Into<String>,
        handler_name: impl Into<String>,
    ) {
        *self.bus.write().await = Some(Arc::clone(bus));
        self.subscriptions
            .lock()
            .await
            .push((event_type.into(), handler_name.into()));
    }

    /// Cancels and awaits every tracked background task, swallowing
    /// cancellation errors, unsubscribes every handler this agent
    /// registered so it stops accepting new events, then marks the agent
    /// stopped. Mirrors the original `BaseAgent.stop()`'s
    /// `asyncio.gather(..., return_exceptions=True)`.
    pub async fn stop(&self) {
        let mut tasks = self.tasks.lock().await;
        for task in tasks.iter() {
            task.abort();
        }
        for task in tasks.drain(..) {
            if let Err(err) = task.await {
                if !err.is_cancelled() {
                    tracing::warn!(agent_id = %self.agent_id, error = %err, "background task ended with error during stop");
                }
            }
        }

        if let Some(bus) = self.bus.read().await.clone() {
            let subscriptions = self.subscriptions.lock().await;
            for (event_type, handler_name) in subscriptions.iter() {
                bus.unsubscribe(event_type, handler_name).await;
            }
        }

        *self.status.write().await = AgentStatus::Stopped;
        tracing::info!(agent_id = %self.agent_id, "agent stopped");
    }

    pub async fn track_task(&self, handle: JoinHandle<()>) {
        self.tasks.lock().await.push(handle);
    }

    pub async fn health(&self) -> AgentHealth {
        let mut health = AgentHealth::new(self.agent_id.clone(), self.status().await);
        health.last_error = self.last_error.read().await.clone();
        health
    }

    /// Classify and log a processing failure with its correlation id,
    /// without propagating it — the runtime never lets a handler's error
    /// crash the agent.
    pub async fn record_error(&self, correlation_id: Option<Uuid>, err: &MaintenanceError) {
        tracing::warn!(
            agent_id = %self.agent_id,
            correlation_id = ?correlation_id,
            error = %err,
            "agent processing error"
        );
        *self.last_error.write().await = Some(err.to_string());
    }
}

/// The contract every agent exposes, per the distilled spec's §4.2.
#[async_trait]
pub trait Agent: Send + Sync {
    fn agent_id(&self) -> &str;

    /// Capabilities this agent advertises, consumed by registries/dashboards.
    fn register_capabilities(&self) -> Vec<AgentCapability>;

    /// Starts the agent: subscribes its handlers to `bus`. Implementations
    /// must call `register_capabilities()` (directly or via logging it)
    /// before subscribing, matching the original's ordering guarantee.
    async fn start(&self, bus: &Arc<EventBus>) -> Result<(), MaintenanceError>;

    async fn stop(&self);

    async fn health(&self) -> AgentHealth;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runtime_starts_initializing_then_running_then_stopped() {
        let runtime = AgentRuntime::new("test-agent");
        assert_eq!(runtime.status().await, AgentStatus::Initializing);
        runtime.mark_running().await;
        assert_eq!(runtime.status().await, AgentStatus::Running);
        runtime.stop().await;
        assert_eq!(runtime.status().await, AgentStatus::Stopped);
    }

    #[tokio::test]
    async fn stop_cancels_tracked_background_tasks() {
        let runtime = AgentRuntime::new("test-agent");
        let handle = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        });
        runtime.track_task(handle).await;
        runtime.stop().await;
        // stop() returned, meaning the task was aborted+awaited rather than
        // left running for 60s.
        assert_eq!(runtime.status().await, AgentStatus::Stopped);
    }

    #[tokio::test]
    async fn stop_unsubscribes_every_tracked_handler() {
        use crate::services::event_bus::{EventBusConfig, EventHandler, HandlerResult};
        use crate::domain::models::EventEnvelope;

        struct NoopHandler;

        #[async_trait]
        impl EventHandler for NoopHandler {
            fn name(&self) -> &str {
                "some-handler"
            }
            async fn handle(&self, _event: &EventEnvelope) -> HandlerResult {
                Ok(())
            }
        }

        let bus = Arc::new(EventBus::new(EventBusConfig::default(), None));
        let runtime = AgentRuntime::new("test-agent");
        bus.subscribe("SensorDataReceived", Arc::new(NoopHandler))
            .await;
        runtime
            .track_subscription(&bus, "SensorDataReceived", "some-handler")
            .await;
        assert_eq!(bus.subscriber_count("SensorDataReceived").await, 1);

        runtime.stop().await;
        assert_eq!(bus.subscriber_count("SensorDataReceived").await, 0);
    }

    #[tokio::test]
    async fn health_reports_last_error_without_crashing() {
        let runtime = AgentRuntime::new("test-agent");
        runtime
            .record_error(None, &MaintenanceError::DataValidation("bad payload".into()))
            .await;
        let health = runtime.health().await;
        assert_eq!(
            health.last_error.as_deref(),
            Some("data validation error: bad payload")
        );
    }
}
