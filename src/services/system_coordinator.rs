//! Wires agents to the event bus for the process lifetime and exposes a
//! read-only view of recently scheduled maintenance commands, the one piece
//! of shared state a dashboard or demo frontend needs without reaching
//! into the orchestrator's internals directly.
//!
//! Holds `Arc` handles to the bus and every agent (§3's "Ownership": the
//! coordinator holds shared handles to bus and agents for the process
//! lifetime, it does not own their state). `stop()` stops agents before
//! stopping the bus, so in-flight handler tasks can still publish during
//! their own drain window, then stops the bus last (§5).

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::errors::MaintenanceError;
use crate::domain::models::{DomainEvent, EventEnvelope, UrgencyLevel};
use crate::services::agent_runtime::Agent;
use crate::services::event_bus::{EventBus, EventHandler, HandlerResult};

/// How many recent schedules the coordinator keeps for readers. Oldest
/// entries fall off once this bound is reached.
const RECENT_SCHEDULES_CAPACITY: usize = 100;

/// A read-only projection of a `ScheduleMaintenanceCommand`, kept for
/// dashboard/demo consumers. Not part of orchestrator state: the
/// orchestrator never reads this back.
#[derive(Debug, Clone)]
pub struct ScheduledMaintenanceSnapshot {
    pub event_id: Uuid,
    pub correlation_id: Option<Uuid>,
    pub equipment_id: Option<String>,
    pub urgency_level: UrgencyLevel,
    pub auto_approved: bool,
    pub human_approved: bool,
    pub source_prediction_event_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
}

struct ScheduleRecorder {
    recent: Arc<Mutex<VecDeque<ScheduledMaintenanceSnapshot>>>,
}

#[async_trait::async_trait]
impl EventHandler for ScheduleRecorder {
    fn name(&self) -> &str {
        "system-coordinator-schedule-recorder"
    }

    async fn handle(&self, event: &EventEnvelope) -> HandlerResult {
        let DomainEvent::ScheduleMaintenanceCommand {
            maintenance_data,
            urgency_level,
            auto_approved,
            human_approved,
            source_prediction_event_id,
        } = &event.event
        else {
            return Ok(());
        };

        let equipment_id = maintenance_data
            .get("equipment_id")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let mut recent = self.recent.lock().await;
        if recent.len() >= RECENT_SCHEDULES_CAPACITY {
            recent.pop_front();
        }
        recent.push_back(ScheduledMaintenanceSnapshot {
            event_id: event.event_id,
            correlation_id: event.correlation_id,
            equipment_id,
            urgency_level: *urgency_level,
            auto_approved: *auto_approved,
            human_approved: *human_approved,
            source_prediction_event_id: *source_prediction_event_id,
            scheduled_at: event.timestamp,
        });
        Ok(())
    }
}

/// Wires every agent to a shared [`EventBus`] and keeps a bounded,
/// queryable history of scheduled maintenance commands.
pub struct SystemCoordinator {
    bus: Arc<EventBus>,
    agents: Vec<Arc<dyn Agent>>,
    recent_schedules: Arc<Mutex<VecDeque<ScheduledMaintenanceSnapshot>>>,
}

impl SystemCoordinator {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            agents: Vec::new(),
            recent_schedules: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Register an agent to be started/stopped alongside the bus. Must be
    /// called before [`SystemCoordinator::start`].
    pub fn register_agent(&mut self, agent: Arc<dyn Agent>) {
        self.agents.push(agent);
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Starts the bus, subscribes the internal schedule recorder, then
    /// starts every registered agent in registration order.
    pub async fn start(&self) -> Result<(), MaintenanceError> {
        self.bus.start();
        self.bus
            .subscribe(
                "ScheduleMaintenanceCommand",
                Arc::new(ScheduleRecorder {
                    recent: Arc::clone(&self.recent_schedules),
                }),
            )
            .await;
        for agent in &self.agents {
            agent.start(&self.bus).await?;
        }
        Ok(())
    }

    /// Stops agents first (so their in-flight handler tasks can still
    /// publish during their own drain window), then stops the bus last.
    pub async fn stop(&self) {
        for agent in &self.agents {
            agent.stop().await;
        }
        self.bus.stop();
    }

    /// Snapshot of the most recently scheduled maintenance commands, newest
    /// last, for dashboard/demo readers.
    pub async fn recent_schedules(&self) -> Vec<ScheduledMaintenanceSnapshot> {
        self.recent_schedules.lock().await.iter().cloned().collect()
    }
}
