//! Routing state machine: turns validated anomalies and predictions into
//! either auto-approved maintenance commands or human-in-the-loop decision
//! requests, with deduplication of in-flight approvals.
//!
//! The state map described in §3 of the distilled spec ("process-wide,
//! guarded by a mutex") is represented here as a concrete, typed
//! [`OrchestratorState`] behind a single `tokio::sync::Mutex`, not a
//! stringly-typed `Dict[str, Any]` — the natural Rust generalization the
//! distilled spec's design notes call for. The mutex guard is always
//! dropped before any `bus.publish(...).await`, so no handler ever holds
//! the state lock across a suspension point that awaits another handler on
//! the bus (§5).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::errors::MaintenanceError;
use crate::domain::models::{
    AgentCapability, AgentHealth, DecisionRequest, DecisionResponse, DomainEvent, EventEnvelope,
    MaintenanceType, UrgencyLevel, ValidationStatus,
};
use crate::services::agent_runtime::{Agent, AgentRuntime};
use crate::services::event_bus::{EventBus, EventHandler, HandlerResult};

/// Thresholds driving the decision table in §4.3. Every field corresponds
/// to a named option in the distilled spec's configuration surface (§6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// `ORCHESTRATOR_URGENT_MAINTENANCE_DAYS`.
    pub urgent_maintenance_days: f64,
    /// `ORCHESTRATOR_VERY_URGENT_MAINTENANCE_DAYS_FACTOR`; the very-urgent
    /// cutoff is `urgent_maintenance_days * very_urgent_maintenance_days_factor`.
    pub very_urgent_maintenance_days_factor: f64,
    /// `ORCHESTRATOR_HIGH_CONFIDENCE_THRESHOLD`.
    pub high_confidence_threshold: f64,
    /// `ORCHESTRATOR_MODERATE_CONFIDENCE_THRESHOLD`.
    pub moderate_confidence_threshold: f64,
    /// `ORCHESTRATOR_AUTO_APPROVAL_MAX_DAYS_MODERATE_CONFIDENCE`.
    pub auto_approval_max_days_moderate_confidence: f64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            urgent_maintenance_days: 30.0,
            very_urgent_maintenance_days_factor: 0.5,
            high_confidence_threshold: 0.9,
            moderate_confidence_threshold: 0.75,
            auto_approval_max_days_moderate_confidence: 45.0,
        }
    }
}

impl OrchestratorConfig {
    fn very_urgent_days(&self) -> f64 {
        self.urgent_maintenance_days * self.very_urgent_maintenance_days_factor
    }
}

/// Recorded outcome of a validated anomaly, kept under `anomaly_{event_id}`.
#[derive(Debug, Clone)]
pub struct AnomalySummary {
    pub validation_status: ValidationStatus,
    pub final_confidence: f64,
    pub validated_at: DateTime<Utc>,
    pub correlation_id: Option<Uuid>,
}

/// Recorded prediction, kept under `prediction_{event_id}` so a later
/// `HumanDecisionResponse` can recover the triggering prediction by its
/// `request_id`.
#[derive(Debug, Clone)]
pub struct PredictionSnapshot {
    pub equipment_id: String,
    pub correlation_id: Option<Uuid>,
    pub time_to_failure_days: f64,
    pub prediction_confidence: f64,
    pub maintenance_type: MaintenanceType,
    pub predicted_failure_date: DateTime<Utc>,
    pub recommended_actions: Vec<String>,
}

/// `pending_human_approval_{equipment_id}`: while present, no new
/// human-decision request is issued for that equipment.
#[derive(Debug, Clone)]
pub struct PendingApproval {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

/// One append-only entry in the orchestrator's decision log.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionLogEntry {
    pub decision_type: String,
    pub rationale: String,
    pub action: String,
    pub context: serde_json::Value,
    pub correlation_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

/// The orchestrator's process-wide state, guarded by a single mutex.
#[derive(Debug, Default)]
pub struct OrchestratorState {
    pub anomalies: HashMap<Uuid, AnomalySummary>,
    pub predictions: HashMap<Uuid, PredictionSnapshot>,
    pub pending_approvals: HashMap<String, PendingApproval>,
    pub human_decisions: HashMap<String, DecisionResponse>,
    pub decisions: Vec<DecisionLogEntry>,
}

impl OrchestratorState {
    fn log(
        &mut self,
        decision_type: &str,
        rationale: impl Into<String>,
        action: &str,
        context: serde_json::Value,
        correlation_id: Option<Uuid>,
    ) {
        self.decisions.push(DecisionLogEntry {
            decision_type: decision_type.to_string(),
            rationale: rationale.into(),
            action: action.to_string(),
            context,
            correlation_id,
            timestamp: Utc::now(),
        });
    }
}

/// Which leg of the decision table a `(TTF, confidence)` pair falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UrgencyBucket {
    VeryUrgent,
    Urgent,
    Routine,
}

impl UrgencyBucket {
    fn classify(ttf_days: f64, config: &OrchestratorConfig) -> Self {
        if ttf_days < config.very_urgent_days() {
            Self::VeryUrgent
        } else if ttf_days < config.urgent_maintenance_days {
            Self::Urgent
        } else {
            Self::Routine
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::VeryUrgent => "very urgent",
            Self::Urgent => "urgent",
            Self::Routine => "routine",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfidenceBucket {
    High,
    Moderate,
    Low,
}

impl ConfidenceBucket {
    fn classify(confidence: f64, config: &OrchestratorConfig) -> Self {
        if confidence >= config.high_confidence_threshold {
            Self::High
        } else if confidence >= config.moderate_confidence_threshold {
            Self::Moderate
        } else {
            Self::Low
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Moderate => "moderate",
            Self::Low => "low",
        }
    }
}

/// What the decision table (§4.3) resolves a `MaintenancePredicted` event to.
enum Routing {
    AutoApprove { urgency: UrgencyLevel },
    RequestHumanApproval { priority: &'static str },
}

fn route(
    urgency: UrgencyBucket,
    confidence: ConfidenceBucket,
    ttf_days: f64,
    config: &OrchestratorConfig,
) -> Routing {
    use ConfidenceBucket::{High, Low, Moderate};
    use UrgencyBucket::{Routine, Urgent, VeryUrgent};

    match (urgency, confidence) {
        (VeryUrgent, High) => Routing::AutoApprove {
            urgency: UrgencyLevel::High,
        },
        (VeryUrgent, Moderate | Low) => Routing::RequestHumanApproval { priority: "high" },
        (Urgent, High) => Routing::AutoApprove {
            urgency: UrgencyLevel::High,
        },
        (Urgent, Moderate | Low) => Routing::RequestHumanApproval { priority: "high" },
        (Routine, High) => Routing::AutoApprove {
            urgency: UrgencyLevel::Medium,
        },
        (Routine, Moderate) if ttf_days < config.auto_approval_max_days_moderate_confidence => {
            Routing::AutoApprove {
                urgency: UrgencyLevel::Medium,
            }
        }
        (Routine, Moderate) => Routing::RequestHumanApproval { priority: "medium" },
        (Routine, Low) => Routing::RequestHumanApproval { priority: "medium" },
    }
}

/// Routes `AnomalyValidated`, `MaintenancePredicted`, and
/// `HumanDecisionResponse` per §4.3's decision table.
pub struct OrchestratorAgent {
    runtime: Arc<AgentRuntime>,
    config: OrchestratorConfig,
    state: Arc<Mutex<OrchestratorState>>,
}

impl OrchestratorAgent {
    pub fn new(agent_id: impl Into<String>, config: OrchestratorConfig) -> Self {
        Self {
            runtime: Arc::new(AgentRuntime::new(agent_id)),
            config,
            state: Arc::new(Mutex::new(OrchestratorState::default())),
        }
    }

    /// Snapshot of the decision log, for readers (dashboards, tests).
    pub async fn decision_log(&self) -> Vec<DecisionLogEntry> {
        self.state.lock().await.decisions.clone()
    }

    pub async fn is_pending(&self, equipment_id: &str) -> bool {
        self.state
            .lock()
            .await
            .pending_approvals
            .contains_key(equipment_id)
    }
}

#[async_trait]
impl Agent for OrchestratorAgent {
    fn agent_id(&self) -> &str {
        self.runtime.agent_id()
    }

    fn register_capabilities(&self) -> Vec<AgentCapability> {
        vec![AgentCapability::new(
            "orchestrate-maintenance",
            "Routes validated anomalies and predictions to auto-approved or human-reviewed maintenance commands",
            ["AnomalyValidated", "MaintenancePredicted", "HumanDecisionResponse"],
            ["ScheduleMaintenanceCommand", "HumanDecisionRequired"],
        )]
    }

    async fn start(&self, bus: &Arc<EventBus>) -> Result<(), MaintenanceError> {
        self.register_capabilities();

        let anomaly_validated_handler = Arc::new(AnomalyValidatedHandler {
            state: Arc::clone(&self.state),
        });
        bus.subscribe(
            "AnomalyValidated",
            Arc::clone(&anomaly_validated_handler) as Arc<dyn EventHandler>,
        )
        .await;
        self.runtime
            .track_subscription(bus, "AnomalyValidated", anomaly_validated_handler.name())
            .await;

        let maintenance_predicted_handler = Arc::new(MaintenancePredictedHandler {
            state: Arc::clone(&self.state),
            config: self.config,
            bus: Arc::clone(bus),
        });
        bus.subscribe(
            "MaintenancePredicted",
            Arc::clone(&maintenance_predicted_handler) as Arc<dyn EventHandler>,
        )
        .await;
        self.runtime
            .track_subscription(bus, "MaintenancePredicted", maintenance_predicted_handler.name())
            .await;

        let human_decision_response_handler = Arc::new(HumanDecisionResponseHandler {
            state: Arc::clone(&self.state),
            bus: Arc::clone(bus),
            runtime: Arc::clone(&self.runtime),
        });
        bus.subscribe(
            "HumanDecisionResponse",
            Arc::clone(&human_decision_response_handler) as Arc<dyn EventHandler>,
        )
        .await;
        self.runtime
            .track_subscription(
                bus,
                "HumanDecisionResponse",
                human_decision_response_handler.name(),
            )
            .await;

        self.runtime.mark_running().await;
        Ok(())
    }

    async fn stop(&self) {
        self.runtime.stop().await;
    }

    async fn health(&self) -> AgentHealth {
        self.runtime.health().await
    }
}

struct AnomalyValidatedHandler {
    state: Arc<Mutex<OrchestratorState>>,
}

#[async_trait]
impl EventHandler for AnomalyValidatedHandler {
    fn name(&self) -> &str {
        "orchestrator-anomaly-validated"
    }

    async fn handle(&self, event: &EventEnvelope) -> HandlerResult {
        let DomainEvent::AnomalyValidated {
            validation_status,
            final_confidence,
            validated_at,
            ..
        } = &event.event
        else {
            return Ok(());
        };

        let mut state = self.state.lock().await;
        state.anomalies.insert(
            event.event_id,
            AnomalySummary {
                validation_status: *validation_status,
                final_confidence: *final_confidence,
                validated_at: *validated_at,
                correlation_id: event.correlation_id,
            },
        );

        if *final_confidence > 0.7 {
            tracing::info!(
                event_id = %event.event_id,
                correlation_id = ?event.correlation_id,
                confidence = final_confidence,
                "proceed to prediction"
            );
        } else {
            tracing::info!(
                event_id = %event.event_id,
                correlation_id = ?event.correlation_id,
                confidence = final_confidence,
                "monitoring only"
            );
        }
        Ok(())
    }
}

struct MaintenancePredictedHandler {
    state: Arc<Mutex<OrchestratorState>>,
    config: OrchestratorConfig,
    bus: Arc<EventBus>,
}

#[async_trait]
impl EventHandler for MaintenancePredictedHandler {
    fn name(&self) -> &str {
        "orchestrator-maintenance-predicted"
    }

    async fn handle(&self, event: &EventEnvelope) -> HandlerResult {
        let DomainEvent::MaintenancePredicted {
            equipment_id,
            predicted_failure_date,
            confidence_interval_lower,
            confidence_interval_upper,
            prediction_confidence,
            time_to_failure_days,
            maintenance_type,
            recommended_actions,
            ..
        } = &event.event
        else {
            return Ok(());
        };

        let to_publish = {
            let mut state = self.state.lock().await;

            if state.pending_approvals.contains_key(equipment_id) {
                state.log(
                    "duplicate_prediction_handling",
                    format!(
                        "duplicate prediction ignored due to pending human decision for equipment {equipment_id}"
                    ),
                    "ignored",
                    serde_json::json!({ "equipment_id": equipment_id }),
                    event.correlation_id,
                );
                return Ok(());
            }

            state.predictions.insert(
                event.event_id,
                PredictionSnapshot {
                    equipment_id: equipment_id.clone(),
                    correlation_id: event.correlation_id,
                    time_to_failure_days: *time_to_failure_days,
                    prediction_confidence: *prediction_confidence,
                    maintenance_type: *maintenance_type,
                    predicted_failure_date: *predicted_failure_date,
                    recommended_actions: recommended_actions.clone(),
                },
            );

            let urgency = UrgencyBucket::classify(*time_to_failure_days, &self.config);
            let confidence = ConfidenceBucket::classify(*prediction_confidence, &self.config);

            match route(urgency, confidence, *time_to_failure_days, &self.config) {
                Routing::AutoApprove { urgency: level } => {
                    state.log(
                        "auto_approval",
                        format!(
                            "auto-approving due to {} urgency and {} confidence",
                            urgency.as_str(),
                            confidence.as_str()
                        ),
                        "schedule_maintenance",
                        serde_json::json!({
                            "equipment_id": equipment_id,
                            "time_to_failure_days": time_to_failure_days,
                            "prediction_confidence": prediction_confidence,
                        }),
                        event.correlation_id,
                    );
                    Publish::Schedule {
                        urgency_level: level,
                        auto_approved: true,
                        human_approved: false,
                    }
                }
                Routing::RequestHumanApproval { priority } => {
                    let context = HashMap::from([
                        (
                            "equipment_id".to_string(),
                            serde_json::Value::String(equipment_id.clone()),
                        ),
                        (
                            "time_to_failure_days".to_string(),
                            serde_json::json!(time_to_failure_days),
                        ),
                        (
                            "prediction_confidence".to_string(),
                            serde_json::json!(prediction_confidence),
                        ),
                        (
                            "maintenance_type".to_string(),
                            serde_json::json!(maintenance_type),
                        ),
                        (
                            "predicted_failure_date".to_string(),
                            serde_json::json!(predicted_failure_date),
                        ),
                        (
                            "recommended_actions".to_string(),
                            serde_json::json!(recommended_actions),
                        ),
                        (
                            "confidence_interval".to_string(),
                            serde_json::json!([confidence_interval_lower, confidence_interval_upper]),
                        ),
                        (
                            "urgency_reason".to_string(),
                            serde_json::Value::String(format!(
                                "{} urgency, {} confidence",
                                urgency.as_str(),
                                confidence.as_str()
                            )),
                        ),
                    ]);
                    let request = DecisionRequest::maintenance_approval(
                        event.event_id,
                        priority,
                        context,
                    );
                    state.pending_approvals.insert(
                        equipment_id.clone(),
                        PendingApproval {
                            request_id: request.request_id.clone(),
                            timestamp: Utc::now(),
                        },
                    );
                    state.log(
                        "human_approval_request",
                        format!(
                            "requesting human approval due to {} urgency and {} confidence",
                            urgency.as_str(),
                            confidence.as_str()
                        ),
                        "request_human_decision",
                        serde_json::json!({ "equipment_id": equipment_id, "request_id": request.request_id }),
                        event.correlation_id,
                    );
                    Publish::HumanDecision(request)
                }
            }
        };

        match to_publish {
            Publish::Schedule {
                urgency_level,
                auto_approved,
                human_approved,
            } => {
                let maintenance_data = serde_json::json!({
                    "equipment_id": equipment_id,
                    "maintenance_type": maintenance_type,
                    "time_to_failure_days": time_to_failure_days,
                    "recommended_actions": recommended_actions,
                });
                self.bus
                    .publish(event.derive(DomainEvent::ScheduleMaintenanceCommand {
                        maintenance_data,
                        urgency_level,
                        auto_approved,
                        human_approved,
                        source_prediction_event_id: event.event_id,
                    }))
                    .await;
            }
            Publish::HumanDecision(request) => {
                self.bus
                    .publish(event.derive(DomainEvent::HumanDecisionRequired { payload: request }))
                    .await;
            }
        }
        Ok(())
    }
}

/// What the state-mutating half of `handle` decided to emit, computed while
/// holding the lock and published only after it is dropped.
enum Publish {
    Schedule {
        urgency_level: UrgencyLevel,
        auto_approved: bool,
        human_approved: bool,
    },
    HumanDecision(DecisionRequest),
}

struct HumanDecisionResponseHandler {
    state: Arc<Mutex<OrchestratorState>>,
    bus: Arc<EventBus>,
    runtime: Arc<AgentRuntime>,
}

#[async_trait]
impl EventHandler for HumanDecisionResponseHandler {
    fn name(&self) -> &str {
        "orchestrator-human-decision-response"
    }

    async fn handle(&self, event: &EventEnvelope) -> HandlerResult {
        if let Err(err) = self.resolve(event).await {
            self.runtime.record_error(event.correlation_id, &err).await;
            return Err(err);
        }
        Ok(())
    }
}

impl HumanDecisionResponseHandler {
    async fn resolve(&self, event: &EventEnvelope) -> HandlerResult {
        let DomainEvent::HumanDecisionResponse { payload } = &event.event else {
            return Ok(());
        };

        let outcome = {
            let mut state = self.state.lock().await;
            state
                .human_decisions
                .insert(payload.request_id.clone(), payload.clone());

            let Some(prediction_event_id) = payload
                .request_id
                .strip_prefix("maintenance_approval_")
                .and_then(|s| Uuid::parse_str(s).ok())
            else {
                return Err(MaintenanceError::Workflow(format!(
                    "decision response request_id {} does not encode a prediction event id",
                    payload.request_id
                )));
            };
            let Some(snapshot) = state.predictions.get(&prediction_event_id).cloned() else {
                return Err(MaintenanceError::Workflow(format!(
                    "no tracked prediction for request_id {}",
                    payload.request_id
                )));
            };

            state.pending_approvals.remove(&snapshot.equipment_id);

            if payload.is_approval() {
                state.log(
                    "human_approval_granted",
                    format!(
                        "human approved maintenance for equipment {}",
                        snapshot.equipment_id
                    ),
                    "schedule_maintenance",
                    serde_json::json!({ "equipment_id": snapshot.equipment_id, "decision": payload.decision }),
                    event.correlation_id,
                );
                Some((snapshot, prediction_event_id))
            } else {
                state.log(
                    "human_decision_recorded",
                    format!(
                        "human decision '{}' recorded for equipment {}, no maintenance scheduled",
                        payload.decision, snapshot.equipment_id
                    ),
                    "log_only",
                    serde_json::json!({ "equipment_id": snapshot.equipment_id, "decision": payload.decision }),
                    event.correlation_id,
                );
                None
            }
        };

        if let Some((snapshot, prediction_event_id)) = outcome {
            let maintenance_data = serde_json::json!({
                "equipment_id": snapshot.equipment_id,
                "maintenance_type": snapshot.maintenance_type,
                "time_to_failure_days": snapshot.time_to_failure_days,
                "recommended_actions": snapshot.recommended_actions,
            });
            self.bus
                .publish(event.derive(DomainEvent::ScheduleMaintenanceCommand {
                    maintenance_data,
                    urgency_level: UrgencyLevel::High,
                    auto_approved: false,
                    human_approved: true,
                    source_prediction_event_id: prediction_event_id,
                }))
                .await;
        }
        Ok(())
    }
}
