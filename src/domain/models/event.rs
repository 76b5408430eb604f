//! Event envelope and the typed event payloads that flow across the bus.
//!
//! Runtime polymorphism over event types is expressed as a tagged sum
//! (`DomainEvent`) rather than class-hierarchy dispatch: the event bus keys
//! subscriptions by `DomainEvent::type_name()`, and handlers match on the
//! concrete variant instead of performing an unsafe downcast.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::decision::{DecisionRequest, DecisionResponse};
use super::sensor::SensorReading;

/// Severity bucket for a detected anomaly. Monotone in confidence: higher
/// confidence never maps to a lower severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSeverity {
    VeryLow,
    Low,
    Medium,
    High,
    Critical,
}

impl EventSeverity {
    /// Bucket a confidence score in `[0, 1]` per the ensemble's mapping:
    /// `>0.8 -> critical, >0.6 -> high, >0.4 -> medium, >0.2 -> low, else very_low`.
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence > 0.8 {
            Self::Critical
        } else if confidence > 0.6 {
            Self::High
        } else if confidence > 0.4 {
            Self::Medium
        } else if confidence > 0.2 {
            Self::Low
        } else {
            Self::VeryLow
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VeryLow => "very_low",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// The canonical outcome of anomaly validation.
///
/// The source material spells the "validated and credible" state both
/// `CREDIBLE_ANOMALY` and `CONFIRMED` depending on call site; this crate
/// treats them as one logical state spelled [`ValidationStatus::CredibleAnomaly`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    CredibleAnomaly,
    FalsePositiveSuspected,
    FurtherInvestigationNeeded,
    Uncertain,
}

impl ValidationStatus {
    /// Normalizes external spellings (`"CONFIRMED"`, `"confirmed_credible"`)
    /// onto the canonical variant.
    pub fn normalize(raw: &str) -> Option<Self> {
        match raw.to_uppercase().as_str() {
            "CREDIBLE_ANOMALY" | "CONFIRMED" | "CONFIRMED_CREDIBLE" => {
                Some(Self::CredibleAnomaly)
            }
            "FALSE_POSITIVE_SUSPECTED" | "POTENTIAL_FALSE_POSITIVE" => {
                Some(Self::FalsePositiveSuspected)
            }
            "FURTHER_INVESTIGATION_NEEDED" => Some(Self::FurtherInvestigationNeeded),
            "UNCERTAIN" => Some(Self::Uncertain),
            _ => None,
        }
    }

    /// True when the prediction agent should act on this validation.
    pub fn is_credible(&self) -> bool {
        matches!(self, Self::CredibleAnomaly)
    }
}

/// Kind of maintenance recommended by the prediction agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceType {
    UrgentCorrective,
    Preventive,
    Inspection,
}

/// Urgency attached to a `ScheduleMaintenanceCommand`. The orchestrator only
/// ever emits `High` or `Medium` — never `Low` — per the decision table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrgencyLevel {
    High,
    Medium,
}

impl UrgencyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
        }
    }
}

/// Evidence attached to an `AnomalyDetected` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyDetails {
    pub is_anomaly: bool,
    pub confidence: f64,
    pub description: String,
}

/// The ten typed event payloads the pipeline exchanges, tagged by
/// `event_type` on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "payload")]
pub enum DomainEvent {
    SensorDataReceived {
        raw_data: HashMap<String, serde_json::Value>,
        sensor_id: String,
    },
    DataProcessed {
        processed_data: SensorReading,
        original_event_id: Uuid,
        source_sensor_id: String,
    },
    DataProcessingFailed {
        agent_id: String,
        error_message: String,
        traceback: Option<String>,
        original_event_type: String,
        original_event_payload: serde_json::Value,
    },
    AnomalyDetected {
        anomaly_details: AnomalyDetails,
        triggering_data: SensorReading,
        severity: EventSeverity,
    },
    AnomalyValidated {
        original_anomaly_alert_payload: serde_json::Value,
        triggering_reading_payload: serde_json::Value,
        validation_status: ValidationStatus,
        final_confidence: f64,
        validation_reasons: Vec<String>,
        validated_at: DateTime<Utc>,
        agent_id: String,
    },
    MaintenancePredicted {
        equipment_id: String,
        predicted_failure_date: DateTime<Utc>,
        confidence_interval_lower: f64,
        confidence_interval_upper: f64,
        prediction_confidence: f64,
        time_to_failure_days: f64,
        maintenance_type: MaintenanceType,
        recommended_actions: Vec<String>,
        agent_id: String,
    },
    HumanDecisionRequired {
        payload: DecisionRequest,
    },
    HumanDecisionResponse {
        payload: DecisionResponse,
    },
    ScheduleMaintenanceCommand {
        maintenance_data: serde_json::Value,
        urgency_level: UrgencyLevel,
        auto_approved: bool,
        human_approved: bool,
        source_prediction_event_id: Uuid,
    },
    MaintenanceScheduled {
        equipment_id: String,
        assigned_technician_id: String,
        scheduled_start_time: DateTime<Utc>,
        scheduled_end_time: DateTime<Utc>,
        schedule_details: serde_json::Value,
        constraints_violated: Vec<String>,
    },
    MaintenanceCompleted {
        task_id: Uuid,
        equipment_id: String,
        technician_id: String,
        completion_date: DateTime<Utc>,
        status: String,
        notes: Option<String>,
        actual_duration_hours: f64,
    },
}

impl DomainEvent {
    /// The discriminant string used as the bus subscription key. Stable
    /// across process restarts since it is derived from the variant name,
    /// not from a registration order.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::SensorDataReceived { .. } => "SensorDataReceived",
            Self::DataProcessed { .. } => "DataProcessed",
            Self::DataProcessingFailed { .. } => "DataProcessingFailed",
            Self::AnomalyDetected { .. } => "AnomalyDetected",
            Self::AnomalyValidated { .. } => "AnomalyValidated",
            Self::MaintenancePredicted { .. } => "MaintenancePredicted",
            Self::HumanDecisionRequired { .. } => "HumanDecisionRequired",
            Self::HumanDecisionResponse { .. } => "HumanDecisionResponse",
            Self::ScheduleMaintenanceCommand { .. } => "ScheduleMaintenanceCommand",
            Self::MaintenanceScheduled { .. } => "MaintenanceScheduled",
            Self::MaintenanceCompleted { .. } => "MaintenanceCompleted",
        }
    }
}

/// The base `Event` envelope: a unique id, a type tag, a timestamp, and an
/// optional correlation id propagated end-to-end across derived events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Option<Uuid>,
    pub event: DomainEvent,
}

impl EventEnvelope {
    pub fn new(event: DomainEvent) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            correlation_id: None,
            event,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Derive a new envelope for an event caused by this one, copying the
    /// correlation id across so a single logical flow can be traced
    /// end-to-end.
    pub fn derive(&self, event: DomainEvent) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            correlation_id: self.correlation_id,
            event,
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.event.type_name()
    }
}
