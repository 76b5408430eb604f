//! Domain models
//!
//! Pure domain entities with business logic and validation rules.
//! These models are framework-agnostic and contain no infrastructure concerns.

pub mod agent;
pub mod decision;
pub mod event;
pub mod sensor;

pub use agent::{AgentCapability, AgentHealth, AgentId, AgentStatus};
pub use decision::{DecisionRequest, DecisionResponse, DecisionType};
pub use event::{
    AnomalyDetails, DomainEvent, EventEnvelope, EventSeverity, MaintenanceType, UrgencyLevel,
    ValidationStatus,
};
pub use sensor::{SensorReading, SensorType};
