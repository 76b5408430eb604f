//! Abathur Maintenance - predictive maintenance orchestration backbone
//!
//! Transforms raw sensor readings into scheduled maintenance actions through
//! a pipeline of cooperating agents communicating over an in-process event
//! bus:
//! - [`services::event_bus`]: typed pub/sub with per-handler retry and DLQ
//! - [`services::agent_runtime`]: lifecycle, capability registration, health
//! - [`services::orchestrator_agent`]: routing state machine with
//!   pending-approval locks and a decision log
//! - [`services::validation_agent`], [`services::anomaly_detection_agent`],
//!   [`services::prediction_agent`]: the rest of the detection pipeline
//! - [`services::system_coordinator`]: wires agents to the bus

pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::errors::{MaintenanceError, MaintenanceResult};
