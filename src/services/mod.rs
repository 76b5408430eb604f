//! Application services for the maintenance orchestration backbone.

pub mod agent_runtime;
pub mod anomaly_detection_agent;
pub mod event_bus;
pub mod orchestrator_agent;
pub mod prediction_agent;
pub mod system_coordinator;
pub mod validation_agent;

pub use agent_runtime::{Agent, AgentRuntime};
pub use anomaly_detection_agent::{
    AnomalyDetectionAgent, AnomalyDetectionConfig, RunningStatsDetector, StatisticalDetector,
};
pub use event_bus::{EventBus, EventBusConfig, EventHandler, HandlerResult};
pub use orchestrator_agent::{OrchestratorAgent, OrchestratorConfig};
pub use prediction_agent::{Forecaster, PredictionAgent, PredictionAgentConfig};
pub use system_coordinator::SystemCoordinator;
pub use validation_agent::{ValidationAgent, ValidationConfig};
