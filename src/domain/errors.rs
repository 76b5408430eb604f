//! Error taxonomy for the maintenance orchestration backbone.

use thiserror::Error;

/// Errors that can occur anywhere in the maintenance pipeline.
///
/// Variants correspond to the error kinds an agent or the event bus can
/// raise; they are not tied to a single module because the runtime
/// classifies unclassified failures into [`MaintenanceError::AgentProcessing`]
/// rather than letting every call site invent its own error type.
#[derive(Debug, Error)]
pub enum MaintenanceError {
    /// Startup or wiring is invalid; fatal to the agent that raises it.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A payload could not be parsed or violated a domain invariant.
    #[error("data validation error: {0}")]
    DataValidation(String),

    /// The ML model loader or predictor failed.
    #[error("ml model error: {0}")]
    MlModel(String),

    /// Unclassified failure raised from an agent's processing step.
    #[error("agent processing error: {0}")]
    AgentProcessing(String),

    /// The orchestrator's state machine encountered an inconsistency, e.g.
    /// a human decision referencing a prediction that is no longer tracked.
    #[error("workflow error: {0}")]
    Workflow(String),

    /// The event bus exhausted retries publishing or dispatching an event.
    #[error("event publish error: {0}")]
    EventPublish(String),

    /// An external collaborator (notification provider, etc.) is unreachable.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

/// Convenience alias used throughout the crate.
pub type MaintenanceResult<T> = Result<T, MaintenanceError>;

impl From<serde_json::Error> for MaintenanceError {
    fn from(err: serde_json::Error) -> Self {
        Self::DataValidation(err.to_string())
    }
}

impl From<figment::Error> for MaintenanceError {
    fn from(err: figment::Error) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl MaintenanceError {
    /// Wrap an arbitrary error as an unclassified agent processing failure.
    ///
    /// This is the Rust equivalent of the original agents' "catch anything,
    /// log once, convert to a known error kind" behavior.
    pub fn from_any(err: impl std::fmt::Display) -> Self {
        Self::AgentProcessing(err.to_string())
    }
}
