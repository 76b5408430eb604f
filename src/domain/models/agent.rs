//! Agent identity, capability descriptors, status, and health.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque agent identifier, e.g. `"orchestrator"` or `"validation-agent-1"`.
pub type AgentId = String;

/// Lifecycle status of a running agent.
///
/// Transitions: `Initializing -> Running -> Stopped`. An agent never goes
/// back to `Initializing`; restarting means constructing a new instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Initializing,
    Running,
    Stopped,
}

impl Default for AgentStatus {
    fn default() -> Self {
        Self::Initializing
    }
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }
}

/// Pure descriptor of what an agent does, consumed by registries/dashboards.
/// Carries no behavior of its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCapability {
    pub name: String,
    pub description: String,
    pub input_types: Vec<String>,
    pub output_types: Vec<String>,
}

impl AgentCapability {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_types: impl IntoIterator<Item = impl Into<String>>,
        output_types: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_types: input_types.into_iter().map(Into::into).collect(),
            output_types: output_types.into_iter().map(Into::into).collect(),
        }
    }
}

/// Snapshot returned by an agent's `Health()` operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHealth {
    pub agent_id: AgentId,
    pub status: AgentStatus,
    pub timestamp: DateTime<Utc>,
    /// Message from the most recent processing failure, if any. Retained
    /// (not just logged) so health checks can surface it.
    pub last_error: Option<String>,
}

impl AgentHealth {
    pub fn new(agent_id: impl Into<String>, status: AgentStatus) -> Self {
        Self {
            agent_id: agent_id.into(),
            status,
            timestamp: Utc::now(),
            last_error: None,
        }
    }
}
