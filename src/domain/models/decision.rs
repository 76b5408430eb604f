//! Human-in-the-loop decision request/response shapes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The only decision type the orchestrator currently issues. Modeled as an
/// enum (rather than a free string) so new decision types are a compile-time
/// decision, not a typo away from silently falling through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    MaintenanceApproval,
}

/// A human-decision request emitted as `HumanDecisionRequired`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRequest {
    pub request_id: String,
    pub decision_type: DecisionType,
    pub priority: String,
    pub options: Vec<String>,
    pub context: HashMap<String, serde_json::Value>,
}

impl DecisionRequest {
    /// `request_id` is always derived as `maintenance_approval_{prediction_event_id}`
    /// so the orchestrator can recover the originating prediction from the
    /// response without a separate lookup table.
    pub fn maintenance_approval(
        prediction_event_id: uuid::Uuid,
        priority: impl Into<String>,
        context: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            request_id: format!("maintenance_approval_{prediction_event_id}"),
            decision_type: DecisionType::MaintenanceApproval,
            priority: priority.into(),
            options: vec![
                "approve".to_string(),
                "modify".to_string(),
                "reject".to_string(),
                "defer".to_string(),
            ],
            context,
        }
    }

    /// Recover the prediction event id this request was issued for.
    pub fn prediction_event_id(&self) -> Option<uuid::Uuid> {
        self.request_id
            .strip_prefix("maintenance_approval_")
            .and_then(|s| uuid::Uuid::parse_str(s).ok())
    }
}

/// A human's response to a [`DecisionRequest`], emitted as
/// `HumanDecisionResponse`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionResponse {
    pub request_id: String,
    pub decision: String,
    #[serde(default)]
    pub notes: Option<String>,
}

impl DecisionResponse {
    /// Normalizes the free-form `decision` field: the original source
    /// accepts both `"approve"` and `"approved"`.
    pub fn is_approval(&self) -> bool {
        matches!(self.decision.to_lowercase().as_str(), "approve" | "approved")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_round_trips_event_id() {
        let id = uuid::Uuid::new_v4();
        let req = DecisionRequest::maintenance_approval(id, "high", HashMap::new());
        assert_eq!(req.prediction_event_id(), Some(id));
    }

    #[test]
    fn approval_is_case_and_tense_insensitive() {
        let resp = DecisionResponse {
            request_id: "x".into(),
            decision: "Approved".into(),
            notes: None,
        };
        assert!(resp.is_approval());
    }

    #[test]
    fn reject_is_not_approval() {
        let resp = DecisionResponse {
            request_id: "x".into(),
            decision: "reject".into(),
            notes: None,
        };
        assert!(!resp.is_approval());
    }
}
