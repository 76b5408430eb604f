//! `RuleEngine` — pluggable confidence-adjustment rules consumed by
//! `ValidationAgent`.

use async_trait::async_trait;

use crate::domain::errors::MaintenanceError;
use crate::domain::models::{AnomalyDetails, SensorReading};

/// Evaluates business rules against a raw anomaly alert, producing a
/// confidence delta and the human-readable reasons behind it.
#[async_trait]
pub trait RuleEngine: Send + Sync {
    /// `delta` is expected in `[-1, 1]`; `ValidationAgent` clamps the final
    /// confidence regardless.
    async fn evaluate_rules(
        &self,
        anomaly: &AnomalyDetails,
        reading: &SensorReading,
    ) -> Result<(f64, Vec<String>), MaintenanceError>;
}
