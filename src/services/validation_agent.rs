//! Adjusts an anomaly's confidence using pluggable rules plus historical
//! context, and classifies the result into a [`ValidationStatus`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::domain::errors::MaintenanceError;
use crate::domain::models::{
    AgentCapability, AgentHealth, AnomalyDetails, DomainEvent, EventEnvelope, SensorReading,
    ValidationStatus,
};
use crate::domain::ports::{RuleEngine, SensorReadingRepository};
use crate::services::agent_runtime::{Agent, AgentRuntime};
use crate::services::event_bus::{EventBus, EventHandler, HandlerResult};

/// Tunables named in the distilled spec's configuration surface (§6):
/// `credible_threshold`, `false_positive_threshold`, `historical_check_limit`,
/// `recent_stability_window`.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub credible_threshold: f64,
    pub false_positive_threshold: f64,
    pub historical_check_limit: usize,
    pub recent_stability_window: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            credible_threshold: 0.7,
            false_positive_threshold: 0.4,
            historical_check_limit: 20,
            recent_stability_window: 5,
        }
    }
}

/// Takes `AnomalyDetected`, produces `AnomalyValidated`.
pub struct ValidationAgent {
    runtime: Arc<AgentRuntime>,
    config: ValidationConfig,
    rule_engine: Arc<dyn RuleEngine>,
    history: Arc<dyn SensorReadingRepository>,
}

impl ValidationAgent {
    pub fn new(
        agent_id: impl Into<String>,
        config: ValidationConfig,
        rule_engine: Arc<dyn RuleEngine>,
        history: Arc<dyn SensorReadingRepository>,
    ) -> Self {
        Self {
            runtime: Arc::new(AgentRuntime::new(agent_id)),
            config,
            rule_engine,
            history,
        }
    }
}

#[async_trait]
impl Agent for ValidationAgent {
    fn agent_id(&self) -> &str {
        self.runtime.agent_id()
    }

    fn register_capabilities(&self) -> Vec<AgentCapability> {
        vec![AgentCapability::new(
            "validate-anomaly",
            "Adjusts anomaly confidence using rules and historical context",
            ["AnomalyDetected"],
            ["AnomalyValidated"],
        )]
    }

    async fn start(&self, bus: &Arc<EventBus>) -> Result<(), MaintenanceError> {
        self.register_capabilities();
        let handler = Arc::new(AnomalyDetectedHandler {
            agent_id: self.runtime.agent_id().to_string(),
            config: self.config,
            rule_engine: Arc::clone(&self.rule_engine),
            history: Arc::clone(&self.history),
            bus: Arc::clone(bus),
            runtime: Arc::clone(&self.runtime),
        });
        bus.subscribe("AnomalyDetected", Arc::clone(&handler) as Arc<dyn EventHandler>)
            .await;
        self.runtime
            .track_subscription(bus, "AnomalyDetected", handler.name())
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

struct AnomalyDetectedHandler {
    agent_id: String,
    config: ValidationConfig,
    rule_engine: Arc<dyn RuleEngine>,
    history: Arc<dyn SensorReadingRepository>,
    bus: Arc<EventBus>,
    runtime: Arc<crate::services::agent_runtime::AgentRuntime>,
}

impl AnomalyDetectedHandler {
    /// Recent-stability and recurring-anomaly adjustments from §4.4,
    /// applied against up to `historical_check_limit` readings strictly
    /// before the triggering timestamp. Fetch failures degrade gracefully:
    /// a reason is recorded and zero adjustment is applied.
    async fn historical_adjustment(&self, reading: &SensorReading) -> (f64, Vec<String>) {
        let history = match self
            .history
            .get_by_sensor_id(
                &reading.sensor_id,
                self.config.historical_check_limit,
                Some(reading.timestamp),
            )
            .await
        {
            Ok(history) => history,
            Err(err) => {
                return (
                    0.0,
                    vec![format!("Could not retrieve historical data: {err}")],
                );
            }
        };

        let mut delta = 0.0;
        let mut reasons = Vec::new();

        let window = self.config.recent_stability_window.min(history.len());
        if window > 0 {
            let recent_mean: f64 =
                history[..window].iter().map(|r| r.value).sum::<f64>() / window as f64;
            let reference = reading.value.abs().max(f64::EPSILON);
            if ((recent_mean - reading.value).abs() / reference) <= 0.05 {
                delta -= 0.1;
                reasons.push("Recent value stability".to_string());
            }
        }

        if history.len() >= 2 {
            let pairs = history.len() - 1;
            let divergent = history
                .windows(2)
                .filter(|w| {
                    let reference = w[0].value.abs().max(f64::EPSILON);
                    ((w[0].value - w[1].value).abs() / reference) >= 0.5
                })
                .count();
            if (divergent as f64 / pairs as f64) > 0.25 {
                delta -= 0.05;
                reasons.push("Recurring anomaly pattern".to_string());
            }
        }

        (delta, reasons)
    }
}

#[async_trait]
impl EventHandler for AnomalyDetectedHandler {
    fn name(&self) -> &str {
        "validation-anomaly-detected"
    }

    async fn handle(&self, event: &EventEnvelope) -> HandlerResult {
        let DomainEvent::AnomalyDetected {
            anomaly_details,
            triggering_data,
            ..
        } = &event.event
        else {
            return Ok(());
        };

        if let Err(err) = self.validate(event, anomaly_details, triggering_data).await {
            self.runtime.record_error(event.correlation_id, &err).await;
            return Err(err);
        }
        Ok(())
    }
}

impl AnomalyDetectedHandler {
    async fn validate(
        &self,
        event: &EventEnvelope,
        anomaly_details: &AnomalyDetails,
        triggering_data: &SensorReading,
    ) -> HandlerResult {
        triggering_data.validate()?;

        let initial_confidence = anomaly_details.confidence;
        let (delta_rules, mut reasons) = self
            .rule_engine
            .evaluate_rules(anomaly_details, triggering_data)
            .await?;

        let (delta_history, history_reasons) = self.historical_adjustment(triggering_data).await;
        reasons.extend(history_reasons);

        let final_confidence = (initial_confidence + delta_rules + delta_history).clamp(0.0, 1.0);

        let validation_status = if final_confidence >= self.config.credible_threshold {
            ValidationStatus::CredibleAnomaly
        } else if final_confidence <= self.config.false_positive_threshold {
            ValidationStatus::FalsePositiveSuspected
        } else {
            ValidationStatus::Uncertain
        };

        let original_anomaly_alert_payload = serde_json::to_value(anomaly_details)?;
        let triggering_reading_payload = serde_json::to_value(triggering_data)?;

        self.bus
            .publish(event.derive(DomainEvent::AnomalyValidated {
                original_anomaly_alert_payload,
                triggering_reading_payload,
                validation_status,
                final_confidence,
                validation_reasons: reasons,
                validated_at: Utc::now(),
                agent_id: self.agent_id.clone(),
            }))
            .await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::event_bus::EventBusConfig;
    use chrono::Duration;
    use std::time::Duration as StdDuration;

    struct StubRules {
        delta: f64,
        reasons: Vec<String>,
    }

    #[async_trait]
    impl RuleEngine for StubRules {
        async fn evaluate_rules(
            &self,
            _anomaly: &AnomalyDetails,
            _reading: &SensorReading,
        ) -> Result<(f64, Vec<String>), MaintenanceError> {
            Ok((self.delta, self.reasons.clone()))
        }
    }

    struct StubHistory {
        readings: Vec<SensorReading>,
    }

    #[async_trait]
    impl SensorReadingRepository for StubHistory {
        async fn get_by_sensor_id(
            &self,
            _sensor_id: &str,
            limit: usize,
            _before_timestamp: Option<chrono::DateTime<Utc>>,
        ) -> Result<Vec<SensorReading>, MaintenanceError> {
            Ok(self.readings.iter().take(limit).cloned().collect())
        }
    }

    struct FailingHistory;

    #[async_trait]
    impl SensorReadingRepository for FailingHistory {
        async fn get_by_sensor_id(
            &self,
            _sensor_id: &str,
            _limit: usize,
            _before_timestamp: Option<chrono::DateTime<Utc>>,
        ) -> Result<Vec<SensorReading>, MaintenanceError> {
            Err(MaintenanceError::ServiceUnavailable("db down".into()))
        }
    }

    fn reading(value: f64, offset_minutes: i64) -> SensorReading {
        SensorReading {
            sensor_id: "sensor-1".to_string(),
            value,
            timestamp: Utc::now() - Duration::minutes(offset_minutes),
            sensor_type: crate::domain::models::SensorType::Temperature,
            unit: "celsius".to_string(),
            quality: 0.95,
            metadata: std::collections::HashMap::new(),
        }
    }

    fn anomaly_event(confidence: f64) -> EventEnvelope {
        EventEnvelope::new(DomainEvent::AnomalyDetected {
            anomaly_details: AnomalyDetails {
                is_anomaly: true,
                confidence,
                description: "spike".to_string(),
            },
            triggering_data: reading(100.0, 0),
            severity: crate::domain::models::EventSeverity::from_confidence(confidence),
        })
    }

    async fn capture_bus() -> (Arc<EventBus>, Arc<tokio::sync::Mutex<Vec<DomainEvent>>>) {
        let bus = Arc::new(EventBus::new(
            EventBusConfig {
                max_retries: 0,
                retry_delay: StdDuration::from_millis(1),
                dlq_enabled: false,
            },
            None,
        ));
        bus.start();
        let captured = Arc::new(tokio::sync::Mutex::new(Vec::new()));

        struct Capture(Arc<tokio::sync::Mutex<Vec<DomainEvent>>>);
        #[async_trait]
        impl EventHandler for Capture {
            fn name(&self) -> &str {
                "capture"
            }
            async fn handle(&self, event: &EventEnvelope) -> HandlerResult {
                self.0.lock().await.push(event.event.clone());
                Ok(())
            }
        }
        bus.subscribe("AnomalyValidated", Arc::new(Capture(captured.clone())))
            .await;
        (bus, captured)
    }

    #[tokio::test]
    async fn high_confidence_with_no_adjustment_is_credible() {
        let (bus, captured) = capture_bus().await;
        let agent = ValidationAgent::new(
            "validation-agent",
            ValidationConfig::default(),
            Arc::new(StubRules {
                delta: 0.0,
                reasons: vec![],
            }),
            Arc::new(StubHistory { readings: vec![] }),
        );
        agent.start(&bus).await.unwrap();
        bus.publish(anomaly_event(0.9)).await;

        let events = captured.lock().await;
        match &events[0] {
            DomainEvent::AnomalyValidated {
                validation_status,
                final_confidence,
                ..
            } => {
                assert_eq!(*validation_status, ValidationStatus::CredibleAnomaly);
                assert!((*final_confidence - 0.9).abs() < 1e-9);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn low_confidence_becomes_false_positive_suspected() {
        let (bus, captured) = capture_bus().await;
        let agent = ValidationAgent::new(
            "validation-agent",
            ValidationConfig::default(),
            Arc::new(StubRules {
                delta: -0.1,
                reasons: vec!["rule: sensor flaky".to_string()],
            }),
            Arc::new(StubHistory { readings: vec![] }),
        );
        agent.start(&bus).await.unwrap();
        bus.publish(anomaly_event(0.35)).await;

        let events = captured.lock().await;
        match &events[0] {
            DomainEvent::AnomalyValidated {
                validation_status,
                validation_reasons,
                ..
            } => {
                assert_eq!(*validation_status, ValidationStatus::FalsePositiveSuspected);
                assert!(validation_reasons.contains(&"rule: sensor flaky".to_string()));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn historical_fetch_failure_adds_reason_with_zero_adjustment() {
        let (bus, captured) = capture_bus().await;
        let agent = ValidationAgent::new(
            "validation-agent",
            ValidationConfig::default(),
            Arc::new(StubRules {
                delta: 0.0,
                reasons: vec![],
            }),
            Arc::new(FailingHistory),
        );
        agent.start(&bus).await.unwrap();
        bus.publish(anomaly_event(0.6)).await;

        let events = captured.lock().await;
        match &events[0] {
            DomainEvent::AnomalyValidated {
                final_confidence,
                validation_reasons,
                ..
            } => {
                assert!((*final_confidence - 0.6).abs() < 1e-9);
                assert!(validation_reasons
                    .iter()
                    .any(|r| r.contains("Could not retrieve historical data")));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn recent_stability_applies_negative_adjustment() {
        let (bus, captured) = capture_bus().await;
        let stable_history = vec![reading(100.0, 5), reading(101.0, 10), reading(99.0, 15)];
        let agent = ValidationAgent::new(
            "validation-agent",
            ValidationConfig {
                recent_stability_window: 3,
                ..ValidationConfig::default()
            },
            Arc::new(StubRules {
                delta: 0.0,
                reasons: vec![],
            }),
            Arc::new(StubHistory {
                readings: stable_history,
            }),
        );
        agent.start(&bus).await.unwrap();
        bus.publish(anomaly_event(0.8)).await;

        let events = captured.lock().await;
        match &events[0] {
            DomainEvent::AnomalyValidated {
                final_confidence,
                validation_reasons,
                ..
            } => {
                assert!((*final_confidence - 0.7).abs() < 1e-9);
                assert!(validation_reasons.contains(&"Recent value stability".to_string()));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
