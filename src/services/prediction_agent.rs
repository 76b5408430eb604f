//! Time-series failure forecasting triggered by credible validated
//! anomalies (§4.6). Feeds a `Forecaster` port with recent historical
//! readings and turns its output into a `MaintenancePredicted` event.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::errors::MaintenanceError;
use crate::domain::models::{
    AgentCapability, AgentHealth, DomainEvent, EventEnvelope, MaintenanceType, SensorReading,
    ValidationStatus,
};
use crate::domain::ports::SensorReadingRepository;
use crate::services::agent_runtime::{Agent, AgentRuntime};
use crate::services::event_bus::{EventBus, EventHandler, HandlerResult};

/// Tunables named in the distilled spec's configuration surface for the
/// prediction agent (`historical_data_limit`, `min_historical_points`).
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PredictionAgentConfig {
    pub historical_data_limit: usize,
    pub min_historical_points: usize,
}

impl Default for PredictionAgentConfig {
    fn default() -> Self {
        Self {
            historical_data_limit: 100,
            min_historical_points: 10,
        }
    }
}

/// Output of a forecast run, mapped directly onto `MaintenancePredicted`'s
/// fields.
#[derive(Debug, Clone)]
pub struct ForecastResult {
    pub predicted_failure_date: DateTime<Utc>,
    pub confidence_interval_lower: f64,
    pub confidence_interval_upper: f64,
    pub prediction_confidence: f64,
    pub time_to_failure_days: f64,
    pub maintenance_type: MaintenanceType,
    pub recommended_actions: Vec<String>,
}

/// Time-series forecaster port ("Prophet-like" per the distilled spec):
/// out of scope for the core, consumed as a trait object.
#[async_trait]
pub trait Forecaster: Send + Sync {
    async fn forecast(
        &self,
        sensor_id: &str,
        history: &[SensorReading],
    ) -> Result<ForecastResult, MaintenanceError>;
}

/// Triggers on `AnomalyValidated`, fetches history, and emits
/// `MaintenancePredicted`.
pub struct PredictionAgent {
    runtime: Arc<AgentRuntime>,
    config: PredictionAgentConfig,
    history: Arc<dyn SensorReadingRepository>,
    forecaster: Arc<dyn Forecaster>,
}

impl PredictionAgent {
    pub fn new(
        agent_id: impl Into<String>,
        config: PredictionAgentConfig,
        history: Arc<dyn SensorReadingRepository>,
        forecaster: Arc<dyn Forecaster>,
    ) -> Self {
        Self {
            runtime: Arc::new(AgentRuntime::new(agent_id)),
            config,
            history,
            forecaster,
        }
    }
}

#[async_trait]
impl Agent for PredictionAgent {
    fn agent_id(&self) -> &str {
        self.runtime.agent_id()
    }

    fn register_capabilities(&self) -> Vec<AgentCapability> {
        vec![AgentCapability::new(
            "predict-failure",
            "Time-series failure forecasting from validated anomalies",
            ["AnomalyValidated"],
            ["MaintenancePredicted"],
        )]
    }

    async fn start(&self, bus: &Arc<EventBus>) -> Result<(), MaintenanceError> {
        self.register_capabilities();
        let handler = Arc::new(AnomalyValidatedHandler {
            config: self.config,
            history: Arc::clone(&self.history),
            forecaster: Arc::clone(&self.forecaster),
            bus: Arc::clone(bus),
            runtime: Arc::clone(&self.runtime),
        });
        bus.subscribe("AnomalyValidated", Arc::clone(&handler) as Arc<dyn EventHandler>)
            .await;
        self.runtime
            .track_subscription(bus, "AnomalyValidated", handler.name())
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
    config: PredictionAgentConfig,
    history: Arc<dyn SensorReadingRepository>,
    forecaster: Arc<dyn Forecaster>,
    bus: Arc<EventBus>,
    runtime: Arc<AgentRuntime>,
}

/// A validated anomaly is worth forecasting either when it was classified
/// as credible outright, or when the confidence alone clears the
/// distilled spec's 0.7 bar regardless of status (guards against a
/// forecaster-worthy anomaly that validation left as `Uncertain`).
fn should_forecast(validation_status: ValidationStatus, final_confidence: f64) -> bool {
    validation_status.is_credible() || final_confidence >= 0.7
}

#[async_trait]
impl EventHandler for AnomalyValidatedHandler {
    fn name(&self) -> &str {
        "prediction-anomaly-validated"
    }

    async fn handle(&self, event: &EventEnvelope) -> HandlerResult {
        let DomainEvent::AnomalyValidated { .. } = &event.event else {
            return Ok(());
        };

        if let Err(err) = self.predict(event).await {
            self.runtime.record_error(event.correlation_id, &err).await;
            return Err(err);
        }
        Ok(())
    }
}

impl AnomalyValidatedHandler {
    async fn predict(&self, event: &EventEnvelope) -> HandlerResult {
        let DomainEvent::AnomalyValidated {
            triggering_reading_payload,
            validation_status,
            final_confidence,
            ..
        } = &event.event
        else {
            return Ok(());
        };

        if !should_forecast(*validation_status, *final_confidence) {
            return Ok(());
        }

        let triggering_reading: SensorReading =
            serde_json::from_value(triggering_reading_payload.clone())?;
        let sensor_id = triggering_reading.sensor_id.clone();

        let history = self
            .history
            .get_by_sensor_id(
                &sensor_id,
                self.config.historical_data_limit,
                Some(triggering_reading.timestamp),
            )
            .await?;

        if history.len() < self.config.min_historical_points {
            tracing::debug!(
                sensor_id = %sensor_id,
                available = history.len(),
                required = self.config.min_historical_points,
                "insufficient history to forecast, skipping"
            );
            return Ok(());
        }

        let forecast = self.forecaster.forecast(&sensor_id, &history).await?;

        let predicted = event.derive(DomainEvent::MaintenancePredicted {
            // Resolved open question: the prediction/orchestrator state
            // keys on `equipment_id`, which this crate treats as
            // synonymous with the triggering reading's `sensor_id` — the
            // distilled spec never introduces a separate equipment
            // registry, so there is no other source for it.
            equipment_id: sensor_id,
            predicted_failure_date: forecast.predicted_failure_date,
            confidence_interval_lower: forecast.confidence_interval_lower,
            confidence_interval_upper: forecast.confidence_interval_upper,
            prediction_confidence: forecast.prediction_confidence,
            time_to_failure_days: forecast.time_to_failure_days,
            maintenance_type: forecast.maintenance_type,
            recommended_actions: forecast.recommended_actions,
            agent_id: "prediction-agent".to_string(),
        });

        self.bus.publish(predicted).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::AnomalyDetails;
    use crate::services::event_bus::EventBusConfig;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    struct StubHistory {
        readings: Vec<SensorReading>,
    }

    #[async_trait]
    impl SensorReadingRepository for StubHistory {
        async fn get_by_sensor_id(
            &self,
            _sensor_id: &str,
            limit: usize,
            _before_timestamp: Option<DateTime<Utc>>,
        ) -> Result<Vec<SensorReading>, MaintenanceError> {
            Ok(self.readings.iter().take(limit).cloned().collect())
        }
    }

    struct StubForecaster;

    #[async_trait]
    impl Forecaster for StubForecaster {
        async fn forecast(
            &self,
            _sensor_id: &str,
            _history: &[SensorReading],
        ) -> Result<ForecastResult, MaintenanceError> {
            Ok(ForecastResult {
                predicted_failure_date: Utc::now(),
                confidence_interval_lower: 0.6,
                confidence_interval_upper: 0.9,
                prediction_confidence: 0.8,
                time_to_failure_days: 20.0,
                maintenance_type: MaintenanceType::Preventive,
                recommended_actions: vec!["inspect bearing".to_string()],
            })
        }
    }

    fn reading() -> SensorReading {
        SensorReading {
            sensor_id: "sensor-7".to_string(),
            value: 10.0,
            timestamp: Utc::now(),
            sensor_type: crate::domain::models::SensorType::Vibration,
            unit: "mm/s".to_string(),
            quality: 0.9,
            metadata: HashMap::new(),
        }
    }

    fn validated_event(status: ValidationStatus, confidence: f64) -> EventEnvelope {
        EventEnvelope::new(DomainEvent::AnomalyValidated {
            original_anomaly_alert_payload: serde_json::to_value(AnomalyDetails {
                is_anomaly: true,
                confidence,
                description: "vibration spike".to_string(),
            })
            .unwrap(),
            triggering_reading_payload: serde_json::to_value(reading()).unwrap(),
            validation_status: status,
            final_confidence: confidence,
            validation_reasons: vec![],
            validated_at: Utc::now(),
            agent_id: "validation-agent".to_string(),
        })
    }

    async fn capture_bus() -> (Arc<EventBus>, Arc<Mutex<Vec<DomainEvent>>>) {
        let bus = Arc::new(EventBus::new(EventBusConfig::default(), None));
        bus.start();
        let captured = Arc::new(Mutex::new(Vec::new()));
        struct Capture(Arc<Mutex<Vec<DomainEvent>>>);
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
        bus.subscribe("MaintenancePredicted", Arc::new(Capture(captured.clone())))
            .await;
        (bus, captured)
    }

    #[tokio::test]
    async fn credible_anomaly_with_enough_history_emits_prediction() {
        let (bus, captured) = capture_bus().await;
        let history = Arc::new(StubHistory {
            readings: vec![reading(); 15],
        });
        let agent = PredictionAgent::new(
            "prediction-agent",
            PredictionAgentConfig::default(),
            history,
            Arc::new(StubForecaster),
        );
        agent.start(&bus).await.unwrap();
        bus.publish(validated_event(ValidationStatus::CredibleAnomaly, 0.9))
            .await;

        let events = captured.lock().await;
        assert_eq!(events.len(), 1);
        match &events[0] {
            DomainEvent::MaintenancePredicted { equipment_id, .. } => {
                assert_eq!(equipment_id, "sensor-7");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn uncertain_with_low_confidence_is_skipped() {
        let (bus, captured) = capture_bus().await;
        let history = Arc::new(StubHistory {
            readings: vec![reading(); 15],
        });
        let agent = PredictionAgent::new(
            "prediction-agent",
            PredictionAgentConfig::default(),
            history,
            Arc::new(StubForecaster),
        );
        agent.start(&bus).await.unwrap();
        bus.publish(validated_event(ValidationStatus::Uncertain, 0.5))
            .await;

        assert!(captured.lock().await.is_empty());
    }

    #[tokio::test]
    async fn insufficient_history_is_skipped_even_when_credible() {
        let (bus, captured) = capture_bus().await;
        let history = Arc::new(StubHistory {
            readings: vec![reading(); 3],
        });
        let agent = PredictionAgent::new(
            "prediction-agent",
            PredictionAgentConfig::default(),
            history,
            Arc::new(StubForecaster),
        );
        agent.start(&bus).await.unwrap();
        bus.publish(validated_event(ValidationStatus::CredibleAnomaly, 0.95))
            .await;

        assert!(captured.lock().await.is_empty());
    }

    #[tokio::test]
    async fn high_confidence_uncertain_anomaly_still_forecasts() {
        let (bus, captured) = capture_bus().await;
        let history = Arc::new(StubHistory {
            readings: vec![reading(); 15],
        });
        let agent = PredictionAgent::new(
            "prediction-agent",
            PredictionAgentConfig::default(),
            history,
            Arc::new(StubForecaster),
        );
        agent.start(&bus).await.unwrap();
        bus.publish(validated_event(ValidationStatus::Uncertain, 0.75))
            .await;

        assert_eq!(captured.lock().await.len(), 1);
    }
}
