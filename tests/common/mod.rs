//! Shared in-memory stand-ins for the external collaborators consumed via
//! `domain::ports`, used across the integration test suite. None of this is
//! part of the core budget — it is throwaway test scaffolding.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use abathur_maintenance::domain::errors::MaintenanceError;
use abathur_maintenance::domain::models::{
    AnomalyDetails, DomainEvent, EventEnvelope, MaintenanceType, SensorReading,
};
use abathur_maintenance::domain::ports::{
    MlPrediction, ModelLoader, RuleEngine, SensorReadingRepository,
};
use abathur_maintenance::services::prediction_agent::ForecastResult;
use abathur_maintenance::services::{
    EventBus, EventBusConfig, EventHandler, Forecaster, HandlerResult, StatisticalDetector,
};

/// Always returns the same `MlPrediction`.
pub struct ConstantModelLoader(pub MlPrediction);

#[async_trait]
impl ModelLoader for ConstantModelLoader {
    async fn predict(&self, _reading: &SensorReading) -> Result<MlPrediction, MaintenanceError> {
        Ok(self.0)
    }
    async fn list_available_models(&self, _sensor_type: &str) -> Vec<String> {
        vec![]
    }
    async fn clear_cache(&self) {}
}

/// Statistical-detector stand-in that always reports the same verdict.
pub struct ConstantStatisticalDetector(pub bool, pub f64, pub &'static str);

#[async_trait]
impl StatisticalDetector for ConstantStatisticalDetector {
    async fn detect(
        &self,
        _reading: &SensorReading,
    ) -> Result<(bool, f64, String), MaintenanceError> {
        Ok((self.0, self.1, self.2.to_string()))
    }
}

/// No-op rule engine: zero delta, no reasons.
pub struct NoopRuleEngine;

#[async_trait]
impl RuleEngine for NoopRuleEngine {
    async fn evaluate_rules(
        &self,
        _anomaly: &AnomalyDetails,
        _reading: &SensorReading,
    ) -> Result<(f64, Vec<String>), MaintenanceError> {
        Ok((0.0, vec![]))
    }
}

/// In-memory history keyed by sensor id, returned as given (already newest
/// first) up to `limit`.
pub struct FixedHistory {
    pub readings: Vec<SensorReading>,
}

#[async_trait]
impl SensorReadingRepository for FixedHistory {
    async fn get_by_sensor_id(
        &self,
        _sensor_id: &str,
        limit: usize,
        _before_timestamp: Option<DateTime<Utc>>,
    ) -> Result<Vec<SensorReading>, MaintenanceError> {
        Ok(self.readings.iter().take(limit).cloned().collect())
    }
}

/// Forecaster stand-in returning a fixed `ForecastResult` regardless of
/// input history, so tests can drive the orchestrator's decision table
/// directly through `time_to_failure_days`/`prediction_confidence`.
pub struct FixedForecaster {
    pub time_to_failure_days: f64,
    pub prediction_confidence: f64,
    pub maintenance_type: MaintenanceType,
}

#[async_trait]
impl Forecaster for FixedForecaster {
    async fn forecast(
        &self,
        _sensor_id: &str,
        _history: &[SensorReading],
    ) -> Result<ForecastResult, MaintenanceError> {
        Ok(ForecastResult {
            predicted_failure_date: Utc::now()
                + chrono::Duration::days(self.time_to_failure_days as i64),
            confidence_interval_lower: (self.prediction_confidence - 0.1).max(0.0),
            confidence_interval_upper: (self.prediction_confidence + 0.1).min(1.0),
            prediction_confidence: self.prediction_confidence,
            time_to_failure_days: self.time_to_failure_days,
            maintenance_type: self.maintenance_type,
            recommended_actions: vec!["inspect equipment".to_string()],
        })
    }
}

/// Sensor reading builder with sane defaults, tweaked per test.
pub fn reading(sensor_id: &str, value: f64) -> SensorReading {
    SensorReading {
        sensor_id: sensor_id.to_string(),
        value,
        timestamp: Utc::now(),
        sensor_type: abathur_maintenance::domain::models::SensorType::Vibration,
        unit: "mm/s".to_string(),
        quality: 0.95,
        metadata: HashMap::new(),
    }
}

pub fn data_processed_event(sensor_id: &str, value: f64) -> EventEnvelope {
    EventEnvelope::new(DomainEvent::DataProcessed {
        processed_data: reading(sensor_id, value),
        original_event_id: uuid::Uuid::new_v4(),
        source_sensor_id: sensor_id.to_string(),
    })
}

/// Collects every event of any type published on a bus, in publish order.
pub struct EventCollector {
    pub events: Mutex<Vec<DomainEvent>>,
}

impl EventCollector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    pub async fn subscribe_to(self: &Arc<Self>, bus: &EventBus, event_type: &str) {
        bus.subscribe(event_type, Arc::clone(self) as Arc<dyn EventHandler>)
            .await;
    }
}

#[async_trait]
impl EventHandler for EventCollector {
    fn name(&self) -> &str {
        "test-event-collector"
    }

    async fn handle(&self, event: &EventEnvelope) -> HandlerResult {
        self.events.lock().await.push(event.event.clone());
        Ok(())
    }
}

pub fn fast_bus_config() -> EventBusConfig {
    EventBusConfig {
        max_retries: 0,
        retry_delay: std::time::Duration::from_millis(1),
        dlq_enabled: false,
    }
}
