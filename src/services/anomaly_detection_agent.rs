//! Ensemble of an ML detector and a statistical detector applied to every
//! `DataProcessed` reading, with graceful degradation when either half
//! fails and bounded retry around publishing the resulting `AnomalyDetected`
//! event (§4.5).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::errors::MaintenanceError;
use crate::domain::models::{
    AgentCapability, AgentHealth, AnomalyDetails, DomainEvent, EventEnvelope, EventSeverity,
    SensorReading,
};
use crate::domain::ports::ModelLoader;
use crate::services::agent_runtime::{Agent, AgentRuntime};
use crate::services::event_bus::{EventBus, EventHandler, HandlerResult};

/// Tunables for the ensemble and its statistical half (§6 of the distilled
/// spec: `default_historical_std`, `use_serverless_models`, plus the
/// statistical detector's own parameters).
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AnomalyDetectionConfig {
    /// Standard deviation assumed for a sensor with no prior baseline.
    pub default_historical_std: f64,
    /// Whether the ML half should route through a serverless model loader
    /// rather than a local fallback. The core only depends on the
    /// [`ModelLoader`] trait either way; this flag is forwarded to
    /// implementations that care.
    pub use_serverless_models: bool,
    /// Number of standard deviations from the running mean that counts as
    /// anomalous.
    pub z_threshold: f64,
}

impl Default for AnomalyDetectionConfig {
    fn default() -> Self {
        Self {
            default_historical_std: 1.0,
            use_serverless_models: false,
            z_threshold: 3.0,
        }
    }
}

/// The statistical half of the ensemble: `(is_anomaly, confidence,
/// description)` from per-sensor historical mean/std. Agent-local (not a
/// `domain::ports` trait) because its cache is private to this agent, per
/// §5's "per-sensor baseline caches inside detectors (agent-local mutex)".
#[async_trait]
pub trait StatisticalDetector: Send + Sync {
    async fn detect(&self, reading: &SensorReading) -> Result<(bool, f64, String), MaintenanceError>;
}

#[derive(Debug, Clone, Copy)]
struct Baseline {
    mean: f64,
    std: f64,
    count: u64,
}

/// In-memory statistical detector: maintains a running mean/std per sensor
/// and flags a reading whose z-score exceeds `z_threshold`. Unseen sensors
/// bootstrap with `default_historical_std` and are never flagged on their
/// first reading (there is no baseline to deviate from yet).
pub struct RunningStatsDetector {
    config: AnomalyDetectionConfig,
    baselines: Mutex<HashMap<String, Baseline>>,
}

impl RunningStatsDetector {
    pub fn new(config: AnomalyDetectionConfig) -> Self {
        Self {
            config,
            baselines: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl StatisticalDetector for RunningStatsDetector {
    async fn detect(&self, reading: &SensorReading) -> Result<(bool, f64, String), MaintenanceError> {
        let mut baselines = self.baselines.lock().await;
        let baseline = baselines
            .entry(reading.sensor_id.clone())
            .or_insert(Baseline {
                mean: reading.value,
                std: self.config.default_historical_std,
                count: 0,
            });

        if baseline.count == 0 {
            baseline.count = 1;
            return Ok((false, 0.0, "bootstrapping baseline".to_string()));
        }

        let std = baseline.std.max(f64::EPSILON);
        let z = (reading.value - baseline.mean) / std;
        let is_anomaly = z.abs() > self.config.z_threshold;
        let confidence = (z.abs() / self.config.z_threshold * 0.5 + 0.3).clamp(0.0, 1.0);
        let description = if is_anomaly {
            format!("statistical_threshold_breach (z={z:.2})")
        } else {
            "normal".to_string()
        };

        // Welford-style incremental mean/std update.
        baseline.count += 1;
        let delta = reading.value - baseline.mean;
        baseline.mean += delta / baseline.count as f64;
        baseline.std = ((baseline.std * baseline.std * (baseline.count - 1) as f64
            + delta * (reading.value - baseline.mean))
            / baseline.count as f64)
            .sqrt();

        Ok((is_anomaly, confidence, description))
    }
}

fn ml_confidence(prediction: &crate::domain::ports::MlPrediction) -> f64 {
    if prediction.is_anomaly() {
        0.5 + 0.5 * prediction.score.abs().min(1.0)
    } else {
        0.1
    }
}

/// Combine the two half-detectors per §4.5's ensemble formula.
fn combine(
    ml: Option<(bool, f64)>,
    stat: Option<(bool, f64)>,
) -> Option<(bool, f64)> {
    match (ml, stat) {
        (Some((ml_anomaly, ml_conf)), Some((stat_anomaly, stat_conf))) => {
            let confidence = (0.6 * ml_conf + 0.4 * stat_conf).clamp(0.0, 1.0);
            Some((ml_anomaly || stat_anomaly, confidence))
        }
        (Some((ml_anomaly, ml_conf)), None) => {
            Some((ml_anomaly, (0.8 * ml_conf).clamp(0.0, 1.0)))
        }
        (None, Some((stat_anomaly, stat_conf))) => {
            Some((stat_anomaly, (0.8 * stat_conf).clamp(0.0, 1.0)))
        }
        (None, None) => None,
    }
}

/// Publish `event` on `bus`, retrying up to three attempts (100 ms apart)
/// while the bus reports itself stopped. The bus's own `publish` never
/// fails once running; this wrapper is what makes the distilled spec's
/// "publish retries... exhausted retries log and propagate a publish
/// error" (§4.5) observable and testable against a bus that has been
/// stopped out from under the agent.
async fn publish_with_bounded_retry(
    bus: &EventBus,
    event: EventEnvelope,
) -> Result<(), MaintenanceError> {
    const MAX_ATTEMPTS: u32 = 3;
    const DELAY: Duration = Duration::from_millis(100);

    for attempt in 1..=MAX_ATTEMPTS {
        if bus.is_running() {
            bus.publish(event).await;
            return Ok(());
        }
        tracing::warn!(attempt, "event bus not running, retrying publish");
        if attempt < MAX_ATTEMPTS {
            tokio::time::sleep(DELAY).await;
        }
    }
    Err(MaintenanceError::EventPublish(
        "event bus was not running after bounded retries".to_string(),
    ))
}

/// Runs the ML + statistical ensemble over every `DataProcessed` reading.
pub struct AnomalyDetectionAgent {
    runtime: Arc<AgentRuntime>,
    config: AnomalyDetectionConfig,
    model_loader: Arc<dyn ModelLoader>,
    statistical: Arc<dyn StatisticalDetector>,
}

impl AnomalyDetectionAgent {
    pub fn new(
        agent_id: impl Into<String>,
        config: AnomalyDetectionConfig,
        model_loader: Arc<dyn ModelLoader>,
        statistical: Arc<dyn StatisticalDetector>,
    ) -> Self {
        Self {
            runtime: Arc::new(AgentRuntime::new(agent_id)),
            config,
            model_loader,
            statistical,
        }
    }
}

#[async_trait]
impl Agent for AnomalyDetectionAgent {
    fn agent_id(&self) -> &str {
        self.runtime.agent_id()
    }

    fn register_capabilities(&self) -> Vec<AgentCapability> {
        vec![AgentCapability::new(
            "detect-anomaly",
            "Ensemble ML + statistical anomaly detection with graceful degradation",
            ["DataProcessed"],
            ["AnomalyDetected"],
        )]
    }

    async fn start(&self, bus: &Arc<EventBus>) -> Result<(), MaintenanceError> {
        self.register_capabilities();
        let _ = self.config.use_serverless_models;
        let handler = Arc::new(DataProcessedHandler {
            model_loader: Arc::clone(&self.model_loader),
            statistical: Arc::clone(&self.statistical),
            bus: Arc::clone(bus),
            runtime: Arc::clone(&self.runtime),
        });
        bus.subscribe("DataProcessed", Arc::clone(&handler) as Arc<dyn EventHandler>)
            .await;
        self.runtime
            .track_subscription(bus, "DataProcessed", handler.name())
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

struct DataProcessedHandler {
    model_loader: Arc<dyn ModelLoader>,
    statistical: Arc<dyn StatisticalDetector>,
    bus: Arc<EventBus>,
    runtime: Arc<crate::services::agent_runtime::AgentRuntime>,
}

#[async_trait]
impl EventHandler for DataProcessedHandler {
    fn name(&self) -> &str {
        "anomaly-detection-data-processed"
    }

    async fn handle(&self, event: &EventEnvelope) -> HandlerResult {
        let DomainEvent::DataProcessed { processed_data, .. } = &event.event else {
            return Ok(());
        };

        if let Err(err) = self.detect(event, processed_data).await {
            self.runtime.record_error(event.correlation_id, &err).await;
            return Err(err);
        }
        Ok(())
    }
}

impl DataProcessedHandler {
    async fn detect(&self, event: &EventEnvelope, processed_data: &SensorReading) -> HandlerResult {
        let ml_outcome = match self.model_loader.predict(processed_data).await {
            Ok(prediction) => Some((prediction.is_anomaly(), ml_confidence(&prediction))),
            Err(err) => {
                tracing::warn!(error = %err, "ML detector failed, degrading to statistical-only");
                None
            }
        };

        let stat_outcome = match self.statistical.detect(processed_data).await {
            Ok((is_anomaly, confidence, _description)) => Some((is_anomaly, confidence)),
            Err(err) => {
                tracing::warn!(error = %err, "statistical detector failed, degrading to ML-only");
                None
            }
        };

        let Some((is_anomaly, confidence)) = combine(ml_outcome, stat_outcome) else {
            return Err(MaintenanceError::MlModel(
                "both ML and statistical detectors failed".to_string(),
            ));
        };

        if !is_anomaly {
            return Ok(());
        }

        let severity = EventSeverity::from_confidence(confidence);
        let description = match (ml_outcome, stat_outcome) {
            (Some(_), Some(_)) => "ml and statistical detectors agree",
            (Some(_), None) => "ml detector only (statistical degraded)",
            (None, Some(_)) => "statistical detector only (ml degraded)",
            (None, None) => unreachable!("handled above"),
        };

        let anomaly_event = event.derive(DomainEvent::AnomalyDetected {
            anomaly_details: AnomalyDetails {
                is_anomaly: true,
                confidence,
                description: description.to_string(),
            },
            triggering_data: processed_data.clone(),
            severity,
        });

        publish_with_bounded_retry(&self.bus, anomaly_event).await
    }
}
