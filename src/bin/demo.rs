//! Illustrative end-to-end run: scripted sensor readings flow through the
//! detection/validation/prediction/orchestration pipeline, with an
//! in-memory operator that auto-approves any request for human sign-off so
//! the run completes unattended.
//!
//! Every external collaborator (model registry, rule engine, notification
//! provider, historical store) is a throwaway in-memory stand-in behind the
//! crate's own port traits — nothing here is part of the orchestration
//! core.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use clap::Parser;
use tokio::sync::Mutex;
use uuid::Uuid;

use abathur_maintenance::domain::errors::MaintenanceError;
use abathur_maintenance::domain::models::{
    AgentCapability, AgentHealth, AnomalyDetails, DomainEvent, EventEnvelope, MaintenanceType,
    SensorReading, SensorType,
};
use abathur_maintenance::domain::ports::{
    DeadLetterRecord, DeadLetterSink, MlPrediction, ModelLoader, NotificationChannel,
    NotificationProvider, NotificationRequest, NotificationResult, RuleEngine,
    SensorReadingRepository,
};
use abathur_maintenance::infrastructure::config::ConfigLoader;
use abathur_maintenance::infrastructure::logging::LoggerImpl;
use abathur_maintenance::services::prediction_agent::ForecastResult;
use abathur_maintenance::services::{
    Agent, AnomalyDetectionAgent, EventBus, EventHandler, Forecaster, HandlerResult,
    OrchestratorAgent, PredictionAgent, RunningStatsDetector, SystemCoordinator, ValidationAgent,
};

#[derive(Parser, Debug)]
#[command(about = "Replays scripted sensor readings through the maintenance pipeline")]
struct Args {
    /// Optional YAML config file; falls back to built-in defaults.
    #[arg(long, default_value = "abathur-maintenance.yaml")]
    config: PathBuf,

    /// Number of scripted readings to replay for the monitored equipment.
    #[arg(long, default_value_t = 30)]
    ticks: usize,
}

/// In-memory store doubling as the `SensorReadingRepository` the validation
/// and prediction agents read from.
struct InMemoryHistory {
    readings: Mutex<HashMap<String, Vec<SensorReading>>>,
}

impl InMemoryHistory {
    fn new() -> Self {
        Self {
            readings: Mutex::new(HashMap::new()),
        }
    }

    async fn record(&self, reading: SensorReading) {
        self.readings
            .lock()
            .await
            .entry(reading.sensor_id.clone())
            .or_default()
            .push(reading);
    }
}

#[async_trait]
impl SensorReadingRepository for InMemoryHistory {
    async fn get_by_sensor_id(
        &self,
        sensor_id: &str,
        limit: usize,
        before_timestamp: Option<chrono::DateTime<Utc>>,
    ) -> Result<Vec<SensorReading>, MaintenanceError> {
        let readings = self.readings.lock().await;
        let mut matching: Vec<SensorReading> = readings
            .get(sensor_id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|r| before_timestamp.is_none_or(|cutoff| r.timestamp < cutoff))
            .collect();
        matching.sort_by_key(|r| std::cmp::Reverse(r.timestamp));
        matching.truncate(limit);
        Ok(matching)
    }
}

/// Flags a reading anomalous once it crosses a fixed threshold. Stands in
/// for a trained model without pulling in an inference runtime.
struct ThresholdModelLoader {
    threshold: f64,
}

#[async_trait]
impl ModelLoader for ThresholdModelLoader {
    async fn predict(&self, reading: &SensorReading) -> Result<MlPrediction, MaintenanceError> {
        let deviation = (reading.value - self.threshold) / self.threshold.max(f64::EPSILON);
        if reading.value > self.threshold {
            Ok(MlPrediction {
                prediction: -1,
                score: -deviation,
            })
        } else {
            Ok(MlPrediction {
                prediction: 1,
                score: deviation,
            })
        }
    }

    async fn list_available_models(&self, _sensor_type: &str) -> Vec<String> {
        vec!["threshold-v1".to_string()]
    }

    async fn clear_cache(&self) {}
}

/// A single rule: anomalies with a high raw confidence get a further
/// confidence boost, on the theory that the ML half rarely fires spuriously
/// at this threshold.
struct ConfidenceBoostRuleEngine;

#[async_trait]
impl RuleEngine for ConfidenceBoostRuleEngine {
    async fn evaluate_rules(
        &self,
        anomaly: &AnomalyDetails,
        _reading: &SensorReading,
    ) -> Result<(f64, Vec<String>), MaintenanceError> {
        if anomaly.confidence > 0.6 {
            Ok((0.05, vec!["high raw confidence from ensemble".to_string()]))
        } else {
            Ok((0.0, vec![]))
        }
    }
}

/// Straight-line extrapolation from the spread of recent readings. Not a
/// real forecaster, just enough to produce a plausible `ForecastResult`.
struct LinearForecaster;

#[async_trait]
impl Forecaster for LinearForecaster {
    async fn forecast(
        &self,
        _sensor_id: &str,
        history: &[SensorReading],
    ) -> Result<ForecastResult, MaintenanceError> {
        let values: Vec<f64> = history.iter().map(|r| r.value).collect();
        let spread = values.iter().cloned().fold(0.0_f64, f64::max)
            - values.iter().cloned().fold(f64::MAX, f64::min);
        let time_to_failure_days = (60.0 - spread).max(3.0);
        let maintenance_type = if time_to_failure_days < 15.0 {
            MaintenanceType::UrgentCorrective
        } else if time_to_failure_days < 40.0 {
            MaintenanceType::Preventive
        } else {
            MaintenanceType::Inspection
        };

        Ok(ForecastResult {
            predicted_failure_date: Utc::now() + ChronoDuration::days(time_to_failure_days as i64),
            confidence_interval_lower: 0.7,
            confidence_interval_upper: 0.95,
            prediction_confidence: 0.88,
            time_to_failure_days,
            maintenance_type,
            recommended_actions: vec![
                "inspect bearing assembly".to_string(),
                "check lubrication levels".to_string(),
            ],
        })
    }
}

/// Writes console notifications for scheduled maintenance. Delivery always
/// succeeds; this is a demo stand-in, not a real channel integration.
struct ConsoleNotificationProvider;

#[async_trait]
impl NotificationProvider for ConsoleNotificationProvider {
    async fn send(&self, request: &NotificationRequest) -> NotificationResult {
        println!("[notify:{:?}] {}: {}", request.channel, request.subject, request.body);
        NotificationResult {
            delivered: true,
            provider_message: None,
        }
    }

    fn supports_channel(&self, channel: NotificationChannel) -> bool {
        matches!(channel, NotificationChannel::Console)
    }

    async fn health_check(&self) -> bool {
        true
    }
}

/// Logs dead-lettered events instead of persisting them anywhere.
struct LoggingDeadLetterSink;

#[async_trait]
impl DeadLetterSink for LoggingDeadLetterSink {
    async fn write(&self, record: DeadLetterRecord) {
        tracing::error!(
            event_type = %record.event_type,
            handler = %record.handler_name,
            error = %record.error,
            "event moved to dead-letter queue"
        );
    }
}

/// Not a real agent: subscribes to `HumanDecisionRequired` and immediately
/// approves, and to `ScheduleMaintenanceCommand` to forward a notification.
/// Exists only so this demo run completes unattended.
struct OperatorSimulator {
    notifier: Arc<dyn NotificationProvider>,
    bus: Mutex<Option<Arc<EventBus>>>,
}

#[async_trait]
impl Agent for OperatorSimulator {
    fn agent_id(&self) -> &str {
        "operator-simulator"
    }

    fn register_capabilities(&self) -> Vec<AgentCapability> {
        vec![AgentCapability::new(
            "simulate-operator",
            "Auto-approves human decision requests and echoes schedule notifications",
            ["HumanDecisionRequired", "ScheduleMaintenanceCommand"],
            ["HumanDecisionResponse"],
        )]
    }

    async fn start(&self, bus: &Arc<EventBus>) -> Result<(), MaintenanceError> {
        bus.subscribe(
            "HumanDecisionRequired",
            Arc::new(AutoApproveHandler {
                bus: Arc::clone(bus),
            }),
        )
        .await;
        bus.subscribe(
            "ScheduleMaintenanceCommand",
            Arc::new(NotifyHandler {
                notifier: Arc::clone(&self.notifier),
            }),
        )
        .await;
        *self.bus.lock().await = Some(Arc::clone(bus));
        Ok(())
    }

    async fn stop(&self) {
        if let Some(bus) = self.bus.lock().await.take() {
            bus.unsubscribe("HumanDecisionRequired", "operator-auto-approve")
                .await;
            bus.unsubscribe("ScheduleMaintenanceCommand", "operator-notify-on-schedule")
                .await;
        }
    }

    async fn health(&self) -> AgentHealth {
        AgentHealth::new(
            self.agent_id().to_string(),
            abathur_maintenance::domain::models::AgentStatus::Running,
        )
    }
}

struct AutoApproveHandler {
    bus: Arc<EventBus>,
}

#[async_trait]
impl EventHandler for AutoApproveHandler {
    fn name(&self) -> &str {
        "operator-auto-approve"
    }

    async fn handle(&self, event: &EventEnvelope) -> HandlerResult {
        let DomainEvent::HumanDecisionRequired { payload } = &event.event else {
            return Ok(());
        };
        println!(
            "[operator] approving request {} (priority={})",
            payload.request_id, payload.priority
        );
        let response = event.derive(DomainEvent::HumanDecisionResponse {
            payload: abathur_maintenance::domain::models::DecisionResponse {
                request_id: payload.request_id.clone(),
                decision: "approved".to_string(),
                notes: Some("auto-approved by demo operator simulator".to_string()),
            },
        });
        self.bus.publish(response).await;
        Ok(())
    }
}

struct NotifyHandler {
    notifier: Arc<dyn NotificationProvider>,
}

#[async_trait]
impl EventHandler for NotifyHandler {
    fn name(&self) -> &str {
        "operator-notify-on-schedule"
    }

    async fn handle(&self, event: &EventEnvelope) -> HandlerResult {
        let DomainEvent::ScheduleMaintenanceCommand {
            maintenance_data,
            urgency_level,
            ..
        } = &event.event
        else {
            return Ok(());
        };
        self.notifier
            .send(&NotificationRequest {
                channel: NotificationChannel::Console,
                recipient: "maintenance-team".to_string(),
                subject: format!("maintenance scheduled ({urgency_level:?})"),
                body: maintenance_data.to_string(),
            })
            .await;
        Ok(())
    }
}

/// Produces a scripted, deterministic reading sequence: a stable baseline
/// that spikes partway through, enough to carry a reading through
/// detection, validation, and prediction.
fn scripted_reading(equipment_id: &str, tick: usize, total_ticks: usize) -> SensorReading {
    let spike_start = total_ticks.saturating_sub(total_ticks / 3);
    let value = if tick >= spike_start {
        90.0 + (tick - spike_start) as f64 * 2.0
    } else {
        20.0 + (tick % 3) as f64 * 0.5
    };

    SensorReading {
        sensor_id: equipment_id.to_string(),
        value,
        timestamp: Utc::now() - ChronoDuration::seconds((total_ticks - tick) as i64),
        sensor_type: SensorType::Vibration,
        unit: "mm/s".to_string(),
        quality: 0.95,
        metadata: HashMap::new(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = ConfigLoader::load_from(&args.config)?;
    let _logger = LoggerImpl::init(&config.logging)?;

    let equipment_id = "pump-7";
    let history = Arc::new(InMemoryHistory::new());

    let bus = Arc::new(EventBus::new(
        config.event_bus.clone(),
        Some(Arc::new(LoggingDeadLetterSink)),
    ));
    let mut coordinator = SystemCoordinator::new(Arc::clone(&bus));

    coordinator.register_agent(Arc::new(AnomalyDetectionAgent::new(
        "anomaly-detection-agent",
        config.anomaly_detection,
        Arc::new(ThresholdModelLoader { threshold: 75.0 }),
        Arc::new(RunningStatsDetector::new(config.anomaly_detection)),
    )));
    coordinator.register_agent(Arc::new(ValidationAgent::new(
        "validation-agent",
        config.validation,
        Arc::new(ConfidenceBoostRuleEngine),
        Arc::clone(&history) as Arc<dyn SensorReadingRepository>,
    )));
    coordinator.register_agent(Arc::new(PredictionAgent::new(
        "prediction-agent",
        config.prediction,
        Arc::clone(&history) as Arc<dyn SensorReadingRepository>,
        Arc::new(LinearForecaster),
    )));
    coordinator.register_agent(Arc::new(OrchestratorAgent::new(
        "orchestrator-agent",
        config.orchestrator,
    )));
    coordinator.register_agent(Arc::new(OperatorSimulator {
        notifier: Arc::new(ConsoleNotificationProvider),
        bus: Mutex::new(None),
    }));

    coordinator.start().await?;

    for tick in 0..args.ticks {
        let reading = scripted_reading(equipment_id, tick, args.ticks);
        history.record(reading.clone()).await;

        let envelope = EventEnvelope::new(DomainEvent::DataProcessed {
            processed_data: reading,
            original_event_id: Uuid::new_v4(),
            source_sensor_id: equipment_id.to_string(),
        })
        .with_correlation_id(Uuid::new_v4());

        bus.publish(envelope).await;
    }

    coordinator.stop().await;

    let recent = coordinator.recent_schedules().await;
    println!("\n{} maintenance command(s) scheduled:", recent.len());
    for schedule in recent {
        println!(
            "  equipment={:?} urgency={:?} auto_approved={} human_approved={}",
            schedule.equipment_id, schedule.urgency_level, schedule.auto_approved, schedule.human_approved
        );
    }

    Ok(())
}
