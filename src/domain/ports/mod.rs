//! Domain ports (interfaces) consumed by the maintenance backbone core.
//!
//! Everything in this module is an "out of scope" collaborator per the
//! distilled spec's §1 — ML inference, persistence CRUD, rule evaluation,
//! notification delivery, and DLQ persistence are all pluggable
//! dependencies with narrow contracts, not implemented here.

pub mod dead_letter_sink;
pub mod model_loader;
pub mod notification_provider;
pub mod rule_engine;
pub mod sensor_reading_repository;

pub use dead_letter_sink::{DeadLetterRecord, DeadLetterSink};
pub use model_loader::{LoadedModel, MlPrediction, ModelLoader};
pub use notification_provider::{
    NotificationChannel, NotificationProvider, NotificationRequest, NotificationResult,
};
pub use rule_engine::RuleEngine;
pub use sensor_reading_repository::SensorReadingRepository;
