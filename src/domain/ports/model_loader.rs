//! `ModelLoader` — pluggable ML model registry consumed by
//! `AnomalyDetectionAgent`. Out of scope per the distilled spec; the core
//! only depends on this trait.

use async_trait::async_trait;

use crate::domain::errors::MaintenanceError;
use crate::domain::models::SensorReading;

/// Opaque handle to a loaded model. The core never inspects its contents —
/// it is passed back into [`ModelLoader::predict`].
pub trait LoadedModel: Send + Sync {}

/// Result of running a loaded model against a reading: `-1` flags an
/// anomaly, `+1` flags normal, paired with a continuous score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MlPrediction {
    pub prediction: i8,
    pub score: f64,
}

impl MlPrediction {
    pub fn is_anomaly(&self) -> bool {
        self.prediction == -1
    }
}

/// Loads and runs the ML half of the anomaly-detection ensemble.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    /// Load (or fetch from cache) the model and preprocessor appropriate for
    /// this reading's sensor, then run it. Returns [`MaintenanceError::MlModel`]
    /// on load or inference failure so the caller can degrade gracefully.
    async fn predict(&self, reading: &SensorReading) -> Result<MlPrediction, MaintenanceError>;

    /// List model identifiers available for a given sensor type.
    async fn list_available_models(&self, sensor_type: &str) -> Vec<String>;

    /// Drop any cached models/preprocessors.
    async fn clear_cache(&self);
}
