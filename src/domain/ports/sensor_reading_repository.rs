//! `SensorReadingRepository` — read-only access to historical readings.
//! Persistence CRUD is out of scope; the core only depends on this trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::errors::MaintenanceError;
use crate::domain::models::SensorReading;

/// Read-only historical sensor data access, named `SensorReadingCRUD` in the
/// distilled spec's external-interface list.
#[async_trait]
pub trait SensorReadingRepository: Send + Sync {
    /// Most recent `limit` readings for `sensor_id`, strictly before
    /// `before_timestamp` when provided, newest first.
    async fn get_by_sensor_id(
        &self,
        sensor_id: &str,
        limit: usize,
        before_timestamp: Option<DateTime<Utc>>,
    ) -> Result<Vec<SensorReading>, MaintenanceError>;
}
