//! Sensor reading domain model.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::MaintenanceError;

/// Category of physical quantity a sensor measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    Temperature,
    Vibration,
    Pressure,
    Humidity,
    Voltage,
    Current,
    /// Anything not covered by the named categories.
    Other,
}

impl Default for SensorType {
    fn default() -> Self {
        Self::Other
    }
}

impl SensorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Vibration => "vibration",
            Self::Pressure => "pressure",
            Self::Humidity => "humidity",
            Self::Voltage => "voltage",
            Self::Current => "current",
            Self::Other => "other",
        }
    }

    pub fn parse_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "temperature" => Self::Temperature,
            "vibration" => Self::Vibration,
            "pressure" => Self::Pressure,
            "humidity" => Self::Humidity,
            "voltage" => Self::Voltage,
            "current" => Self::Current,
            _ => Self::Other,
        }
    }
}

/// A single sensor reading flowing through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorReading {
    pub sensor_id: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub sensor_type: SensorType,
    pub unit: String,
    /// Reading quality in `[0, 1]`; lower means less trustworthy.
    pub quality: f64,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl SensorReading {
    /// Validate the invariants the distilled spec calls out: `value` finite,
    /// `sensor_id` non-empty.
    pub fn validate(&self) -> Result<(), MaintenanceError> {
        if self.sensor_id.trim().is_empty() {
            return Err(MaintenanceError::DataValidation(
                "sensor_id must not be empty".into(),
            ));
        }
        if !self.value.is_finite() {
            return Err(MaintenanceError::DataValidation(format!(
                "sensor reading value must be finite, got {}",
                self.value
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(value: f64) -> SensorReading {
        SensorReading {
            sensor_id: "sensor-1".into(),
            value,
            timestamp: Utc::now(),
            sensor_type: SensorType::Temperature,
            unit: "celsius".into(),
            quality: 0.95,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn rejects_non_finite_value() {
        assert!(reading(f64::NAN).validate().is_err());
        assert!(reading(f64::INFINITY).validate().is_err());
        assert!(reading(42.0).validate().is_ok());
    }

    #[test]
    fn rejects_empty_sensor_id() {
        let mut r = reading(1.0);
        r.sensor_id = "  ".into();
        assert!(r.validate().is_err());
    }

    #[test]
    fn sensor_type_roundtrips_through_str() {
        for t in [
            SensorType::Temperature,
            SensorType::Vibration,
            SensorType::Pressure,
            SensorType::Humidity,
            SensorType::Voltage,
            SensorType::Current,
        ] {
            assert_eq!(SensorType::parse_str(t.as_str()), t);
        }
        assert_eq!(SensorType::parse_str("unknown"), SensorType::Other);
    }
}
