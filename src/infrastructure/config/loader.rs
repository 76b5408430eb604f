//! Layered configuration loading: built-in defaults, an optional YAML file,
//! then environment variable overrides, in that order of precedence.
//!
//! Mirrors the teacher's figment-based loader, retargeted at this crate's
//! own config surface rather than the original CLI's agent/database
//! settings.

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::domain::errors::MaintenanceResult;
use crate::infrastructure::logging::LogConfig;
use crate::services::{
    AnomalyDetectionConfig, EventBusConfig, OrchestratorConfig, PredictionAgentConfig,
    ValidationConfig,
};

/// Environment variable prefix for overrides, e.g.
/// `ABATHUR_MAINT_EVENT_BUS__MAX_RETRIES=5`.
const ENV_PREFIX: &str = "ABATHUR_MAINT_";

/// Default path searched for a YAML config file when none is given
/// explicitly.
const DEFAULT_CONFIG_PATH: &str = "abathur-maintenance.yaml";

/// Top-level configuration for the maintenance orchestration backbone.
/// Each field groups the tunables a single service already defines as its
/// own `Default`-implementing config struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub event_bus: EventBusConfig,
    pub orchestrator: OrchestratorConfig,
    pub validation: ValidationConfig,
    pub anomaly_detection: AnomalyDetectionConfig,
    pub prediction: PredictionAgentConfig,
    pub logging: LogConfig,
}

/// Loads [`AppConfig`] from defaults, an optional YAML file, and
/// environment overrides.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads configuration from [`DEFAULT_CONFIG_PATH`] if present, falling
    /// back to defaults, then applies `ABATHUR_MAINT_`-prefixed environment
    /// overrides.
    pub fn load() -> MaintenanceResult<AppConfig> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Loads configuration from an explicit YAML file path. A missing file
    /// is not an error: the merge simply falls through to defaults.
    pub fn load_from(path: impl AsRef<Path>) -> MaintenanceResult<AppConfig> {
        let config: AppConfig = Figment::new()
            .merge(Serialized::defaults(AppConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(config)
    }

    /// Path [`ConfigLoader::load`] looks for when no explicit path is given.
    pub fn default_config_path() -> PathBuf {
        PathBuf::from(DEFAULT_CONFIG_PATH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_match_each_services_own_default() {
        let config = AppConfig::default();
        assert_eq!(config.event_bus.max_retries, EventBusConfig::default().max_retries);
        assert_eq!(
            config.orchestrator.urgent_maintenance_days,
            OrchestratorConfig::default().urgent_maintenance_days
        );
        assert_eq!(
            config.validation.credible_threshold,
            ValidationConfig::default().credible_threshold
        );
    }

    #[test]
    fn yaml_file_overrides_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "orchestrator:\n  urgent_maintenance_days: 45.0\n  high_confidence_threshold: 0.95\n"
        )
        .unwrap();

        let config = ConfigLoader::load_from(file.path()).unwrap();
        assert_eq!(config.orchestrator.urgent_maintenance_days, 45.0);
        assert_eq!(config.orchestrator.high_confidence_threshold, 0.95);
        // Untouched fields keep their defaults.
        assert_eq!(
            config.orchestrator.moderate_confidence_threshold,
            OrchestratorConfig::default().moderate_confidence_threshold
        );
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = ConfigLoader::load_from("/nonexistent/path/does-not-exist.yaml").unwrap();
        assert_eq!(config.event_bus.max_retries, EventBusConfig::default().max_retries);
    }

    #[test]
    fn env_override_takes_precedence_over_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "validation:\n  credible_threshold: 0.6\n").unwrap();

        temp_env::with_var(
            "ABATHUR_MAINT_VALIDATION__CREDIBLE_THRESHOLD",
            Some("0.8"),
            || {
                let config = ConfigLoader::load_from(file.path()).unwrap();
                assert_eq!(config.validation.credible_threshold, 0.8);
            },
        );
    }
}
