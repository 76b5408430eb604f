//! Configuration management infrastructure.
//!
//! Hierarchical configuration using figment: built-in defaults, optional
//! YAML file, then environment variable overrides (`ABATHUR_MAINT_` prefix).

pub mod loader;

pub use loader::{AppConfig, ConfigLoader};
