//! Infrastructure layer.
//!
//! Adapters for concerns that sit outside the domain/service layers:
//! - Configuration (figment: YAML + environment overrides)
//! - Logging (tracing + tracing-subscriber, rotation, secret scrubbing)

pub mod config;
pub mod logging;
