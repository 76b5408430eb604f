//! Logging infrastructure.
//!
//! Structured logging using tracing and tracing-subscriber: JSON/pretty
//! formatting, optional rolling file output, retention-based cleanup, and
//! secret scrubbing.

pub mod config;
pub mod logger;
pub mod rotation;
pub mod secret_scrubbing;

pub use config::{LogConfig, LogFormat, RotationPolicy};
pub use logger::LoggerImpl;
pub use rotation::LogRotator;
pub use secret_scrubbing::{ScrubbingMakeWriter, SecretScrubber};
