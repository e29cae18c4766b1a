//! Logging bootstrap for sitestream services.
//!
//! Wraps `tracing-subscriber` so that binaries embedding the connector can
//! configure level, format and destination from the same file as the rest
//! of their settings.
mod logging;

pub use logging::{init, try_init, LogConfig, LogFormat, LogOutput};
