use crate::error::ConfigError;
use anyhow::Context;
use serde::Deserialize;
use sitestream_logger::LogConfig;
use std::time::Duration;

/// The top-level configuration for the `sitestream-connector` library.
///
/// This struct aggregates the resolved settings the core consumes at startup:
/// API endpoints, dispatcher sizing and streaming behavior. It is typically
/// deserialized from a configuration file via [`ConnectorConfig::load`] and
/// passed to [`Connector::new`](crate::Connector::new).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectorConfig {
    #[serde(default)]
    pub endpoints: Endpoints,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
    /// Logging settings. The connector never reads them; embedding binaries
    /// pass them to `sitestream_logger::init`.
    #[serde(default)]
    pub log: LogConfig,
}

/// Base URLs of the REST and streaming APIs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub rest_base_url: String,
    pub user_stream_base_url: String,
    pub site_stream_base_url: String,
}

/// Sizing of the asynchronous command dispatcher.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Number of worker tasks executing commands. Commands start in
    /// submission order only when this is 1.
    pub worker_count: usize,
}

/// Defines behavior for streaming sessions.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// A connection that delivers no line (keep-alives included) for this
    /// long is considered stalled and is reconnected. Also bounds each
    /// connect attempt.
    pub read_timeout_ms: u64,
    /// The first backoff delay after a stream failure.
    pub retry_interval_ms: u64,
    /// Upper bound for the doubling backoff delay.
    pub max_retry_interval_ms: u64,
    /// Buffer capacity for channel-backed listeners (`EventListener`).
    pub listener_buffer: usize,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            rest_base_url: "https://api.twitter.com/1/".to_string(),
            user_stream_base_url: "https://userstream.twitter.com/2/".to_string(),
            site_stream_base_url: "https://betastream.twitter.com/2b/".to_string(),
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { worker_count: 1 }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: 5 * 60 * 1000,
            retry_interval_ms: 5_000,
            max_retry_interval_ms: 320_000,
            listener_buffer: 128,
        }
    }
}

impl StreamingConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn max_retry_interval(&self) -> Duration {
        Duration::from_millis(self.max_retry_interval_ms)
    }
}

impl ConnectorConfig {
    /// Loads the configuration from a TOML file, layered under environment
    /// variables prefixed with `SITESTREAM__` (e.g.
    /// `SITESTREAM__DISPATCHER__WORKER_COUNT=4`), and validates it.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix("SITESTREAM")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        let settings: ConnectorConfig = builder
            .build()
            .with_context(|| format!("Failed to build configuration from '{}'", path))?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        settings.validate()?;
        Ok(settings)
    }

    /// Rejects values the dispatcher and stream router cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatcher.worker_count == 0 {
            return Err(ConfigError::Invalid(
                "dispatcher.worker_count must be at least 1".to_string(),
            ));
        }
        let streaming = &self.streaming;
        if streaming.read_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "streaming.read_timeout_ms must be positive".to_string(),
            ));
        }
        if streaming.retry_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "streaming.retry_interval_ms must be positive".to_string(),
            ));
        }
        if streaming.max_retry_interval_ms < streaming.retry_interval_ms {
            return Err(ConfigError::Invalid(format!(
                "streaming.max_retry_interval_ms ({}) is below streaming.retry_interval_ms ({})",
                streaming.max_retry_interval_ms, streaming.retry_interval_ms
            )));
        }
        if streaming.listener_buffer == 0 {
            return Err(ConfigError::Invalid(
                "streaming.listener_buffer must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
