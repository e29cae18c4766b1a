use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs::File, str::FromStr, sync::Arc};
use tracing::Level;
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt::{self, writer::MakeWriterExt},
    prelude::*,
    util::TryInitError,
    Registry,
};

/// Defines the format for log messages.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Plain,
}

/// Defines the destination for log output.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    File,
}

/// Logging configuration, usually embedded in the connector's config file.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LogConfig {
    /// Log level, e.g. "info", "debug", "trace".
    pub level: String,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Path to the log file, required if output is "file".
    pub file_path: Option<String>,
    /// Extra `EnvFilter` directives, e.g. "sitestream_connector::stream=trace".
    pub directives: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Plain,
            output: LogOutput::Stdout,
            file_path: None,
            directives: None,
        }
    }
}

impl LogConfig {
    /// Parses `level`, falling back to `INFO` for unknown values.
    pub fn max_level(&self) -> Level {
        Level::from_str(&self.level).unwrap_or(Level::INFO)
    }

    fn env_filter(&self) -> Result<Option<EnvFilter>> {
        self.directives
            .as_deref()
            .map(|directives| {
                EnvFilter::builder()
                    .with_default_directive(LevelFilter::from_level(self.max_level()).into())
                    .parse(directives)
                    .with_context(|| format!("Invalid log directives '{}'", directives))
            })
            .transpose()
    }
}

/// Installs the global `tracing` subscriber described by `config`.
///
/// Fails if the configuration is inconsistent (file output without a path,
/// unparsable directives) or if a global subscriber has already been set.
pub fn init(config: &LogConfig) -> Result<()> {
    let log_level = config.max_level();
    let level_filter = LevelFilter::from_level(log_level);
    let env_filter = config.env_filter()?;
    let subscriber = Registry::default().with(level_filter).with(env_filter);

    match config.output {
        LogOutput::File => {
            let file_path = config
                .file_path
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("Log output is 'file' but 'file_path' is not specified"))?;
            let log_file = File::create(file_path)
                .with_context(|| format!("Failed to create log file '{}'", file_path))?;
            let file_writer = Arc::new(log_file).with_max_level(log_level);

            match config.format {
                LogFormat::Json => subscriber
                    .with(fmt::layer().with_writer(file_writer).with_ansi(false).json())
                    .try_init()?,
                LogFormat::Plain => subscriber
                    .with(fmt::layer().with_writer(file_writer).with_ansi(false))
                    .try_init()?,
            }
        }
        LogOutput::Stdout => {
            let stdout_writer = std::io::stdout.with_max_level(log_level);
            match config.format {
                LogFormat::Json => subscriber
                    .with(fmt::layer().with_writer(stdout_writer).json())
                    .try_init()?,
                LogFormat::Plain => subscriber
                    .with(fmt::layer().with_writer(stdout_writer).pretty())
                    .try_init()?,
            }
        }
    };

    tracing::debug!(level = %log_level, output = ?config.output, "Logging initialised");
    Ok(())
}

/// Like [`init`], but treats an already-installed global subscriber as success.
///
/// Configuration errors are still reported.
pub fn try_init(config: &LogConfig) -> Result<bool> {
    match init(config) {
        Ok(()) => Ok(true),
        Err(e) if e.is::<TryInitError>() => Ok(false),
        Err(e) => Err(e),
    }
}
