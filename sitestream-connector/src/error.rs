use crate::events::SubscriberId;
use std::{fmt, time::Duration};
use thiserror::Error;

/// Broad classification of a transport-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Connection refused, reset, DNS failure and the like.
    Network,
    /// The server answered with a non-success HTTP status.
    Http,
    /// The request or read did not complete in time.
    Timeout,
    /// Credentials were rejected (HTTP 401/403). Never retried by the stream router.
    Unauthorized,
    Other,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Network => "network",
            FailureKind::Http => "http",
            FailureKind::Timeout => "timeout",
            FailureKind::Unauthorized => "unauthorized",
            FailureKind::Other => "other",
        };
        f.write_str(s)
    }
}

/// A structured failure reported by a [`Transport`](crate::transport::Transport).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} transport failure{}: {message}", status_suffix(.status))]
pub struct TransportFailure {
    pub kind: FailureKind,
    pub status: Option<u16>,
    pub message: String,
    /// Server-provided hint for when the call may be attempted again.
    pub retry_after: Option<Duration>,
}

impl TransportFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, message)
    }

    /// Builds a failure from an HTTP status, classifying 401/403 as `Unauthorized`.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            401 | 403 => FailureKind::Unauthorized,
            _ => FailureKind::Http,
        };
        Self {
            kind,
            status: Some(status),
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    /// Whether a streaming session must close instead of reconnecting.
    pub fn is_unrecoverable(&self) -> bool {
        self.kind == FailureKind::Unauthorized
    }
}

/// A stream line that could not be turned into a [`StreamEvent`](crate::events::StreamEvent).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to decode stream line: {reason}")]
pub struct DecodeError {
    pub line: String,
    pub reason: String,
}

impl DecodeError {
    pub fn new(line: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            reason: reason.into(),
        }
    }
}

/// An event arrived for a subscriber with no registered handler set.
///
/// `subscriber` is `None` when the event carried no id and no global
/// handler set was registered.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("no handler set registered for {}", target_name(.subscriber))]
pub struct RoutingError {
    pub subscriber: Option<SubscriberId>,
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

fn target_name(subscriber: &Option<SubscriberId>) -> String {
    match subscriber {
        Some(id) => format!("subscriber {id}"),
        None => "the global subscription".to_string(),
    }
}

/// Non-fatal errors surfaced by a running stream session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error(transparent)]
    Transport(#[from] TransportFailure),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Routing(#[from] RoutingError),
}

/// Invalid or unloadable connector configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to load configuration: {0:#}")]
    Load(#[from] anyhow::Error),
}

/// Errors returned synchronously at the connector's API boundary.
#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("command queue is closed")]
    QueueClosed,

    #[error("stream session is closed")]
    SessionClosed,

    #[error(transparent)]
    Config(#[from] ConfigError),
}
