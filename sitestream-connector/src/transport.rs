//! # Transport Boundary
//!
//! The connector never speaks HTTP itself. Everything that touches the network
//! goes through the [`Transport`] trait, which an application implements on top
//! of its HTTP client of choice (and which tests implement in memory).
//!
//! - [`Transport::invoke`] performs one request/response call. The dispatcher's
//!   workers await it; from a worker's point of view the call is synchronous.
//! - [`Transport::open_stream`] opens a long-lived connection and returns it as
//!   a [`LineStream`]. Dropping the stream closes the connection.

use crate::error::TransportFailure;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::BTreeMap;
use tokio::io::AsyncBufRead;
use tokio_stream::{wrappers::LinesStream, StreamExt};

/// An opaque request descriptor handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Request {
    /// Operation id, e.g. `"statuses/update"`.
    pub operation: String,
    /// Base URL the operation is resolved against. Left empty by callers of
    /// the dispatcher, which fills in the configured REST base URL.
    pub base_url: String,
    pub params: BTreeMap<String, String>,
}

impl Request {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// The raw payload of a successful call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }
}

/// The outcome of one command, delivered to exactly one completion handler.
pub type CommandResult = Result<Response, TransportFailure>;

/// A live streaming connection, yielding one item per received line.
///
/// `None` means the server closed the connection.
pub type LineStream = BoxStream<'static, Result<String, TransportFailure>>;

/// The network collaborator used by both the dispatcher and the stream router.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs a single request/response call.
    async fn invoke(&self, request: &Request) -> CommandResult;

    /// Opens a long-lived line-oriented connection.
    async fn open_stream(&self, request: &Request) -> Result<LineStream, TransportFailure>;
}

/// Adapts any buffered async reader (an HTTP body, a socket, a file) into a
/// [`LineStream`]. I/O errors are reported as network failures.
pub fn lines_from_reader<R>(reader: R) -> LineStream
where
    R: AsyncBufRead + Send + Unpin + 'static,
{
    use tokio::io::AsyncBufReadExt;

    Box::pin(
        LinesStream::new(reader.lines())
            .map(|line| line.map_err(|e| TransportFailure::network(e.to_string()))),
    )
}
