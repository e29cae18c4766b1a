use crate::{
    config::ConnectorConfig,
    dispatcher::{Dispatcher, DispatcherHandle},
    error::{ConnectorError, TransportFailure},
    events::EventDecoder,
    listener::{ErrorHandler, LogErrors},
    stream::{SessionHandle, StreamRequest},
    transport::{CommandResult, Request, Response, Transport},
};
use std::sync::Arc;
use tokio::sync::oneshot;

/// The caller-facing entry point of the library.
///
/// A `Connector` owns the command dispatcher and starts stream sessions. It is
/// cheap to clone; every clone drives the same worker pool.
#[derive(Clone)]
pub struct Connector {
    config: Arc<ConnectorConfig>,
    transport: Arc<dyn Transport>,
    decoder: Arc<dyn EventDecoder>,
    dispatcher: DispatcherHandle,
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("config", &self.config)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl Connector {
    /// Validates `config` and starts the dispatcher's workers.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: ConnectorConfig,
        transport: Arc<dyn Transport>,
        decoder: Arc<dyn EventDecoder>,
    ) -> Result<Self, ConnectorError> {
        config.validate()?;
        let dispatcher = Dispatcher::spawn(&config, transport.clone());
        Ok(Self {
            config: Arc::new(config),
            transport,
            decoder,
            dispatcher,
        })
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &DispatcherHandle {
        &self.dispatcher
    }

    /// Fires `operation` without blocking. Exactly one of `on_success` and
    /// `on_failure` is invoked, once, on a dispatcher worker.
    pub fn submit_async<P, K, V, S, F>(
        &self,
        operation: &str,
        params: P,
        on_success: S,
        on_failure: F,
    ) -> Result<(), ConnectorError>
    where
        P: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
        S: FnOnce(Response) + Send + 'static,
        F: FnOnce(TransportFailure) + Send + 'static,
    {
        self.dispatcher
            .submit_async(build_request(operation, params), on_success, on_failure)
    }

    /// Fires `operation` and returns a receiver that resolves with its result.
    pub fn call<P, K, V>(
        &self,
        operation: &str,
        params: P,
    ) -> Result<oneshot::Receiver<CommandResult>, ConnectorError>
    where
        P: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.dispatcher.call(build_request(operation, params))
    }

    /// Opens a stream session whose errors are logged through `tracing`.
    pub fn start_stream(&self, request: StreamRequest) -> SessionHandle {
        self.start_stream_with(request, Arc::new(LogErrors))
    }

    /// Opens a stream session reporting decode, routing and connection
    /// errors to `errors`.
    pub fn start_stream_with(
        &self,
        request: StreamRequest,
        errors: Arc<dyn ErrorHandler>,
    ) -> SessionHandle {
        SessionHandle::spawn(
            &self.config,
            &request,
            self.transport.clone(),
            self.decoder.clone(),
            errors,
        )
    }

    /// Stops accepting commands and waits for queued ones to complete.
    pub async fn close(&self) {
        self.dispatcher.close().await;
    }
}

fn build_request<P, K, V>(operation: &str, params: P) -> Request
where
    P: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    params
        .into_iter()
        .fold(Request::new(operation), |request, (key, value)| {
            request.param(key, value)
        })
}
