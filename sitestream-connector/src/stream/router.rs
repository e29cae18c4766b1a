use crate::{
    error::{DecodeError, StreamError, TransportFailure},
    events::{DecodedEvent, EventDecoder, StreamEvent, SubscriberId},
    listener::{ErrorHandler, HandlerSet},
    stream::session::{Session, SessionState},
    table::SubscriberTable,
    transport::{LineStream, Request, Transport},
};
use futures::StreamExt;
use std::{panic::AssertUnwindSafe, sync::Arc, time::Duration};
use tokio::sync::watch;

/// Why a connected stream stopped being read.
enum Exit {
    Stopped,
    Failed(TransportFailure),
}

/// Everything the router task needs; consumed by [`StreamRouter::run`].
pub(crate) struct StreamRouter {
    pub(crate) request: Request,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) decoder: Arc<dyn EventDecoder>,
    pub(crate) table: Arc<SubscriberTable>,
    pub(crate) errors: Arc<dyn ErrorHandler>,
    pub(crate) session: Session,
    pub(crate) read_timeout: Duration,
}

/// Resolves once a stop has been requested or every session handle is gone.
async fn stop_requested(stop_rx: &mut watch::Receiver<bool>) {
    let _ = stop_rx.wait_for(|stop| *stop).await;
}

impl StreamRouter {
    /// Drives the session until it is stopped or fails unrecoverably.
    /// Transient failures, however many in a row, only ever reconnect.
    /// This is the only code that advances the session state.
    pub(crate) async fn run(mut self, mut stop_rx: watch::Receiver<bool>) {
        tracing::info!(operation = %self.request.operation, "Stream router started.");
        let mut failed_attempts: u32 = 0;

        loop {
            let opened = tokio::select! {
                biased;
                _ = stop_requested(&mut stop_rx) => break,
                opened = tokio::time::timeout(
                    self.read_timeout,
                    self.transport.open_stream(&self.request),
                ) => opened.unwrap_or_else(|_| {
                    Err(TransportFailure::timeout(format!(
                        "connect did not complete within {:?}",
                        self.read_timeout
                    )))
                }),
            };

            let failure = match opened {
                Ok(stream) => {
                    failed_attempts = 0;
                    self.session.opened();
                    match self.pump(stream, &mut stop_rx).await {
                        Exit::Stopped => break,
                        Exit::Failed(failure) => failure,
                    }
                }
                Err(failure) => {
                    failed_attempts = failed_attempts.saturating_add(1);
                    failure
                }
            };

            self.report_connection_failure(&failure);
            if failure.is_unrecoverable() {
                tracing::error!(error = %failure, "Unrecoverable stream failure, closing session.");
                break;
            }

            self.session.transition(SessionState::Reconnecting);
            let delay = self.session.backoff.next_delay();
            tracing::info!(
                delay_ms = delay.as_millis() as u64,
                failed_attempts,
                "Reconnecting after backoff."
            );
            tokio::select! {
                biased;
                _ = stop_requested(&mut stop_rx) => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!(state = %self.session.state(), "Stream router stopped.");
        // Dropping `self.session` publishes `Closed` and clears the table.
    }

    /// Reads lines until the connection fails, stalls, or a stop is requested.
    async fn pump(&mut self, mut stream: LineStream, stop_rx: &mut watch::Receiver<bool>) -> Exit {
        loop {
            let deadline = self.session.stall_deadline(self.read_timeout);
            let next = tokio::select! {
                biased;
                _ = stop_requested(stop_rx) => return Exit::Stopped,
                next = tokio::time::timeout_at(deadline, stream.next()) => next,
            };

            match next {
                Err(_) => {
                    return Exit::Failed(TransportFailure::timeout(format!(
                        "no data received for {:?}",
                        self.session.idle_for()
                    )))
                }
                Ok(None) => {
                    return Exit::Failed(TransportFailure::network("stream closed by the server"))
                }
                Ok(Some(Err(failure))) => return Exit::Failed(failure),
                Ok(Some(Ok(line))) => {
                    self.session.touch();
                    self.handle_line(&line);
                }
            }
        }
    }

    fn handle_line(&self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            tracing::trace!("Keep-alive received.");
            return;
        }

        let decoded = std::panic::catch_unwind(AssertUnwindSafe(|| self.decoder.decode(line)))
            .unwrap_or_else(|_| Err(DecodeError::new(line, "decoder panicked")));

        match decoded {
            Ok(DecodedEvent { subscriber, event }) => match self.table.lookup(subscriber.into()) {
                Ok(handlers) => self.deliver(&handlers, subscriber, &event),
                Err(e) => self.report(&StreamError::Routing(e)),
            },
            Err(e) => self.report(&StreamError::Decode(e)),
        }
    }

    fn deliver(&self, handlers: &HandlerSet, subscriber: Option<SubscriberId>, event: &StreamEvent) {
        tracing::trace!(subscriber = ?subscriber, kind = ?event.kind(), "Routing event");
        let delivered =
            std::panic::catch_unwind(AssertUnwindSafe(|| handlers.on_event(subscriber, event)));
        if delivered.is_err() {
            tracing::error!(subscriber = ?subscriber, kind = ?event.kind(), "Stream handler panicked");
        }
    }

    fn report(&self, error: &StreamError) {
        if std::panic::catch_unwind(AssertUnwindSafe(|| self.errors.on_error(error))).is_err() {
            tracing::error!(error = %error, "Stream error handler panicked");
        }
    }

    /// Delivers a connection failure to the error handler and to every
    /// registered handler set's exception callback.
    fn report_connection_failure(&self, failure: &TransportFailure) {
        let error = StreamError::Transport(failure.clone());
        self.report(&error);
        for (key, handlers) in self.table.handler_sets() {
            if std::panic::catch_unwind(AssertUnwindSafe(|| handlers.on_exception(&error))).is_err()
            {
                tracing::error!(subscriber = %key, "Stream exception handler panicked");
            }
        }
    }
}
