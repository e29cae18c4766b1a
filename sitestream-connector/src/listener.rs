//! # Stream Listeners
//!
//! A subscriber's handler set is a single [`StreamListener`]: one
//! `on_event` entry point receiving the tagged [`StreamEvent`], plus a
//! connection-level `on_exception` callback. Adding an event kind is a change
//! to the enum and to the handlers that care about it, nothing else.
//!
//! Three ways to provide one:
//!
//! * implement [`StreamListener`] directly;
//! * wrap a closure with [`listener_fn`];
//! * use an [`EventListener`], which forwards into a channel and exposes an
//!   async `next_event()`. It unsubscribes itself when dropped.

use crate::{
    error::StreamError,
    events::{StreamEvent, SubscriberId},
    table::{Registration, SubscriberKey, SubscriberTable},
};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Callbacks for the events of one subscription.
///
/// Called from the stream router's task. Implementations must not block;
/// hand long work off to another task.
pub trait StreamListener: Send + Sync {
    /// Invoked once per routed event. `subscriber` is the id the event was
    /// tagged with, `None` on a single-user stream.
    fn on_event(&self, subscriber: Option<SubscriberId>, event: &StreamEvent);

    /// Invoked when the underlying connection fails and the session starts
    /// reconnecting (or closes).
    fn on_exception(&self, _error: &StreamError) {}
}

/// The handler set registered for one subscriber.
pub type HandlerSet = Arc<dyn StreamListener>;

/// Receives session-level errors: malformed lines, events for unknown
/// subscribers, and connection failures.
pub trait ErrorHandler: Send + Sync {
    fn on_error(&self, error: &StreamError);
}

/// The default [`ErrorHandler`], which records every error through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogErrors;

impl ErrorHandler for LogErrors {
    fn on_error(&self, error: &StreamError) {
        match error {
            StreamError::Transport(e) => tracing::warn!(error = %e, "Stream connection failed"),
            StreamError::Decode(e) => {
                tracing::warn!(error = %e, line = %e.line, "Skipping undecodable stream line")
            }
            StreamError::Routing(e) => tracing::warn!(error = %e, "Dropping unroutable event"),
        }
    }
}

impl<F> ErrorHandler for F
where
    F: Fn(&StreamError) + Send + Sync,
{
    fn on_error(&self, error: &StreamError) {
        self(error)
    }
}

struct FnListener<F>(F);

impl<F> StreamListener for FnListener<F>
where
    F: Fn(Option<SubscriberId>, &StreamEvent) + Send + Sync,
{
    fn on_event(&self, subscriber: Option<SubscriberId>, event: &StreamEvent) {
        (self.0)(subscriber, event)
    }
}

/// Wraps a closure as a [`HandlerSet`] that ignores connection exceptions.
pub fn listener_fn<F>(f: F) -> HandlerSet
where
    F: Fn(Option<SubscriberId>, &StreamEvent) + Send + Sync + 'static,
{
    Arc::new(FnListener(f))
}

/// A handle to one registered handler set.
///
/// Dropping it unsubscribes; call [`Subscription::detach`] to keep the
/// handler set registered until the session closes.
#[must_use = "dropping a Subscription unsubscribes it"]
#[derive(Debug)]
pub struct Subscription {
    /// This is an `Option` so manual unsubscription can take it.
    inner: Option<(Registration, Arc<SubscriberTable>)>,
}

impl Subscription {
    pub(crate) fn new(registration: Registration, table: Arc<SubscriberTable>) -> Self {
        Self {
            inner: Some((registration, table)),
        }
    }

    pub fn key(&self) -> Option<SubscriberKey> {
        self.inner.as_ref().map(|(registration, _)| registration.key)
    }

    /// Removes the handler set. A later registration for the same subscriber
    /// made through another handle is left untouched.
    pub fn unsubscribe(mut self) {
        if let Some((registration, table)) = self.inner.take() {
            tracing::debug!(subscriber = %registration.key, "Manual unsubscribe");
            table.unregister_registration(&registration);
        }
    }

    /// Leaves the handler set registered for the rest of the session.
    pub fn detach(mut self) {
        self.inner.take();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some((registration, table)) = self.inner.take() {
            tracing::debug!(subscriber = %registration.key, "Automatic unsubscribe (on drop)");
            table.unregister_registration(&registration);
        }
    }
}

/// An event as delivered to an [`EventListener`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedEvent {
    pub subscriber: Option<SubscriberId>,
    pub event: StreamEvent,
}

struct ChannelListener {
    events: mpsc::Sender<RoutedEvent>,
    exceptions: mpsc::Sender<StreamError>,
}

impl StreamListener for ChannelListener {
    fn on_event(&self, subscriber: Option<SubscriberId>, event: &StreamEvent) {
        let routed = RoutedEvent {
            subscriber,
            event: event.clone(),
        };
        if let Err(mpsc::error::TrySendError::Full(routed)) = self.events.try_send(routed) {
            tracing::warn!(
                subscriber = ?routed.subscriber,
                kind = ?routed.event.kind(),
                "Listener buffer full, event not delivered"
            );
        }
    }

    fn on_exception(&self, error: &StreamError) {
        // Exceptions are advisory; a full buffer already holds newer ones.
        let _ = self.exceptions.try_send(error.clone());
    }
}

/// A channel-backed listener for one subscriber.
///
/// It registers itself in the session's subscriber table and provides
/// separate receivers for routed events and connection exceptions. Dropping
/// it unsubscribes.
#[derive(Debug)]
pub struct EventListener {
    events_rx: mpsc::Receiver<RoutedEvent>,
    exceptions_rx: mpsc::Receiver<StreamError>,
    subscription: Subscription,
}

impl EventListener {
    pub(crate) fn new(
        key: SubscriberKey,
        table: Arc<SubscriberTable>,
        channel_capacity: usize,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(channel_capacity);
        let (exceptions_tx, exceptions_rx) = mpsc::channel(channel_capacity);
        let handlers: HandlerSet = Arc::new(ChannelListener {
            events: events_tx,
            exceptions: exceptions_tx,
        });
        let registration = table.register(key, handlers);

        Self {
            events_rx,
            exceptions_rx,
            subscription: Subscription::new(registration, table),
        }
    }

    /// Receives the next routed event. Returns `None` once the listener has
    /// been replaced or the session has closed and the buffer is drained.
    pub async fn next_event(&mut self) -> Option<RoutedEvent> {
        self.events_rx.recv().await
    }

    /// Receives the next connection exception.
    pub async fn next_exception(&mut self) -> Option<StreamError> {
        self.exceptions_rx.recv().await
    }

    /// Manually unsubscribes, consuming the listener.
    pub fn unsubscribe(self) {
        self.subscription.unsubscribe();
    }
}
