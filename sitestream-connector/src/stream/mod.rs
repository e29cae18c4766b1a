//! # Stream Sessions
//!
//! A session owns one long-lived streaming connection and the task that
//! reads it.
//!
//! ## Core Components
//!
//! - [`SessionHandle`]: the clonable, caller-facing handle. It registers
//!   subscribers, reports the session state, and stops the session.
//! - `StreamRouter` (private): the task bound to the session. It reads one
//!   line at a time, decodes it, looks the subscriber up in the session's
//!   [`SubscriberTable`](crate::table::SubscriberTable), and invokes the
//!   matching handler set. On failure it reconnects with a doubling backoff.
//! - [`SessionState`] and [`Backoff`]: the state machine and delay policy.
//!
//! Malformed lines and events for unknown subscribers are reported to the
//! session's [`ErrorHandler`] and never end the session. Only an explicit
//! stop or an unauthorized response does. A connect that does not complete
//! within the read timeout counts as a failed attempt.

mod router;
mod session;

pub use session::{Backoff, SessionState};

use crate::{
    config::{ConnectorConfig, Endpoints},
    error::ConnectorError,
    events::{EventDecoder, SubscriberId},
    listener::{ErrorHandler, EventListener, HandlerSet, Subscription},
    table::{SubscriberKey, SubscriberTable},
    transport::{Request, Transport},
};
use router::StreamRouter;
use session::Session;
use std::sync::Arc;
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
};

/// Which stream to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamRequest {
    /// A multiplexed stream carrying events for every account in `follow`,
    /// each tagged with the account's [`SubscriberId`].
    Site {
        follow: Vec<SubscriberId>,
        /// Also deliver events about the followings of each account.
        with_followings: bool,
    },
    /// A single-user stream; events carry no subscriber id and go to the
    /// global handler set.
    User {
        /// Receive all replies, not only those between mutual followings.
        replies_all: bool,
    },
}

impl StreamRequest {
    pub fn site(follow: impl IntoIterator<Item = SubscriberId>) -> Self {
        StreamRequest::Site {
            follow: follow.into_iter().collect(),
            with_followings: true,
        }
    }

    pub fn user() -> Self {
        StreamRequest::User { replies_all: false }
    }

    /// Builds the transport request descriptor for this stream.
    pub fn to_request(&self, endpoints: &Endpoints) -> Request {
        match self {
            StreamRequest::Site {
                follow,
                with_followings,
            } => {
                let follow = follow
                    .iter()
                    .map(SubscriberId::to_string)
                    .collect::<Vec<_>>()
                    .join(",");
                let with = if *with_followings { "followings" } else { "user" };
                Request::new("site.json")
                    .with_base_url(endpoints.site_stream_base_url.clone())
                    .param("follow", follow)
                    .param("with", with)
            }
            StreamRequest::User { replies_all } => {
                let request = Request::new("user.json")
                    .with_base_url(endpoints.user_stream_base_url.clone());
                if *replies_all {
                    request.param("replies", "all")
                } else {
                    request
                }
            }
        }
    }
}

/// A clonable handle to a running stream session.
///
/// The session task lives until [`SessionHandle::stop`] is called, the
/// connection fails unrecoverably, or every handle has been dropped.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    table: Arc<SubscriberTable>,
    state_rx: watch::Receiver<SessionState>,
    stop_tx: Arc<watch::Sender<bool>>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
    listener_buffer: usize,
}

impl SessionHandle {
    /// Spawns the router task for `request`. Must be called from within a
    /// tokio runtime.
    pub(crate) fn spawn(
        config: &ConnectorConfig,
        request: &StreamRequest,
        transport: Arc<dyn Transport>,
        decoder: Arc<dyn EventDecoder>,
        errors: Arc<dyn ErrorHandler>,
    ) -> Self {
        let table = Arc::new(SubscriberTable::new());
        let (state_tx, state_rx) = watch::channel(SessionState::Connecting);
        let (stop_tx, stop_rx) = watch::channel(false);
        let streaming = &config.streaming;

        let router = StreamRouter {
            request: request.to_request(&config.endpoints),
            transport,
            decoder,
            table: table.clone(),
            errors,
            session: Session::new(
                state_tx,
                Backoff::new(streaming.retry_interval(), streaming.max_retry_interval()),
                table.clone(),
            ),
            read_timeout: streaming.read_timeout(),
        };
        let task = tokio::spawn(router.run(stop_rx));

        Self {
            table,
            state_rx,
            stop_tx: Arc::new(stop_tx),
            task: Arc::new(Mutex::new(Some(task))),
            listener_buffer: streaming.listener_buffer,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }

    /// Waits until the session reaches `target`. Fails with `SessionClosed`
    /// if the session closes first.
    pub async fn wait_for_state(&self, target: SessionState) -> Result<(), ConnectorError> {
        let mut state_rx = self.state_rx.clone();
        let reached = state_rx
            .wait_for(|state| *state == target || *state == SessionState::Closed)
            .await
            .map(|state| *state == target)
            .unwrap_or(target == SessionState::Closed);
        if reached {
            Ok(())
        } else {
            Err(ConnectorError::SessionClosed)
        }
    }

    /// Registers `handlers` for `subscriber`, or for the global slot when
    /// `None`. Replaces any handler set already registered for that key.
    pub fn subscribe(
        &self,
        subscriber: Option<SubscriberId>,
        handlers: HandlerSet,
    ) -> Result<Subscription, ConnectorError> {
        let key = SubscriberKey::from(subscriber);
        if self.is_closed() {
            return Err(ConnectorError::SessionClosed);
        }
        let registration = self.table.register(key, handlers);
        let subscription = Subscription::new(registration, self.table.clone());
        // The session may have closed (and cleared the table) in between.
        if self.is_closed() {
            subscription.unsubscribe();
            return Err(ConnectorError::SessionClosed);
        }
        Ok(subscription)
    }

    /// Creates a channel-backed listener for `subscriber`.
    pub fn listen(&self, subscriber: Option<SubscriberId>) -> Result<EventListener, ConnectorError> {
        if self.is_closed() {
            return Err(ConnectorError::SessionClosed);
        }
        let listener = EventListener::new(
            SubscriberKey::from(subscriber),
            self.table.clone(),
            self.listener_buffer,
        );
        if self.is_closed() {
            listener.unsubscribe();
            return Err(ConnectorError::SessionClosed);
        }
        Ok(listener)
    }

    /// Removes whatever handler set is registered for `subscriber`.
    pub fn unsubscribe(&self, subscriber: Option<SubscriberId>) -> bool {
        self.table.unregister(SubscriberKey::from(subscriber))
    }

    pub fn subscriber_count(&self) -> usize {
        self.table.len()
    }

    /// Stops the session: unblocks any pending read, connect, or backoff
    /// wait, and returns once the session is `Closed`. Idempotent.
    pub async fn stop(&self) {
        self.stop_tx.send_replace(true);
        let mut task = self.task.lock().await;
        if let Some(handle) = task.take() {
            if let Err(e) = handle.await {
                tracing::error!("Stream router task exited abnormally: {}", e);
            }
        }
    }
}
