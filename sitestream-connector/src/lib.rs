//! An asynchronous client core for a social-network streaming API.
//!
//! This crate provides the two concurrent subsystems behind the client's
//! asynchronous and streaming surface. HTTP, authentication and payload
//! parsing stay outside, behind the [`transport::Transport`] and
//! [`events::EventDecoder`] traits.
//!
//! # Key Components
//!
//! *   [`Connector`]: The main entry point. It submits commands and starts
//!     stream sessions.
//! *   [`dispatcher`]: A worker pool that runs API calls in the background and
//!     reports each result to its completion callbacks exactly once.
//! *   [`stream`]: Stream sessions. One connection carries events for many
//!     subscribed accounts; the router demultiplexes them by subscriber id and
//!     reconnects with backoff when the connection fails.
//! *   [`table`]: The concurrent subscriber table shared by callers and the router.
//! *   [`listener`]: Handler-set traits and a channel-backed `EventListener`.

/// Defines configuration structures for the connector.
pub mod config;
mod connector;
/// The asynchronous command queue and its worker pool.
pub mod dispatcher;
/// Error types shared by the dispatcher and the stream router.
pub mod error;
/// Stream event types and the decoder boundary.
pub mod events;
pub mod listener;
pub mod stream;
pub mod table;
/// The network boundary consumed by the dispatcher and the router.
pub mod transport;

pub use connector::Connector;
pub use error::{ConnectorError, StreamError, TransportFailure};
pub use events::{StreamEvent, SubscriberId};
pub use listener::{listener_fn, EventListener, HandlerSet, StreamListener, Subscription};
pub use stream::{SessionHandle, SessionState, StreamRequest};
