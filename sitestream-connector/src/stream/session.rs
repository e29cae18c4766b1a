use crate::table::SubscriberTable;
use std::{fmt, sync::Arc, time::Duration};
use tokio::{sync::watch, time::Instant};

/// Lifecycle of a streaming connection.
///
/// `Connecting -> Open -> (Reconnecting -> Open)* -> Closed`. `Closed` is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Reconnecting,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Connecting => "connecting",
            SessionState::Open => "open",
            SessionState::Reconnecting => "reconnecting",
            SessionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Doubling reconnect delay, starting at a seed and capped at a maximum.
#[derive(Debug, Clone)]
pub struct Backoff {
    seed: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(seed: Duration, max: Duration) -> Self {
        let max = max.max(seed);
        Self {
            seed,
            max,
            current: seed,
        }
    }

    /// Returns the delay to wait now and doubles the next one, up to the cap.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    /// The delay the next failure will wait.
    pub fn peek(&self) -> Duration {
        self.current
    }

    pub fn reset(&mut self) {
        self.current = self.seed;
    }
}

/// The router's private view of the connection.
///
/// The state is published through a `watch` channel whose only sender lives
/// here. Dropping the session publishes `Closed` and empties the subscriber
/// table, even if the router task unwinds.
pub(crate) struct Session {
    state_tx: watch::Sender<SessionState>,
    pub(crate) backoff: Backoff,
    last_read: Instant,
    table: Arc<SubscriberTable>,
}

impl Session {
    pub(crate) fn new(
        state_tx: watch::Sender<SessionState>,
        backoff: Backoff,
        table: Arc<SubscriberTable>,
    ) -> Self {
        Self {
            state_tx,
            backoff,
            last_read: Instant::now(),
            table,
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    pub(crate) fn transition(&mut self, to: SessionState) {
        let from = self.state_tx.send_replace(to);
        if from != to {
            tracing::info!(%from, %to, "Stream session state changed");
        }
    }

    /// A connection was established: the session is `Open` and the backoff
    /// starts over from the seed.
    pub(crate) fn opened(&mut self) {
        self.backoff.reset();
        self.last_read = Instant::now();
        self.transition(SessionState::Open);
    }

    /// Records a successful read, keep-alives included.
    pub(crate) fn touch(&mut self) {
        self.last_read = Instant::now();
    }

    /// The instant after which a silent connection counts as stalled.
    pub(crate) fn stall_deadline(&self, read_timeout: Duration) -> Instant {
        self.last_read + read_timeout
    }

    pub(crate) fn idle_for(&self) -> Duration {
        self.last_read.elapsed()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.transition(SessionState::Closed);
        self.table.clear();
    }
}
