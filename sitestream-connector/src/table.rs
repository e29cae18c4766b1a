//! # Subscriber Table
//!
//! Maps a [`SubscriberKey`] to the [`HandlerSet`] that should receive its
//! events. It is the only structure shared between caller tasks (which
//! register and unregister) and the stream router (which looks up on every
//! event).
//!
//! Entries live in a sharded `DashMap`, so a registration only locks the
//! shard holding its own key. Handler sets are stored behind an `Arc` and
//! replaced whole, so a lookup observes either the old set or the new one,
//! never a mixture. No lock is held while a handler runs: `lookup` clones the
//! `Arc` out of the map.

use crate::{error::RoutingError, events::SubscriberId, listener::HandlerSet};
use dashmap::DashMap;
use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

/// Identifies a subscription slot inside a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriberKey {
    /// The implicit subscriber of a single-user stream; also receives events
    /// that carry no subscriber id on a multiplexed stream.
    Global,
    Account(SubscriberId),
}

impl From<Option<SubscriberId>> for SubscriberKey {
    fn from(id: Option<SubscriberId>) -> Self {
        match id {
            Some(id) => SubscriberKey::Account(id),
            None => SubscriberKey::Global,
        }
    }
}

impl SubscriberKey {
    pub fn subscriber(&self) -> Option<SubscriberId> {
        match self {
            SubscriberKey::Global => None,
            SubscriberKey::Account(id) => Some(*id),
        }
    }
}

impl fmt::Display for SubscriberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriberKey::Global => f.write_str("global"),
            SubscriberKey::Account(id) => write!(f, "{id}"),
        }
    }
}

/// Proof of one `register` call, used to unregister without clobbering a
/// later replacement for the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub key: SubscriberKey,
    generation: u64,
}

struct Entry {
    generation: u64,
    handlers: HandlerSet,
}

/// A concurrent map from subscriber to handler set.
pub struct SubscriberTable {
    entries: DashMap<SubscriberKey, Entry>,
    next_generation: AtomicU64,
}

impl Default for SubscriberTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SubscriberTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberTable")
            .field("subscribers", &self.entries.len())
            .finish()
    }
}

impl SubscriberTable {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Registers `handlers` for `key`, atomically replacing any existing set.
    pub fn register(&self, key: SubscriberKey, handlers: HandlerSet) -> Registration {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let replaced = self
            .entries
            .insert(key, Entry { generation, handlers })
            .is_some();
        if replaced {
            tracing::debug!(subscriber = %key, "Replaced handler set");
        } else {
            tracing::debug!(subscriber = %key, "Registered handler set");
        }
        Registration { key, generation }
    }

    /// Removes whatever is registered for `key`. Returns whether an entry existed.
    pub fn unregister(&self, key: SubscriberKey) -> bool {
        let removed = self.entries.remove(&key).is_some();
        if removed {
            tracing::debug!(subscriber = %key, "Unregistered handler set");
        }
        removed
    }

    /// Removes the entry only if it still belongs to `registration`.
    pub fn unregister_registration(&self, registration: &Registration) -> bool {
        let removed = self
            .entries
            .remove_if(&registration.key, |_, entry| {
                entry.generation == registration.generation
            })
            .is_some();
        if removed {
            tracing::debug!(subscriber = %registration.key, "Unregistered handler set");
        }
        removed
    }

    pub fn lookup(&self, key: SubscriberKey) -> Result<HandlerSet, RoutingError> {
        self.entries
            .get(&key)
            .map(|entry| entry.handlers.clone())
            .ok_or(RoutingError {
                subscriber: key.subscriber(),
            })
    }

    pub fn contains(&self, key: SubscriberKey) -> bool {
        self.entries.contains_key(&key)
    }

    /// Snapshot of every registered handler set, for broadcasting
    /// connection-level exceptions.
    pub fn handler_sets(&self) -> Vec<(SubscriberKey, HandlerSet)> {
        self.entries
            .iter()
            .map(|entry| (*entry.key(), entry.value().handlers.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
