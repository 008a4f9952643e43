//! Connection registry: which live connection each user is bound to.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use talknest_common::id::{prefix, PrefixedId};

use super::events::OutboundEvent;
use super::outbox::{DeliveryError, Outbox};

/// One live transport connection and its outbound queue.
pub struct ConnectionHandle {
    /// `conn_` prefixed ULID.
    pub id: String,
    /// The user this connection was opened for.
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    outbox: Outbox,
    superseded: AtomicBool,
}

impl PrefixedId for ConnectionHandle {
    const PREFIX: &'static str = prefix::CONNECTION;
}

impl ConnectionHandle {
    pub fn new(user_id: &str, outbox_capacity: usize) -> Self {
        Self {
            id: Self::generate(),
            user_id: user_id.to_string(),
            created_at: Utc::now(),
            outbox: Outbox::new(outbox_capacity),
            superseded: AtomicBool::new(false),
        }
    }

    /// Queue an event for this connection without blocking.
    pub fn deliver(&self, event: Arc<OutboundEvent>) -> Result<(), DeliveryError> {
        self.outbox.push(event)
    }

    /// Stop accepting events. The transport task drains what is queued and
    /// then closes the socket.
    pub fn close(&self) {
        self.outbox.close();
    }

    pub fn is_closed(&self) -> bool {
        self.outbox.is_closed()
    }

    /// Record that a newer connection replaced this one. Set before the
    /// outbox is closed so the transport picks the right close code even
    /// when the `Superseded` notice itself could not be queued.
    pub fn mark_superseded(&self) {
        self.superseded.store(true, Ordering::Release);
    }

    pub fn is_superseded(&self) -> bool {
        self.superseded.load(Ordering::Acquire)
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }
}

/// Shared registry of bound connections.
///
/// Two `DashMap`s: user → handle, and the reverse connection → user index
/// used by `unregister`. Guards are never held across calls.
pub struct ConnectionRegistry {
    by_user: DashMap<String, Arc<ConnectionHandle>>,
    by_connection: DashMap<String, String>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            by_user: DashMap::new(),
            by_connection: DashMap::new(),
        }
    }

    /// Bind `handle` to its user. Returns the connection it superseded, if
    /// any; the caller is responsible for closing it.
    pub fn register(&self, handle: Arc<ConnectionHandle>) -> Option<Arc<ConnectionHandle>> {
        self.by_connection
            .insert(handle.id.clone(), handle.user_id.clone());
        let previous = self.by_user.insert(handle.user_id.clone(), handle)?;
        self.by_connection.remove(&previous.id);
        Some(previous)
    }

    /// Clear the binding owned by `connection_id`.
    ///
    /// Returns the handle only if it was still the user's current binding.
    /// Unknown or superseded connections are a no-op.
    pub fn unregister(&self, connection_id: &str) -> Option<Arc<ConnectionHandle>> {
        let (_, user_id) = self.by_connection.remove(connection_id)?;
        self.by_user
            .remove_if(&user_id, |_, current| current.id == connection_id)
            .map(|(_, handle)| handle)
    }

    pub fn lookup(&self, user_id: &str) -> Option<Arc<ConnectionHandle>> {
        self.by_user.get(user_id).map(|entry| entry.value().clone())
    }

    /// Owning user of a connection, if it is still registered.
    pub fn owner_of(&self, connection_id: &str) -> Option<String> {
        self.by_connection
            .get(connection_id)
            .map(|entry| entry.value().clone())
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.by_user.contains_key(user_id)
    }

    /// Clone out every bound connection for a global fan-out.
    pub fn snapshot(&self) -> Vec<Arc<ConnectionHandle>> {
        self.by_user.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.by_user.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_user.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
