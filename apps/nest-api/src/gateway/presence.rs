//! In-memory per-user presence: connection, last-known location, mood,
//! availability.
//!
//! Presence survives disconnects so "last seen" location and mood stay
//! queryable; only the connection id is cleared. Entries are created on
//! first connect or lazily on the first location/mood update.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use talknest_common::GeoPoint;
use utoipa::ToSchema;

use crate::matching::mood::MoodProfile;

/// A location and when it was reported.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct LocationFix {
    pub point: GeoPoint,
    pub updated_at: DateTime<Utc>,
}

/// Live state for one user.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct UserPresence {
    pub user_id: String,
    /// Bound connection; `None` means offline.
    pub connection_id: Option<String>,
    pub location: Option<LocationFix>,
    pub mood: Option<MoodProfile>,
    /// Accepting support requests.
    pub available: bool,
    pub last_active: DateTime<Utc>,
}

impl UserPresence {
    fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            connection_id: None,
            location: None,
            mood: None,
            available: true,
            last_active: Utc::now(),
        }
    }

    pub fn is_online(&self) -> bool {
        self.connection_id.is_some()
    }

    /// Online, available, and located: eligible for proximity search.
    pub fn is_discoverable(&self) -> bool {
        self.is_online() && self.available && self.location.is_some()
    }
}

/// Thread-safe, DashMap-backed presence table.
pub struct PresenceRegistry {
    inner: DashMap<String, UserPresence>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }

    /// Bind a connection. Returns the updated presence.
    pub fn set_online(&self, user_id: &str, connection_id: &str) -> UserPresence {
        self.update(user_id, |p| {
            p.connection_id = Some(connection_id.to_string());
        })
    }

    /// Clear the connection if it is still `connection_id`. Returns `false`
    /// for unknown users and stale connections.
    pub fn set_offline(&self, user_id: &str, connection_id: &str) -> bool {
        let Some(mut entry) = self.inner.get_mut(user_id) else {
            return false;
        };
        if entry.connection_id.as_deref() != Some(connection_id) {
            return false;
        }
        entry.connection_id = None;
        entry.last_active = Utc::now();
        true
    }

    /// Last-write-wins location update.
    pub fn update_location(&self, user_id: &str, point: GeoPoint) -> UserPresence {
        self.update(user_id, |p| {
            p.location = Some(LocationFix {
                point,
                updated_at: Utc::now(),
            });
        })
    }

    pub fn update_mood(&self, user_id: &str, mood: MoodProfile) -> UserPresence {
        self.update(user_id, |p| p.mood = Some(mood))
    }

    /// Toggle availability. Returns `None` for users never seen before.
    pub fn set_available(&self, user_id: &str, available: bool) -> Option<UserPresence> {
        let mut entry = self.inner.get_mut(user_id)?;
        entry.available = available;
        entry.last_active = Utc::now();
        Some(entry.value().clone())
    }

    pub fn get(&self, user_id: &str) -> Option<UserPresence> {
        self.inner.get(user_id).map(|entry| entry.value().clone())
    }

    #[cfg(test)]
    pub fn is_discoverable(&self, user_id: &str) -> bool {
        self.inner
            .get(user_id)
            .is_some_and(|entry| entry.is_discoverable())
    }

    /// Remove offline entries idle for longer than `retention`. Returns the
    /// number removed.
    pub fn prune_offline(&self, retention: Duration) -> usize {
        let Ok(retention) = chrono::Duration::from_std(retention) else {
            return 0;
        };
        let cutoff = Utc::now() - retention;
        let before = self.inner.len();
        self.inner
            .retain(|_, p| p.is_online() || p.last_active > cutoff);
        before.saturating_sub(self.inner.len())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn update(&self, user_id: &str, apply: impl FnOnce(&mut UserPresence)) -> UserPresence {
        let mut entry = self
            .inner
            .entry(user_id.to_string())
            .or_insert_with(|| UserPresence::new(user_id));
        apply(entry.value_mut());
        entry.last_active = Utc::now();
        entry.value().clone()
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
