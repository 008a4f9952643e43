//! Room membership: which users receive a conversation's events.

use std::collections::HashSet;

use dashmap::DashMap;

/// Room id → member set, with a user → rooms reverse index so disconnect
/// cleanup does not scan every room.
///
/// Membership is a set; joining twice has no further effect. Rooms are
/// dropped when their last member leaves.
pub struct RoomMembership {
    rooms: DashMap<String, HashSet<String>>,
    by_user: DashMap<String, HashSet<String>>,
}

impl RoomMembership {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            by_user: DashMap::new(),
        }
    }

    /// Add `user_id` to `room_id`. Returns `false` if it was already a member.
    pub fn join(&self, room_id: &str, user_id: &str) -> bool {
        let added = self
            .rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(user_id.to_string());
        self.by_user
            .entry(user_id.to_string())
            .or_default()
            .insert(room_id.to_string());
        added
    }

    /// Remove `user_id` from `room_id`. Returns `false` if it was not a member.
    pub fn leave(&self, room_id: &str, user_id: &str) -> bool {
        let removed = self.remove_member(room_id, user_id);
        if let Some(mut rooms) = self.by_user.get_mut(user_id) {
            rooms.remove(room_id);
        }
        self.by_user.remove_if(user_id, |_, rooms| rooms.is_empty());
        removed
    }

    /// Remove `user_id` from every room it joined. Returns the rooms left.
    pub fn leave_all(&self, user_id: &str) -> Vec<String> {
        let Some((_, rooms)) = self.by_user.remove(user_id) else {
            return Vec::new();
        };
        rooms
            .into_iter()
            .filter(|room_id| self.remove_member(room_id, user_id))
            .collect()
    }

    /// Current members; empty for an unknown room.
    pub fn members_of(&self, room_id: &str) -> HashSet<String> {
        self.rooms
            .get(room_id)
            .map(|members| members.value().clone())
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub fn rooms_of(&self, user_id: &str) -> HashSet<String> {
        self.by_user
            .get(user_id)
            .map(|rooms| rooms.value().clone())
            .unwrap_or_default()
    }

    pub fn is_member(&self, room_id: &str, user_id: &str) -> bool {
        self.rooms
            .get(room_id)
            .is_some_and(|members| members.contains(user_id))
    }

    pub fn room_exists(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    #[cfg(test)]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    fn remove_member(&self, room_id: &str, user_id: &str) -> bool {
        let removed = match self.rooms.get_mut(room_id) {
            Some(mut members) => members.remove(user_id),
            None => false,
        };
        self.rooms.remove_if(room_id, |_, members| members.is_empty());
        removed
    }
}

impl Default for RoomMembership {
    fn default() -> Self {
        Self::new()
    }
}
