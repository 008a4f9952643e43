//! Per-room sequencing and non-blocking fan-out delivery.
//!
//! Each room owns a sequence counter behind its own mutex. Holding that
//! mutex for the whole fan-out makes delivery order within a room equal to
//! processing order; rooms never wait on each other.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use super::events::OutboundEvent;
use super::outbox::DeliveryError;
use super::registry::ConnectionHandle;

/// Room id → room-local sequence counter.
pub struct RoomSequencer {
    rooms: DashMap<String, Arc<Mutex<u64>>>,
}

impl RoomSequencer {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    /// The counter for `room_id`, created at zero on first use. Lock it for
    /// the duration of a fan-out.
    pub fn counter(&self, room_id: &str) -> Arc<Mutex<u64>> {
        self.rooms
            .entry(room_id.to_string())
            .or_default()
            .value()
            .clone()
    }

    /// Last sequence number issued for `room_id` (0 if none).
    #[cfg(test)]
    pub fn current(&self, room_id: &str) -> u64 {
        self.rooms
            .get(room_id)
            .map(|counter| *counter.value().lock())
            .unwrap_or(0)
    }

    /// Drop the counter for a room nobody is sending to. A counter still held
    /// by an in-flight fan-out is kept.
    pub fn forget(&self, room_id: &str) {
        self.rooms
            .remove_if(room_id, |_, counter| Arc::strong_count(counter) == 1);
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

impl Default for RoomSequencer {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of pushing one event to many connections.
#[derive(Default)]
pub struct FanoutOutcome {
    pub delivered: usize,
    /// Connections that refused the event and must be torn down.
    pub failed: Vec<(Arc<ConnectionHandle>, DeliveryError)>,
}

/// Queue `event` on every target without awaiting any socket.
pub fn deliver_all<I>(targets: I, event: &Arc<OutboundEvent>) -> FanoutOutcome
where
    I: IntoIterator<Item = Arc<ConnectionHandle>>,
{
    let mut outcome = FanoutOutcome::default();
    for handle in targets {
        match handle.deliver(event.clone()) {
            Ok(()) => outcome.delivered += 1,
            Err(e) => outcome.failed.push((handle, e)),
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn counters_are_per_room() {
        let seq = RoomSequencer::new();
        *seq.counter("a").lock() += 1;
        *seq.counter("a").lock() += 1;
        *seq.counter("b").lock() += 1;

        assert_eq!(seq.current("a"), 2);
        assert_eq!(seq.current("b"), 1);
        assert_eq!(seq.current("c"), 0);
    }

    #[test]
    fn forget_keeps_counters_in_use() {
        let seq = RoomSequencer::new();
        let held = seq.counter("a");
        seq.forget("a");
        assert_eq!(seq.len(), 1);

        drop(held);
        seq.forget("a");
        assert!(seq.is_empty());
    }

    #[test]
    fn deliver_all_reports_failures() {
        let open = Arc::new(ConnectionHandle::new("u1", 4));
        let closed = Arc::new(ConnectionHandle::new("u2", 4));
        closed.close();

        let event = Arc::new(OutboundEvent::NewMessage {
            room_id: "r".to_string(),
            seq: 1,
            sender_id: "u0".to_string(),
            message: json!("hi"),
        });
        let outcome = deliver_all(vec![open.clone(), closed.clone()], &event);

        assert_eq!(outcome.delivered, 1);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].0.id, closed.id);
        assert_eq!(outcome.failed[0].1, DeliveryError::Closed);
        assert_eq!(open.outbox().len(), 1);
    }
}
