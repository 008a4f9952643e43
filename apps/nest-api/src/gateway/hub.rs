//! The hub: routes inbound events to rooms, presence and the proximity index,
//! and fans outbound events out to connection outboxes.
//!
//! Mutations go through fine-grained maps instead of a global lock. Map
//! guards are dropped before the next map is touched. Two kinds of mutex
//! span several maps: a room's sequencer is held across that room's
//! fan-out, and a user's session lock is held across that user's join or
//! teardown. Neither is taken while the other is held, and failed
//! deliveries are reaped only after both are released.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use talknest_common::GeoPoint;

use crate::config::Config;
use crate::matching::mood::MoodProfile;
use crate::proximity::ProximityIndex;

use super::events::{InboundEvent, OutboundEvent};
use super::fanout::{deliver_all, FanoutOutcome, RoomSequencer};
use super::outbox::DeliveryError;
use super::presence::{PresenceRegistry, UserPresence};
use super::registry::{ConnectionHandle, ConnectionRegistry};
use super::rooms::RoomMembership;

pub struct Hub {
    config: Arc<Config>,
    registry: ConnectionRegistry,
    rooms: RoomMembership,
    presence: PresenceRegistry,
    proximity: ProximityIndex,
    sequencer: RoomSequencer,
    /// User id → lock serializing that user's join and teardown.
    sessions: DashMap<String, Arc<Mutex<()>>>,
}

impl Hub {
    pub fn new(config: Arc<Config>) -> Self {
        let proximity = ProximityIndex::new(config.proximity_cell_degrees);
        Self {
            config,
            registry: ConnectionRegistry::new(),
            rooms: RoomMembership::new(),
            presence: PresenceRegistry::new(),
            proximity,
            sequencer: RoomSequencer::new(),
            sessions: DashMap::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn rooms(&self) -> &RoomMembership {
        &self.rooms
    }

    pub fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    pub fn proximity(&self) -> &ProximityIndex {
        &self.proximity
    }

    /// Open a connection for `user_id`.
    ///
    /// A previous connection for the same user receives `Superseded` and is
    /// closed. The new connection's outbox starts with `Ready`, and every
    /// other connection is told the user came online.
    pub fn join(&self, user_id: &str) -> Arc<ConnectionHandle> {
        let handle = Arc::new(ConnectionHandle::new(user_id, self.config.outbox_capacity));

        let announced = {
            let session = self.session(user_id);
            let _guard = session.lock();

            if let Some(previous) = self.registry.register(handle.clone()) {
                previous.mark_superseded();
                let superseded = previous.deliver(Arc::new(OutboundEvent::Superseded {
                    reason: "Signed in from another connection".to_string(),
                }));
                if let Err(e) = superseded {
                    tracing::debug!(connection_id = %previous.id, error = %e, "superseded notice not queued");
                }
                previous.close();
                tracing::info!(
                    user_id = %user_id,
                    connection_id = %previous.id,
                    "connection superseded"
                );
            }

            let presence = self.presence.set_online(user_id, &handle.id);
            self.refresh_index(&presence);

            if let Err(e) = handle.deliver(Arc::new(OutboundEvent::ready(&handle.id, user_id))) {
                tracing::debug!(connection_id = %handle.id, error = %e, "ready not queued");
            }

            self.deliver_except(
                user_id,
                OutboundEvent::UserOnline {
                    user_id: user_id.to_string(),
                },
            )
        };
        self.release_session(user_id);
        self.reap(announced);

        tracing::info!(user_id = %user_id, connection_id = %handle.id, "user joined");
        handle
    }

    /// Route one inbound event. Returns the number of connections the
    /// resulting event was queued on.
    ///
    /// Invalid events are logged and dropped; nothing here fails the caller.
    pub fn dispatch(&self, event: InboundEvent) -> usize {
        match event {
            InboundEvent::Join { user_id } => {
                tracing::warn!(user_id = %user_id, "join outside connection handshake dropped");
                0
            }
            InboundEvent::JoinRoom { user_id, room_id } => {
                if !self.registry.is_online(&user_id) {
                    tracing::warn!(user_id = %user_id, room_id = %room_id, "join_room from unknown user dropped");
                    return 0;
                }
                self.rooms.join(&room_id, &user_id);
                0
            }
            InboundEvent::LeaveRoom { user_id, room_id } => {
                if self.rooms.leave(&room_id, &user_id) && !self.rooms.room_exists(&room_id) {
                    self.sequencer.forget(&room_id);
                }
                0
            }
            InboundEvent::SendMessage {
                room_id,
                sender_id,
                payload,
            } => self.send_message(&room_id, &sender_id, payload),
            InboundEvent::TypingStart {
                room_id,
                user_id,
                display_name,
            } => self.typing(&room_id, &user_id, display_name, true),
            InboundEvent::TypingStop { room_id, user_id } => {
                self.typing(&room_id, &user_id, None, false)
            }
            InboundEvent::LocationUpdate { user_id, lat, lng } => {
                self.update_location(&user_id, GeoPoint::new(lat, lng))
            }
            InboundEvent::MoodUpdate {
                user_id,
                mood,
                intensity,
                tags,
            } => {
                if mood.trim().is_empty() {
                    tracing::warn!(user_id = %user_id, "mood_update without mood dropped");
                    return 0;
                }
                self.presence
                    .update_mood(&user_id, MoodProfile::new(&mood, intensity, tags, Utc::now()));
                0
            }
            InboundEvent::AvailabilityUpdate { user_id, available } => {
                match self.presence.set_available(&user_id, available) {
                    Some(presence) => self.refresh_index(&presence),
                    None => {
                        tracing::warn!(user_id = %user_id, "availability_update for unknown user dropped");
                    }
                }
                0
            }
            InboundEvent::Heartbeat { .. } => 0,
            InboundEvent::Disconnect { user_id } => match self.registry.lookup(&user_id) {
                Some(handle) => self.connection_closed(&handle.id),
                None => {
                    tracing::warn!(user_id = %user_id, "disconnect for unknown user dropped");
                    0
                }
            },
        }
    }

    /// Tear down `connection_id` if it is still its user's current
    /// connection: close its outbox, mark presence offline, leave every room,
    /// drop it from the proximity index, and broadcast `UserOffline`.
    ///
    /// Stale or unknown connections are a no-op returning 0. Runs under the
    /// user's session lock, so a concurrent `join` for the same user either
    /// completes first (making this connection stale) or starts after the
    /// teardown is done.
    pub fn connection_closed(&self, connection_id: &str) -> usize {
        let Some(user_id) = self.registry.owner_of(connection_id) else {
            tracing::debug!(connection_id = %connection_id, "stale connection close ignored");
            return 0;
        };

        let announced = {
            let session = self.session(&user_id);
            let _guard = session.lock();
            self.tear_down(&user_id, connection_id)
        };
        self.release_session(&user_id);

        let Some(announced) = announced else {
            return 0;
        };
        let notified = self.reap(announced);
        tracing::info!(user_id = %user_id, connection_id = %connection_id, "user disconnected");
        notified
    }

    /// Teardown body; the caller holds `user_id`'s session lock.
    fn tear_down(&self, user_id: &str, connection_id: &str) -> Option<FanoutOutcome> {
        let Some(handle) = self.registry.unregister(connection_id) else {
            tracing::debug!(connection_id = %connection_id, "stale connection close ignored");
            return None;
        };
        handle.close();

        if !self.presence.set_offline(user_id, connection_id) {
            tracing::warn!(
                user_id = %user_id,
                connection_id = %connection_id,
                "presence bound elsewhere, teardown skipped"
            );
            return None;
        }
        for room_id in self.rooms.leave_all(user_id) {
            if !self.rooms.room_exists(&room_id) {
                self.sequencer.forget(&room_id);
            }
        }
        self.proximity.remove(user_id);

        Some(self.deliver_except(
            user_id,
            OutboundEvent::UserOffline {
                user_id: user_id.to_string(),
            },
        ))
    }

    /// Current user presence, if the user was ever seen.
    pub fn presence_of(&self, user_id: &str) -> Option<UserPresence> {
        self.presence.get(user_id)
    }

    fn send_message(&self, room_id: &str, sender_id: &str, payload: serde_json::Value) -> usize {
        let counter = self.sequencer.counter(room_id);
        let mut seq = counter.lock();

        let members = self.rooms.members_of(room_id);
        if members.is_empty() {
            drop(seq);
            drop(counter);
            self.sequencer.forget(room_id);
            tracing::warn!(room_id = %room_id, sender_id = %sender_id, "message to unknown room dropped");
            return 0;
        }

        *seq += 1;
        let event = Arc::new(OutboundEvent::NewMessage {
            room_id: room_id.to_string(),
            seq: *seq,
            sender_id: sender_id.to_string(),
            message: payload,
        });
        let targets = members
            .iter()
            .filter(|member| member.as_str() != sender_id)
            .filter_map(|member| self.registry.lookup(member));
        let outcome = deliver_all(targets, &event);
        drop(seq);

        self.reap(outcome)
    }

    fn typing(
        &self,
        room_id: &str,
        user_id: &str,
        display_name: Option<String>,
        is_typing: bool,
    ) -> usize {
        if !self.rooms.room_exists(room_id) {
            tracing::warn!(room_id = %room_id, user_id = %user_id, "typing in unknown room dropped");
            return 0;
        }
        let event = Arc::new(OutboundEvent::UserTyping {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            display_name,
            is_typing,
        });
        let targets = self
            .rooms
            .members_of(room_id)
            .into_iter()
            .filter(|member| member != user_id)
            .filter_map(|member| self.registry.lookup(&member));
        self.reap(deliver_all(targets, &event))
    }

    fn update_location(&self, user_id: &str, point: GeoPoint) -> usize {
        if !point.is_valid() {
            tracing::warn!(
                user_id = %user_id,
                lat = point.lat,
                lng = point.lng,
                "location_update with invalid coordinates dropped"
            );
            return 0;
        }
        let presence = self.presence.update_location(user_id, point);
        self.refresh_index(&presence);

        self.broadcast_except(
            user_id,
            OutboundEvent::LocationBroadcast {
                user_id: user_id.to_string(),
                location: point,
            },
        )
    }

    /// Keep the proximity index in step with a presence snapshot.
    fn refresh_index(&self, presence: &UserPresence) {
        match (&presence.location, presence.is_discoverable()) {
            (Some(fix), true) => {
                self.proximity.upsert(&presence.user_id, fix.point);
            }
            _ => {
                self.proximity.remove(&presence.user_id);
            }
        }
    }

    fn session(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.sessions
            .entry(user_id.to_string())
            .or_default()
            .value()
            .clone()
    }

    /// Drop a session lock nobody else is waiting on.
    fn release_session(&self, user_id: &str) {
        self.sessions
            .remove_if(user_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Global fan-out to every connection except `user_id`'s.
    fn broadcast_except(&self, user_id: &str, event: OutboundEvent) -> usize {
        let outcome = self.deliver_except(user_id, event);
        self.reap(outcome)
    }

    /// Queue `event` globally without reaping failures.
    fn deliver_except(&self, user_id: &str, event: OutboundEvent) -> FanoutOutcome {
        let event = Arc::new(event);
        let targets = self
            .registry
            .snapshot()
            .into_iter()
            .filter(|handle| handle.user_id != user_id);
        deliver_all(targets, &event)
    }

    /// Disconnect every connection that refused a delivery.
    fn reap(&self, outcome: FanoutOutcome) -> usize {
        for (handle, error) in outcome.failed {
            match error {
                DeliveryError::Overflow => tracing::warn!(
                    user_id = %handle.user_id,
                    connection_id = %handle.id,
                    "outbound queue overflow, disconnecting"
                ),
                DeliveryError::Closed => tracing::debug!(
                    connection_id = %handle.id,
                    "delivery to closed connection skipped"
                ),
            }
            self.connection_closed(&handle.id);
        }
        outcome.delivered
    }
}
