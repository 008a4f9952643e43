//! Client side of the realtime connection.
//!
//! [`RealtimeClient`] is what application code talks to; the WebSocket
//! gateway is one transport behind it and [`InProcessClient`] is another that
//! drives a [`Hub`] directly, used as a test double. [`TypingIndicators`]
//! holds the client-side typing state, which expires on its own because the
//! hub never guarantees a matching stop event.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use talknest_common::GeoPoint;

use crate::gateway::events::{InboundEvent, OutboundEvent, TYPING_TIMEOUT_MS};
use crate::gateway::hub::Hub;
use crate::gateway::outbox::DeliveryError;
use crate::gateway::registry::ConnectionHandle;

#[async_trait]
pub trait RealtimeClient: Send + Sync {
    fn user_id(&self) -> &str;

    /// Hand an event to the hub. Fails once the connection is closed.
    fn send(&self, event: InboundEvent) -> Result<(), DeliveryError>;

    /// Next event for this connection; `None` once it is closed and drained.
    async fn recv(&self) -> Option<OutboundEvent>;

    fn disconnect(&self);

    fn join_room(&self, room_id: &str) -> Result<(), DeliveryError> {
        self.send(InboundEvent::JoinRoom {
            user_id: self.user_id().to_string(),
            room_id: room_id.to_string(),
        })
    }

    fn leave_room(&self, room_id: &str) -> Result<(), DeliveryError> {
        self.send(InboundEvent::LeaveRoom {
            user_id: self.user_id().to_string(),
            room_id: room_id.to_string(),
        })
    }

    fn send_message(&self, room_id: &str, payload: Value) -> Result<(), DeliveryError> {
        self.send(InboundEvent::SendMessage {
            room_id: room_id.to_string(),
            sender_id: self.user_id().to_string(),
            payload,
        })
    }

    fn start_typing(&self, room_id: &str, display_name: Option<&str>) -> Result<(), DeliveryError> {
        self.send(InboundEvent::TypingStart {
            room_id: room_id.to_string(),
            user_id: self.user_id().to_string(),
            display_name: display_name.map(str::to_string),
        })
    }

    fn stop_typing(&self, room_id: &str) -> Result<(), DeliveryError> {
        self.send(InboundEvent::TypingStop {
            room_id: room_id.to_string(),
            user_id: self.user_id().to_string(),
        })
    }

    fn update_location(&self, point: GeoPoint) -> Result<(), DeliveryError> {
        self.send(InboundEvent::LocationUpdate {
            user_id: self.user_id().to_string(),
            lat: point.lat,
            lng: point.lng,
        })
    }
}

/// A client wired straight into a hub, without a socket in between.
pub struct InProcessClient {
    hub: Arc<Hub>,
    handle: Arc<ConnectionHandle>,
}

impl InProcessClient {
    pub fn connect(hub: Arc<Hub>, user_id: &str) -> Self {
        let handle = hub.join(user_id);
        Self { hub, handle }
    }

    pub fn connection_id(&self) -> &str {
        &self.handle.id
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    /// Next queued event, without waiting.
    pub fn try_recv(&self) -> Option<OutboundEvent> {
        self.handle.outbox().try_recv().map(|event| (*event).clone())
    }

    /// Everything queued so far.
    pub fn drain(&self) -> Vec<OutboundEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

#[async_trait]
impl RealtimeClient for InProcessClient {
    fn user_id(&self) -> &str {
        &self.handle.user_id
    }

    fn send(&self, event: InboundEvent) -> Result<(), DeliveryError> {
        if self.handle.is_closed() {
            return Err(DeliveryError::Closed);
        }
        match event {
            InboundEvent::Heartbeat { seq } => {
                self.handle
                    .deliver(Arc::new(OutboundEvent::HeartbeatAck { seq }))?;
            }
            InboundEvent::Join { .. } => {}
            InboundEvent::Disconnect { .. } => self.disconnect(),
            other => {
                self.hub.dispatch(other);
            }
        }
        Ok(())
    }

    async fn recv(&self) -> Option<OutboundEvent> {
        self.handle
            .outbox()
            .recv()
            .await
            .map(|event| (*event).clone())
    }

    fn disconnect(&self) {
        self.hub.connection_closed(&self.handle.id);
        self.handle.close();
    }
}

/// Someone currently shown as typing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingUser {
    pub user_id: String,
    pub display_name: Option<String>,
}

/// Client-side typing state per room, expiring each indicator a fixed time
/// after the last `user_typing` start event for it.
pub struct TypingIndicators {
    timeout: Duration,
    active: HashMap<(String, String), (Option<String>, Instant)>,
}

impl TypingIndicators {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            active: HashMap::new(),
        }
    }

    /// Apply an incoming event. Returns `true` if the typing state changed.
    pub fn observe(&mut self, event: &OutboundEvent, now: Instant) -> bool {
        let OutboundEvent::UserTyping {
            room_id,
            user_id,
            display_name,
            is_typing,
        } = event
        else {
            return false;
        };
        let key = (room_id.clone(), user_id.clone());
        if *is_typing {
            self.active
                .insert(key, (display_name.clone(), now + self.timeout))
                .is_none()
        } else {
            self.active.remove(&key).is_some()
        }
    }

    /// Users typing in `room_id` as of `now`, ordered by user id.
    pub fn typing_in(&self, room_id: &str, now: Instant) -> Vec<TypingUser> {
        let mut users: Vec<TypingUser> = self
            .active
            .iter()
            .filter(|((room, _), (_, expires_at))| room == room_id && *expires_at > now)
            .map(|((_, user_id), (display_name, _))| TypingUser {
                user_id: user_id.clone(),
                display_name: display_name.clone(),
            })
            .collect();
        users.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        users
    }

    /// Drop expired indicators. Returns how many were removed.
    pub fn expire(&mut self, now: Instant) -> usize {
        let before = self.active.len();
        self.active.retain(|_, (_, expires_at)| *expires_at > now);
        before - self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

impl Default for TypingIndicators {
    fn default() -> Self {
        Self::new(Duration::from_millis(TYPING_TIMEOUT_MS))
    }
}
