//! Gateway event types and wire format.
//!
//! Every frame is a JSON envelope `{"event": "<snake_case name>", "data": {...}}`.
//! Payloads are decoded into closed enums at the transport boundary so the
//! hub never sees loosely-shaped input.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use talknest_common::GeoPoint;

/// Heartbeat interval sent to clients in the READY payload (ms).
pub const HEARTBEAT_INTERVAL_MS: u64 = 41_250;

/// Clients clear a typing indicator this long after the last typing event.
pub const TYPING_TIMEOUT_MS: u64 = 3_000;

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

/// An event received from a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum InboundEvent {
    Join {
        user_id: String,
    },
    JoinRoom {
        user_id: String,
        room_id: String,
    },
    LeaveRoom {
        user_id: String,
        room_id: String,
    },
    SendMessage {
        room_id: String,
        sender_id: String,
        payload: Value,
    },
    TypingStart {
        room_id: String,
        user_id: String,
        #[serde(default)]
        display_name: Option<String>,
    },
    TypingStop {
        room_id: String,
        user_id: String,
    },
    LocationUpdate {
        user_id: String,
        lat: f64,
        lng: f64,
    },
    MoodUpdate {
        user_id: String,
        mood: String,
        #[serde(default = "default_intensity")]
        intensity: f64,
        #[serde(default)]
        tags: Vec<String>,
    },
    AvailabilityUpdate {
        user_id: String,
        available: bool,
    },
    Heartbeat {
        #[serde(default)]
        seq: u64,
    },
    Disconnect {
        user_id: String,
    },
}

fn default_intensity() -> f64 {
    5.0
}

impl InboundEvent {
    /// The user this event acts on behalf of, if any.
    pub fn actor(&self) -> Option<&str> {
        match self {
            Self::Join { user_id }
            | Self::JoinRoom { user_id, .. }
            | Self::LeaveRoom { user_id, .. }
            | Self::TypingStart { user_id, .. }
            | Self::TypingStop { user_id, .. }
            | Self::LocationUpdate { user_id, .. }
            | Self::MoodUpdate { user_id, .. }
            | Self::AvailabilityUpdate { user_id, .. }
            | Self::Disconnect { user_id } => Some(user_id),
            Self::SendMessage { sender_id, .. } => Some(sender_id),
            Self::Heartbeat { .. } => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::JoinRoom { .. } => "join_room",
            Self::LeaveRoom { .. } => "leave_room",
            Self::SendMessage { .. } => "send_message",
            Self::TypingStart { .. } => "typing_start",
            Self::TypingStop { .. } => "typing_stop",
            Self::LocationUpdate { .. } => "location_update",
            Self::MoodUpdate { .. } => "mood_update",
            Self::AvailabilityUpdate { .. } => "availability_update",
            Self::Heartbeat { .. } => "heartbeat",
            Self::Disconnect { .. } => "disconnect",
        }
    }
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

/// An event delivered to one or more connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum OutboundEvent {
    Ready {
        connection_id: String,
        user_id: String,
        heartbeat_interval_ms: u64,
        typing_timeout_ms: u64,
    },
    NewMessage {
        room_id: String,
        /// Room-local sequence number; strictly increasing per room.
        seq: u64,
        sender_id: String,
        message: Value,
    },
    UserTyping {
        room_id: String,
        user_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
        is_typing: bool,
    },
    UserOnline {
        user_id: String,
    },
    UserOffline {
        user_id: String,
    },
    LocationBroadcast {
        user_id: String,
        location: GeoPoint,
    },
    HeartbeatAck {
        seq: u64,
    },
    /// The connection was replaced by a newer one for the same user.
    Superseded {
        reason: String,
    },
}

impl OutboundEvent {
    pub fn ready(connection_id: &str, user_id: &str) -> Self {
        Self::Ready {
            connection_id: connection_id.to_string(),
            user_id: user_id.to_string(),
            heartbeat_interval_ms: HEARTBEAT_INTERVAL_MS,
            typing_timeout_ms: TYPING_TIMEOUT_MS,
        }
    }

    /// Lossy events may be evicted under backpressure. Chat messages and
    /// connection-control events may not.
    pub fn is_lossy(&self) -> bool {
        matches!(
            self,
            Self::UserTyping { .. }
                | Self::UserOnline { .. }
                | Self::UserOffline { .. }
                | Self::LocationBroadcast { .. }
                | Self::HeartbeatAck { .. }
        )
    }

    /// Wire name, matching the serialized `event` tag.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::NewMessage { .. } => "new_message",
            Self::UserTyping { .. } => "user_typing",
            Self::UserOnline { .. } => "user_online",
            Self::UserOffline { .. } => "user_offline",
            Self::LocationBroadcast { .. } => "location_broadcast",
            Self::HeartbeatAck { .. } => "heartbeat_ack",
            Self::Superseded { .. } => "superseded",
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
