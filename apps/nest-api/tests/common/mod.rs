#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use talknest_common::id::{prefix, prefixed_ulid};
use talknest_common::GeoPoint;

use nest_api::config::Config;
use nest_api::db::store::MemoryStore;
use nest_api::gateway::events::{InboundEvent, OutboundEvent};
use nest_api::gateway::registry::ConnectionHandle;
use nest_api::proximity::METERS_PER_DEGREE;
use nest_api::AppState;

/// San Francisco city centre.
pub const SF: GeoPoint = GeoPoint {
    lat: 37.7749,
    lng: -122.4194,
};

/// Build test state with default config and an in-memory store.
pub fn test_state() -> AppState {
    test_state_with(Config::default())
}

pub fn test_state_with(config: Config) -> AppState {
    AppState::new(config, Arc::new(MemoryStore::new()))
}

/// Build a test router with state.
pub fn test_app() -> (Router, AppState) {
    let state = test_state();
    let app = nest_api::routes::router().with_state(state.clone());
    (app, state)
}

pub fn new_user_id() -> String {
    prefixed_ulid(prefix::USER)
}

pub fn new_conversation_id() -> String {
    prefixed_ulid(prefix::CONVERSATION)
}

/// A point `meters` due north of `from`.
pub fn north_of(from: GeoPoint, meters: f64) -> GeoPoint {
    GeoPoint::new(from.lat + meters / METERS_PER_DEGREE, from.lng)
}

/// Connect `user_id` through the hub and place it at `at`.
pub fn online_at(state: &AppState, user_id: &str, at: GeoPoint) -> Arc<ConnectionHandle> {
    let handle = state.hub.join(user_id);
    state.hub.dispatch(InboundEvent::LocationUpdate {
        user_id: user_id.to_string(),
        lat: at.lat,
        lng: at.lng,
    });
    handle
}

pub fn set_mood(state: &AppState, user_id: &str, mood: &str, intensity: f64, tags: &[&str]) {
    state.hub.dispatch(InboundEvent::MoodUpdate {
        user_id: user_id.to_string(),
        mood: mood.to_string(),
        intensity,
        tags: tags.iter().map(|t| t.to_string()).collect(),
    });
}

pub fn join_room(state: &AppState, user_id: &str, room_id: &str) {
    state.hub.dispatch(InboundEvent::JoinRoom {
        user_id: user_id.to_string(),
        room_id: room_id.to_string(),
    });
}

/// Everything currently queued on a connection.
pub fn drain(handle: &ConnectionHandle) -> Vec<OutboundEvent> {
    std::iter::from_fn(|| handle.outbox().try_recv())
        .map(|event| (*event).clone())
        .collect()
}
