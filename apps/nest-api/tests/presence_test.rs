mod common;

use axum::body::Body;
use axum::http::StatusCode;
use http::Request;
use axum_test::TestServer;
use serde_json::json;
use tower::ServiceExt;

use nest_api::gateway::events::OutboundEvent;

use common::{drain, north_of, online_at, SF};

// ---------------------------------------------------------------------------
// POST /api/v1/location
// ---------------------------------------------------------------------------

#[tokio::test]
async fn location_update_is_recorded_and_broadcast() {
    let (app, state) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let watcher = common::new_user_id();
    let mover = common::new_user_id();
    let watcher_conn = online_at(&state, &watcher, SF);
    online_at(&state, &mover, SF);
    drain(&watcher_conn);

    let target = north_of(SF, 250.0);
    let resp = server
        .post("/api/v1/location")
        .json(&json!({ "user_id": mover, "location": { "lat": target.lat, "lng": target.lng } }))
        .await;

    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["user_id"], mover);
    assert_eq!(body["is_online"], true);
    assert_eq!(body["location"]["point"]["lat"], target.lat);

    assert_eq!(state.hub.proximity().position_of(&mover), Some(target));
    let events = drain(&watcher_conn);
    assert!(events.iter().any(|e| matches!(
        e,
        OutboundEvent::LocationBroadcast { user_id, location } if user_id == &mover && *location == target
    )));
}

#[tokio::test]
async fn location_rejects_invalid_coordinates() {
    let (app, _state) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let resp = server
        .post("/api/v1/location")
        .json(&json!({ "user_id": "usr_a", "location": { "lat": 91.0, "lng": 0.0 } }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["details"][0]["field"], "location");

    let resp = server
        .post("/api/v1/location")
        .json(&json!({ "user_id": "usr_a" }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn offline_location_is_kept_but_not_indexed() {
    let (app, state) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let resp = server
        .post("/api/v1/location")
        .json(&json!({ "user_id": "usr_ghost", "location": { "lat": SF.lat, "lng": SF.lng } }))
        .await;

    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["is_online"], false);
    assert!(!state.hub.proximity().contains("usr_ghost"));
}

// ---------------------------------------------------------------------------
// POST /api/v1/mood
// ---------------------------------------------------------------------------

#[tokio::test]
async fn mood_update_clamps_intensity() {
    let (app, state) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let user = common::new_user_id();
    online_at(&state, &user, SF);

    let resp = server
        .post("/api/v1/mood")
        .json(&json!({ "user_id": user, "mood": "Happy", "intensity": 42, "tags": ["music"] }))
        .await;

    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["mood"]["mood"], "Happy");
    assert_eq!(body["mood"]["intensity"], 10.0);
    assert_eq!(body["mood"]["tags"], json!(["music"]));
}

#[tokio::test]
async fn mood_is_required() {
    let (app, _state) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let resp = server
        .post("/api/v1/mood")
        .json(&json!({ "user_id": "usr_a", "mood": " " }))
        .await;

    resp.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["details"][0]["field"], "mood");
}

// ---------------------------------------------------------------------------
// POST /api/v1/availability
// ---------------------------------------------------------------------------

#[tokio::test]
async fn availability_for_unknown_user_is_not_found() {
    let (app, _state) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let resp = server
        .post("/api/v1/availability")
        .json(&json!({ "user_id": "usr_nobody", "available": false }))
        .await;

    resp.assert_status(StatusCode::NOT_FOUND);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn availability_toggles_discoverability() {
    let (app, state) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let user = common::new_user_id();
    online_at(&state, &user, SF);

    let resp = server
        .post("/api/v1/availability")
        .json(&json!({ "user_id": user, "available": false }))
        .await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["is_available_for_support"], false);
    assert!(!state.hub.proximity().contains(&user));

    server
        .post("/api/v1/availability")
        .json(&json!({ "user_id": user, "available": true }))
        .await
        .assert_status_ok();
    assert!(state.hub.proximity().contains(&user));
}

// ---------------------------------------------------------------------------
// GET /api/v1/presence/{user_id}
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_presence_unknown_user() {
    let (app, _state) = common::test_app();

    let resp = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/presence/usr_nobody")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["message"], "User not found");
}

#[tokio::test]
async fn get_presence_reflects_disconnect() {
    let (app, state) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let user = common::new_user_id();
    let conn = online_at(&state, &user, SF);

    let resp = server.get(&format!("/api/v1/presence/{user}")).await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["is_online"], true);

    state.hub.connection_closed(&conn.id);

    let resp = server.get(&format!("/api/v1/presence/{user}")).await;
    let body: serde_json::Value = resp.json();
    assert_eq!(body["is_online"], false);
    // Last-known location survives the disconnect.
    assert_eq!(body["location"]["point"]["lng"], SF.lng);
}
