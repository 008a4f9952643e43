mod common;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::json;

use common::{north_of, online_at, set_mood, SF};

// ---------------------------------------------------------------------------
// POST /api/v1/nearby
// ---------------------------------------------------------------------------

#[tokio::test]
async fn nearby_requires_user_and_location() {
    let (app, _state) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let resp = server.post("/api/v1/nearby").json(&json!({})).await;

    resp.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    let fields: Vec<&str> = body["error"]["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["user_id", "location"]);
}

#[tokio::test]
async fn nearby_returns_closest_first_with_distance_labels() {
    let (app, state) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let me = common::new_user_id();
    let near = common::new_user_id();
    let far = common::new_user_id();
    let outside = common::new_user_id();
    online_at(&state, &me, SF);
    online_at(&state, &far, north_of(SF, 1_500.0));
    online_at(&state, &near, north_of(SF, 152.0));
    online_at(&state, &outside, north_of(SF, 9_000.0));

    let resp = server
        .post("/api/v1/nearby")
        .json(&json!({ "user_id": me, "location": { "lat": SF.lat, "lng": SF.lng } }))
        .await;

    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["total_found"], 2);
    assert_eq!(body["message"], "Found 2 users nearby");

    let users = body["users"].as_array().unwrap();
    assert_eq!(users[0]["user_id"], near);
    assert_eq!(users[0]["distance"], "152m");
    assert_eq!(users[0]["distance_meters"], 152);
    assert_eq!(users[0]["is_online"], true);
    assert_eq!(users[0]["is_available_for_support"], true);
    assert_eq!(users[1]["user_id"], far);
}

#[tokio::test]
async fn nearby_mood_filter_and_wildcard() {
    let (app, state) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let me = common::new_user_id();
    let calm = common::new_user_id();
    let happy = common::new_user_id();
    online_at(&state, &me, SF);
    online_at(&state, &calm, north_of(SF, 300.0));
    online_at(&state, &happy, north_of(SF, 200.0));
    set_mood(&state, &calm, "Calm", 4.0, &[]);
    set_mood(&state, &happy, "Happy", 6.0, &[]);

    let location = json!({ "lat": SF.lat, "lng": SF.lng });

    let resp = server
        .post("/api/v1/nearby")
        .json(&json!({ "user_id": me, "location": location, "mood_filter": "Calm" }))
        .await;
    let body: serde_json::Value = resp.json();
    assert_eq!(body["total_found"], 1);
    assert_eq!(body["users"][0]["user_id"], calm);
    assert_eq!(body["users"][0]["mood"], "Calm");

    let resp = server
        .post("/api/v1/nearby")
        .json(&json!({ "user_id": me, "location": location, "mood_filter": "All Moods" }))
        .await;
    let body: serde_json::Value = resp.json();
    assert_eq!(body["total_found"], 2);
    assert_eq!(body["users"][0]["user_id"], happy);
}

#[tokio::test]
async fn nearby_fails_soft_on_bad_query() {
    let (app, state) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let other = common::new_user_id();
    online_at(&state, &other, north_of(SF, 100.0));

    let resp = server
        .post("/api/v1/nearby")
        .json(&json!({ "user_id": "usr_me", "location": { "lat": SF.lat, "lng": SF.lng }, "radius": 0 }))
        .await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["total_found"], 0);
    assert_eq!(body["message"], "No users found nearby");

    let resp = server
        .post("/api/v1/nearby")
        .json(&json!({ "user_id": "usr_me", "location": { "lat": 123.0, "lng": 0.0 } }))
        .await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["total_found"], 0);
}

#[tokio::test]
async fn nearby_honours_max_results() {
    let (app, state) = common::test_app();
    let server = TestServer::new(app).unwrap();

    for i in 0..30 {
        let user = common::new_user_id();
        online_at(&state, &user, north_of(SF, 10.0 + f64::from(i) * 10.0));
    }

    let location = json!({ "lat": SF.lat, "lng": SF.lng });
    let resp = server
        .post("/api/v1/nearby")
        .json(&json!({ "user_id": "usr_me", "location": location }))
        .await;
    let body: serde_json::Value = resp.json();
    assert_eq!(body["total_found"], 20);

    let resp = server
        .post("/api/v1/nearby")
        .json(&json!({ "user_id": "usr_me", "location": location, "max_results": 5 }))
        .await;
    let body: serde_json::Value = resp.json();
    assert_eq!(body["total_found"], 5);
}

#[tokio::test]
async fn unavailable_users_are_hidden() {
    let (app, state) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let busy = common::new_user_id();
    online_at(&state, &busy, north_of(SF, 100.0));

    let resp = server
        .post("/api/v1/availability")
        .json(&json!({ "user_id": busy, "available": false }))
        .await;
    resp.assert_status_ok();

    let resp = server
        .post("/api/v1/nearby")
        .json(&json!({ "user_id": "usr_me", "location": { "lat": SF.lat, "lng": SF.lng } }))
        .await;
    let body: serde_json::Value = resp.json();
    assert_eq!(body["total_found"], 0);
}
