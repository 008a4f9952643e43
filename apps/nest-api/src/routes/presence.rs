//! Location, mood and availability updates, and presence lookup.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use talknest_common::GeoPoint;
use utoipa::ToSchema;

use crate::error::{ApiError, ApiErrorBody, FieldError};
use crate::gateway::events::InboundEvent;
use crate::gateway::presence::{LocationFix, UserPresence};
use crate::matching::mood::MoodProfile;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/location", post(update_location))
        .route("/mood", post(update_mood))
        .route("/availability", post(update_availability))
        .route("/presence/{user_id}", get(get_presence))
}

/// A user's presence as exposed over HTTP.
#[derive(Debug, Serialize, ToSchema)]
pub struct PresenceResponse {
    pub user_id: String,
    pub is_online: bool,
    pub is_available_for_support: bool,
    pub location: Option<LocationFix>,
    pub mood: Option<MoodProfile>,
    pub last_active: DateTime<Utc>,
}

impl From<UserPresence> for PresenceResponse {
    fn from(p: UserPresence) -> Self {
        Self {
            is_online: p.is_online(),
            is_available_for_support: p.available,
            user_id: p.user_id,
            location: p.location,
            mood: p.mood,
            last_active: p.last_active,
        }
    }
}

fn required_user(user_id: Option<&str>) -> Result<&str, ApiError> {
    user_id
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            ApiError::validation(vec![FieldError::new("user_id", "User ID is required")])
        })
}

fn current(state: &AppState, user_id: &str) -> Result<PresenceResponse, ApiError> {
    state
        .hub
        .presence_of(user_id)
        .map(PresenceResponse::from)
        .ok_or_else(|| ApiError::not_found("User not found"))
}

// ---------------------------------------------------------------------------
// POST /api/v1/location
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct LocationRequest {
    pub user_id: Option<String>,
    pub location: Option<GeoPoint>,
}

#[utoipa::path(
    post,
    path = "/api/v1/location",
    tag = "Presence",
    request_body = LocationRequest,
    responses(
        (status = 200, description = "Location recorded and broadcast", body = PresenceResponse),
        (status = 400, description = "Validation error", body = ApiErrorBody),
    ),
)]
pub async fn update_location(
    State(state): State<AppState>,
    Json(body): Json<LocationRequest>,
) -> Result<Json<PresenceResponse>, ApiError> {
    let user_id = required_user(body.user_id.as_deref())?;
    let location = match body.location {
        None => {
            return Err(ApiError::validation(vec![FieldError::new(
                "location",
                "Location is required",
            )]))
        }
        Some(point) if !point.is_valid() => {
            return Err(ApiError::validation(vec![FieldError::new(
                "location",
                "Latitude must be within ±90 and longitude within ±180",
            )]))
        }
        Some(point) => point,
    };

    state.hub.dispatch(InboundEvent::LocationUpdate {
        user_id: user_id.to_string(),
        lat: location.lat,
        lng: location.lng,
    });

    Ok(Json(current(&state, user_id)?))
}

// ---------------------------------------------------------------------------
// POST /api/v1/mood
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct MoodRequest {
    pub user_id: Option<String>,
    pub mood: Option<String>,
    /// 1-10; clamped.
    pub intensity: Option<f64>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[utoipa::path(
    post,
    path = "/api/v1/mood",
    tag = "Presence",
    request_body = MoodRequest,
    responses(
        (status = 200, description = "Mood recorded", body = PresenceResponse),
        (status = 400, description = "Validation error", body = ApiErrorBody),
    ),
)]
pub async fn update_mood(
    State(state): State<AppState>,
    Json(body): Json<MoodRequest>,
) -> Result<Json<PresenceResponse>, ApiError> {
    let user_id = required_user(body.user_id.as_deref())?;
    let Some(mood) = body.mood.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
        return Err(ApiError::validation(vec![FieldError::new(
            "mood",
            "Mood is required",
        )]));
    };

    state.hub.dispatch(InboundEvent::MoodUpdate {
        user_id: user_id.to_string(),
        mood: mood.to_string(),
        intensity: body.intensity.unwrap_or(5.0),
        tags: body.tags,
    });

    Ok(Json(current(&state, user_id)?))
}

// ---------------------------------------------------------------------------
// POST /api/v1/availability
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct AvailabilityRequest {
    pub user_id: Option<String>,
    pub available: Option<bool>,
}

#[utoipa::path(
    post,
    path = "/api/v1/availability",
    tag = "Presence",
    request_body = AvailabilityRequest,
    responses(
        (status = 200, description = "Availability updated", body = PresenceResponse),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 404, description = "User not found", body = ApiErrorBody),
    ),
)]
pub async fn update_availability(
    State(state): State<AppState>,
    Json(body): Json<AvailabilityRequest>,
) -> Result<Json<PresenceResponse>, ApiError> {
    let user_id = required_user(body.user_id.as_deref())?;
    let Some(available) = body.available else {
        return Err(ApiError::validation(vec![FieldError::new(
            "available",
            "Availability is required",
        )]));
    };
    current(&state, user_id)?;

    state.hub.dispatch(InboundEvent::AvailabilityUpdate {
        user_id: user_id.to_string(),
        available,
    });

    Ok(Json(current(&state, user_id)?))
}

// ---------------------------------------------------------------------------
// GET /api/v1/presence/{user_id}
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/presence/{user_id}",
    tag = "Presence",
    params(
        ("user_id" = String, Path, description = "User ID"),
    ),
    responses(
        (status = 200, description = "Current presence", body = PresenceResponse),
        (status = 404, description = "User not found", body = ApiErrorBody),
    ),
)]
pub async fn get_presence(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<PresenceResponse>, ApiError> {
    Ok(Json(current(&state, &user_id)?))
}
