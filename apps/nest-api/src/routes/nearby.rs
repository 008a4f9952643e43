//! Nearby user discovery.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use talknest_common::GeoPoint;
use utoipa::ToSchema;

use crate::error::{ApiError, ApiErrorBody, FieldError};
use crate::matching::engine::NearbyUser;
use crate::AppState;

/// Hard ceiling on caller-requested result counts.
pub const MAX_RESULTS_CEILING: usize = 100;

pub fn router() -> Router<AppState> {
    Router::new().route("/nearby", post(find_nearby))
}

// ---------------------------------------------------------------------------
// POST /api/v1/nearby
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct NearbyRequest {
    pub user_id: Option<String>,
    pub location: Option<GeoPoint>,
    /// Exact mood, or "All Moods" / absent for any.
    pub mood_filter: Option<String>,
    /// Meters; server default when absent.
    pub radius: Option<f64>,
    pub max_results: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NearbyUserResponse {
    pub user_id: String,
    pub mood: Option<String>,
    /// Rounded distance label, e.g. `"152m"`.
    pub distance: String,
    pub distance_meters: u64,
    pub location: GeoPoint,
    pub is_online: bool,
    pub is_available_for_support: bool,
}

impl From<NearbyUser> for NearbyUserResponse {
    fn from(user: NearbyUser) -> Self {
        let meters = user.distance_meters.round().max(0.0) as u64;
        Self {
            user_id: user.user_id,
            mood: user.mood,
            distance: format!("{meters}m"),
            distance_meters: meters,
            location: user.location,
            is_online: true,
            is_available_for_support: user.available,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NearbyResponse {
    pub success: bool,
    pub users: Vec<NearbyUserResponse>,
    pub total_found: usize,
    pub message: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/nearby",
    tag = "Discovery",
    request_body = NearbyRequest,
    responses(
        (status = 200, description = "Nearby users, closest first", body = NearbyResponse),
        (status = 400, description = "Validation error", body = ApiErrorBody),
    ),
)]
pub async fn find_nearby(
    State(state): State<AppState>,
    Json(body): Json<NearbyRequest>,
) -> Result<Json<NearbyResponse>, ApiError> {
    let user_id = body.user_id.as_deref().map(str::trim).filter(|s| !s.is_empty());

    let mut errors = Vec::new();
    if user_id.is_none() {
        errors.push(FieldError::new("user_id", "User ID is required"));
    }
    if body.location.is_none() {
        errors.push(FieldError::new("location", "Location is required"));
    }
    ApiError::check(errors)?;

    let (Some(user_id), Some(center)) = (user_id, body.location) else {
        return Err(ApiError::bad_request("User ID and location are required"));
    };

    let radius = body.radius.unwrap_or(state.config.nearby_radius_meters);
    let max_results = body
        .max_results
        .unwrap_or(state.config.nearby_max_results)
        .clamp(1, MAX_RESULTS_CEILING);

    let users: Vec<NearbyUserResponse> = state
        .matcher
        .nearby(
            Some(user_id),
            center,
            radius,
            body.mood_filter.as_deref(),
            max_results,
        )
        .into_iter()
        .map(NearbyUserResponse::from)
        .collect();

    tracing::debug!(user_id = %user_id, radius, found = users.len(), "nearby search");

    let total_found = users.len();
    let message = if total_found == 0 {
        "No users found nearby".to_string()
    } else {
        format!("Found {total_found} users nearby")
    };

    Ok(Json(NearbyResponse {
        success: true,
        users,
        total_found,
        message,
    }))
}
