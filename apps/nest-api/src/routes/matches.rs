//! Mood-compatibility matching.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use talknest_common::GeoPoint;
use utoipa::ToSchema;

use crate::error::{ApiError, ApiErrorBody, FieldError};
use crate::matching::engine::MatchCandidate;
use crate::matching::mood::{insights, MoodProfile};
use crate::AppState;

use super::nearby::MAX_RESULTS_CEILING;

pub fn router() -> Router<AppState> {
    Router::new().route("/matches", post(find_matches))
}

// ---------------------------------------------------------------------------
// POST /api/v1/matches
// ---------------------------------------------------------------------------

/// Missing mood or location fields fall back to the user's live presence.
#[derive(Debug, Deserialize, ToSchema)]
pub struct MatchRequest {
    pub user_id: Option<String>,
    pub location: Option<GeoPoint>,
    pub mood: Option<String>,
    pub intensity: Option<f64>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub radius: Option<f64>,
    pub max_results: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MatchResponse {
    pub success: bool,
    pub matches: Vec<MatchCandidate>,
    pub insights: Vec<String>,
    pub total_found: usize,
}

#[utoipa::path(
    post,
    path = "/api/v1/matches",
    tag = "Discovery",
    request_body = MatchRequest,
    responses(
        (status = 200, description = "Candidates ranked by compatibility", body = MatchResponse),
        (status = 400, description = "Validation error", body = ApiErrorBody),
    ),
)]
pub async fn find_matches(
    State(state): State<AppState>,
    Json(body): Json<MatchRequest>,
) -> Result<Json<MatchResponse>, ApiError> {
    let Some(user_id) = body.user_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
        return Err(ApiError::validation(vec![FieldError::new(
            "user_id",
            "User ID is required",
        )]));
    };

    let presence = state.hub.presence_of(user_id);

    let profile = match body.mood.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(mood) => Some(MoodProfile::new(
            mood,
            body.intensity.unwrap_or(5.0),
            body.tags.clone(),
            Utc::now(),
        )),
        None => presence.as_ref().and_then(|p| p.mood.clone()),
    };
    let center = body
        .location
        .or_else(|| presence.as_ref().and_then(|p| p.location.as_ref()).map(|fix| fix.point));

    let mut errors = Vec::new();
    if profile.is_none() {
        errors.push(FieldError::new("mood", "Mood is required"));
    }
    if center.is_none() {
        errors.push(FieldError::new("location", "Location is required"));
    }
    ApiError::check(errors)?;
    let (Some(profile), Some(center)) = (profile, center) else {
        return Err(ApiError::bad_request("Mood and location are required"));
    };

    let radius = body.radius.unwrap_or(state.config.nearby_radius_meters);
    let max_results = body
        .max_results
        .unwrap_or(state.config.match_max_results)
        .clamp(1, MAX_RESULTS_CEILING);

    let matches = state
        .matcher
        .mood_matches(user_id, &profile, center, radius, max_results);

    tracing::debug!(
        user_id = %user_id,
        mood = %profile.mood,
        found = matches.len(),
        "mood matching"
    );

    Ok(Json(MatchResponse {
        success: true,
        total_found: matches.len(),
        insights: insights(&profile.mood).into_iter().map(String::from).collect(),
        matches,
    }))
}
