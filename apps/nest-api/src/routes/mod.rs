pub mod matches;
pub mod messages;
pub mod nearby;
pub mod presence;

use axum::Router;
use utoipa::OpenApi;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(crate::gateway::server::router())
        .nest(
            "/api/v1",
            nearby::router()
                .merge(matches::router())
                .merge(messages::router())
                .merge(presence::router()),
        )
}

#[derive(OpenApi)]
#[openapi(
    paths(
        // Discovery
        nearby::find_nearby,
        matches::find_matches,
        // Messages
        messages::send_message,
        messages::list_messages,
        // Presence
        presence::update_location,
        presence::update_mood,
        presence::update_availability,
        presence::get_presence,
    ),
    components(
        schemas(
            // Error types
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            crate::error::FieldError,
            // Models
            talknest_common::GeoPoint,
            crate::gateway::presence::LocationFix,
            crate::matching::mood::MoodProfile,
            crate::matching::score::Compatibility,
            crate::matching::engine::MatchCandidate,
            crate::db::store::StoredMessage,
            crate::db::store::ConversationSummary,
            // Route request/response types
            nearby::NearbyRequest,
            nearby::NearbyUserResponse,
            nearby::NearbyResponse,
            matches::MatchRequest,
            matches::MatchResponse,
            messages::SendMessageRequest,
            messages::SendMessageResponse,
            messages::ListMessagesResponse,
            presence::LocationRequest,
            presence::MoodRequest,
            presence::AvailabilityRequest,
            presence::PresenceResponse,
        )
    ),
    tags(
        (name = "Discovery", description = "Nearby search and mood matching"),
        (name = "Messages", description = "Messaging"),
        (name = "Presence", description = "Location, mood and availability"),
    )
)]
pub struct ApiDoc;
