//! Message send and history endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::db::store::{ConversationSummary, NewMessage, StoredMessage, DEFAULT_MESSAGE_TYPE};
use crate::error::{ApiError, ApiErrorBody, FieldError};
use crate::gateway::events::InboundEvent;
use crate::AppState;

/// Maximum message length in characters.
const MAX_CONTENT_CHARS: usize = 4000;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/messages/send", post(send_message))
        .route("/messages/{conversation_id}", get(list_messages))
}

// ---------------------------------------------------------------------------
// POST /api/v1/messages/send
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendMessageRequest {
    pub conversation_id: Option<String>,
    pub sender_id: Option<String>,
    pub content: Option<String>,
    #[serde(rename = "type")]
    pub message_type: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SendMessageResponse {
    pub success: bool,
    pub message_id: String,
    pub message: StoredMessage,
    /// Live connections the message was queued on.
    pub delivered: usize,
}

#[utoipa::path(
    post,
    path = "/api/v1/messages/send",
    tag = "Messages",
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Message stored and fanned out", body = SendMessageResponse),
        (status = 400, description = "Validation error", body = ApiErrorBody),
    ),
)]
pub async fn send_message(
    State(state): State<AppState>,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<SendMessageResponse>), ApiError> {
    let conversation_id = required(body.conversation_id.as_deref());
    let sender_id = required(body.sender_id.as_deref());
    let content = required(body.content.as_deref());

    let mut errors = Vec::new();
    if conversation_id.is_none() {
        errors.push(FieldError::new("conversation_id", "Conversation ID is required"));
    }
    if sender_id.is_none() {
        errors.push(FieldError::new("sender_id", "Sender ID is required"));
    }
    match content {
        None => errors.push(FieldError::new("content", "Message content is required")),
        Some(c) if c.chars().count() > MAX_CONTENT_CHARS => errors.push(FieldError::new(
            "content",
            format!("Message content must be {MAX_CONTENT_CHARS} characters or fewer"),
        )),
        _ => {}
    }
    ApiError::check(errors)?;
    let (Some(conversation_id), Some(sender_id), Some(content)) =
        (conversation_id, sender_id, content)
    else {
        return Err(ApiError::bad_request("Missing required fields"));
    };

    // Persist first; only a stored message is fanned out.
    let message = state
        .store
        .append(NewMessage {
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            content: content.to_string(),
            message_type: required(body.message_type.as_deref())
                .unwrap_or(DEFAULT_MESSAGE_TYPE)
                .to_string(),
        })
        .await?;

    let payload = serde_json::to_value(&message)
        .map_err(|e| ApiError::internal(format!("Failed to encode message: {e}")))?;
    let delivered = state.hub.dispatch(InboundEvent::SendMessage {
        room_id: message.conversation_id.clone(),
        sender_id: message.sender_id.clone(),
        payload,
    });

    Ok((
        StatusCode::CREATED,
        Json(SendMessageResponse {
            success: true,
            message_id: message.id.clone(),
            message,
            delivered,
        }),
    ))
}

fn required(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// GET /api/v1/messages/{conversation_id}
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListMessagesParams {
    /// Most recent N messages; clamped to the configured history limit.
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ListMessagesResponse {
    pub success: bool,
    /// Oldest first.
    pub messages: Vec<StoredMessage>,
    pub conversation: Option<ConversationSummary>,
}

#[utoipa::path(
    get,
    path = "/api/v1/messages/{conversation_id}",
    tag = "Messages",
    params(
        ("conversation_id" = String, Path, description = "Conversation ID"),
        ListMessagesParams,
    ),
    responses(
        (status = 200, description = "Message history", body = ListMessagesResponse),
    ),
)]
pub async fn list_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Query(params): Query<ListMessagesParams>,
) -> Result<Json<ListMessagesResponse>, ApiError> {
    let ceiling = state.config.message_history_limit.max(1);
    let limit = params.limit.unwrap_or(ceiling).clamp(1, ceiling);

    let messages = state.store.history(&conversation_id, limit).await?;
    let conversation = state.store.conversation(&conversation_id).await?;

    Ok(Json(ListMessagesResponse {
        success: true,
        messages,
        conversation,
    }))
}
