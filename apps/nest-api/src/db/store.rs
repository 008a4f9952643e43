use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use talknest_common::id::{prefix, PrefixedId};
use utoipa::ToSchema;

use crate::error::ApiError;

/// Message type used when the sender gives none.
pub const DEFAULT_MESSAGE_TYPE: &str = "text";

/// A message as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct StoredMessage {
    /// `msg_` prefixed ULID.
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    #[serde(rename = "type")]
    pub message_type: String,
    pub status: String,
    pub sent_at: DateTime<Utc>,
}

impl PrefixedId for StoredMessage {
    const PREFIX: &'static str = prefix::MESSAGE;
}

/// A message about to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub message_type: String,
}

impl NewMessage {
    /// Extract a persistable text message from a realtime payload. Payloads
    /// without a `text` or `content` string are not persisted.
    pub fn from_payload(conversation_id: &str, sender_id: &str, payload: &Value) -> Option<Self> {
        let content = payload
            .get("text")
            .or_else(|| payload.get("content"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())?;
        let message_type = payload
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_MESSAGE_TYPE);
        Some(Self {
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            content: content.to_string(),
            message_type: message_type.to_string(),
        })
    }
}

/// Per-conversation metadata kept alongside the messages.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub last_message: Option<String>,
    pub last_message_time: Option<DateTime<Utc>>,
    pub message_count: u64,
    /// Incremented on every send.
    pub unread_count: u64,
}

/// Message persistence.
///
/// The realtime core only appends and reads history; the backing database is
/// owned elsewhere. An in-memory implementation serves tests and
/// single-process deployments.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn append(&self, message: NewMessage) -> Result<StoredMessage, ApiError>;

    /// The most recent `limit` messages of a conversation, oldest first.
    async fn history(&self, conversation_id: &str, limit: usize)
        -> Result<Vec<StoredMessage>, ApiError>;

    async fn conversation(&self, conversation_id: &str)
        -> Result<Option<ConversationSummary>, ApiError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

struct Conversation {
    messages: Vec<StoredMessage>,
    summary: ConversationSummary,
}

pub struct MemoryStore {
    conversations: Mutex<HashMap<String, Conversation>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            conversations: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn append(&self, message: NewMessage) -> Result<StoredMessage, ApiError> {
        let stored = StoredMessage {
            id: StoredMessage::generate(),
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            content: message.content,
            message_type: message.message_type,
            status: "delivered".to_string(),
            sent_at: Utc::now(),
        };

        let mut conversations = self.conversations.lock();
        let conversation = conversations
            .entry(stored.conversation_id.clone())
            .or_insert_with(|| Conversation {
                messages: Vec::new(),
                summary: ConversationSummary {
                    conversation_id: stored.conversation_id.clone(),
                    last_message: None,
                    last_message_time: None,
                    message_count: 0,
                    unread_count: 0,
                },
            });
        conversation.messages.push(stored.clone());
        conversation.summary.last_message = Some(stored.content.clone());
        conversation.summary.last_message_time = Some(stored.sent_at);
        conversation.summary.message_count += 1;
        conversation.summary.unread_count += 1;

        Ok(stored)
    }

    async fn history(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, ApiError> {
        let conversations = self.conversations.lock();
        let Some(conversation) = conversations.get(conversation_id) else {
            return Ok(Vec::new());
        };
        let skip = conversation.messages.len().saturating_sub(limit);
        Ok(conversation.messages[skip..].to_vec())
    }

    async fn conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ConversationSummary>, ApiError> {
        Ok(self
            .conversations
            .lock()
            .get(conversation_id)
            .map(|c| c.summary.clone()))
    }
}
