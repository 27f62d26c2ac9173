use crate::domain::entities::{decode_with, encode_with, CacheEntity};
use crate::domain::value_objects::{Collection, ConversationId, EntityKey, UserId};
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 会話に属する1件のメッセージ。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: EntityKey,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub text: String,
    #[serde(default)]
    pub read_by: Vec<UserId>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub sent_at: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub edited_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(
        conversation_id: ConversationId,
        sender_id: UserId,
        text: String,
        sent_at: DateTime<Utc>,
    ) -> Self {
        let read_by = vec![sender_id.clone()];
        Self {
            id: EntityKey::generate(),
            conversation_id,
            sender_id,
            text,
            read_by,
            sent_at,
            edited_at: None,
        }
    }

    pub fn is_read_by(&self, user: &UserId) -> bool {
        self.read_by.contains(user)
    }
}

impl CacheEntity for Message {
    fn collection() -> Collection {
        Collection::Messages
    }

    fn key(&self) -> EntityKey {
        self.id.clone()
    }

    fn encode(&self) -> Result<Value, AppError> {
        encode_with(Self::collection(), self)
    }

    fn decode(doc: Value) -> Result<Self, AppError> {
        decode_with(Self::collection(), doc)
    }
}
