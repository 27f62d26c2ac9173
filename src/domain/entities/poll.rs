use crate::domain::entities::{decode_with, encode_with, CacheEntity};
use crate::domain::value_objects::{Collection, ConversationId, EntityKey, UserId};
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollOption {
    pub id: String,
    pub label: String,
}

/// 会話内で実施される投票。
///
/// 票は選択肢 id をキーにした投票者 id の集合として持つ。
/// `votes.<option_id>` へのアトミックな配列追加/削除で更新される。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poll {
    pub id: EntityKey,
    pub conversation_id: ConversationId,
    pub author_id: UserId,
    pub question: String,
    pub options: Vec<PollOption>,
    #[serde(default)]
    pub votes: HashMap<String, Vec<UserId>>,
    #[serde(default)]
    pub closed: bool,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
}

impl Poll {
    pub fn new(
        conversation_id: ConversationId,
        author_id: UserId,
        question: String,
        options: Vec<PollOption>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EntityKey::generate(),
            conversation_id,
            author_id,
            question,
            options,
            votes: HashMap::new(),
            closed: false,
            created_at,
        }
    }

    pub fn has_option(&self, option_id: &str) -> bool {
        self.options.iter().any(|option| option.id == option_id)
    }

    pub fn voters(&self, option_id: &str) -> &[UserId] {
        self.votes
            .get(option_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

impl CacheEntity for Poll {
    fn collection() -> Collection {
        Collection::Polls
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
