use crate::domain::entities::{decode_with, encode_with, CacheEntity};
use crate::domain::value_objects::{Collection, EntityKey, UserId};
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// ユーザープロフィール。主キーはユーザー id。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    pub display_name: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub follower_count: i64,
    #[serde(default)]
    pub following_count: i64,
    #[serde(default)]
    pub following_ids: Vec<UserId>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn new(id: UserId, display_name: String, updated_at: DateTime<Utc>) -> Self {
        Self {
            id,
            display_name,
            bio: None,
            avatar_url: None,
            follower_count: 0,
            following_count: 0,
            following_ids: Vec::new(),
            updated_at,
        }
    }

    pub fn is_following(&self, user: &UserId) -> bool {
        self.following_ids.contains(user)
    }
}

impl CacheEntity for Profile {
    fn collection() -> Collection {
        Collection::Profiles
    }

    fn key(&self) -> EntityKey {
        EntityKey::new(self.id.to_string()).expect("user id is non-empty")
    }

    fn encode(&self) -> Result<Value, AppError> {
        encode_with(Self::collection(), self)
    }

    fn decode(doc: Value) -> Result<Self, AppError> {
        decode_with(Self::collection(), doc)
    }
}
