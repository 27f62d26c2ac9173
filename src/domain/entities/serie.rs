use crate::domain::entities::{decode_with, encode_with, CacheEntity};
use crate::domain::value_objects::{Collection, EntityKey, GroupId, UserId};
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// グループが開催するイベントシリーズの1回分。
///
/// 時間窓は `starts_at <= now < ends_at` を「開催中」とする閉開区間で扱う。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Serie {
    pub id: EntityKey,
    pub group_id: GroupId,
    pub owner_id: UserId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub participant_ids: Vec<UserId>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub starts_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub ends_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
}

impl Serie {
    pub fn has_participant(&self, user: &UserId) -> bool {
        self.participant_ids.contains(user)
    }

    /// 開催中かどうか。`starts_at <= now < ends_at`。
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.starts_at <= now && now < self.ends_at
    }

    pub fn is_upcoming(&self, now: DateTime<Utc>) -> bool {
        self.starts_at > now
    }

    pub fn is_finished(&self, now: DateTime<Utc>) -> bool {
        self.ends_at <= now
    }
}

impl CacheEntity for Serie {
    fn collection() -> Collection {
        Collection::Series
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
