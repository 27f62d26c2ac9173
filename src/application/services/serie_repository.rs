use crate::application::ports::remote_source::RemoteWrite;
use crate::application::services::cached_repository::{CachedRepository, EntityWatch};
use crate::domain::entities::{GeoPoint, Serie};
use crate::domain::filters::SerieFilter;
use crate::domain::value_objects::{Collection, EntityKey, UserId};
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

/// シリーズ更新のマージパッチ。指定したフィールドだけが上書きされる。
#[derive(Debug, Clone, Default, Serialize)]
pub struct SeriePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_seconds_option"
    )]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_seconds_option"
    )]
    pub ends_at: Option<DateTime<Utc>>,
}

/// イベントシリーズの読み書き。
pub struct SerieRepository {
    core: CachedRepository,
}

impl SerieRepository {
    pub fn new(core: CachedRepository) -> Self {
        Self { core }
    }

    /// 画面別の名前付きフィルタでライブ購読を開く。
    pub fn observe(&self, filter: SerieFilter) -> EntityWatch<Serie> {
        self.core.observe(filter)
    }

    pub async fn get(&self, id: &EntityKey) -> Result<Option<Serie>, AppError> {
        self.core.get(id).await
    }

    pub async fn create(&self, serie: &Serie) -> Result<(), AppError> {
        if serie.ends_at <= serie.starts_at {
            return Err(AppError::ValidationError(
                "Serie must end after it starts".to_string(),
            ));
        }
        self.core.save(serie).await
    }

    pub async fn update(&self, id: &EntityKey, patch: SeriePatch) -> Result<(), AppError> {
        let patch = serde_json::to_value(&patch)?;
        self.core.merge::<Serie>(id, patch).await
    }

    pub async fn delete(&self, id: &EntityKey) -> Result<(), AppError> {
        self.core.delete::<Serie>(id).await
    }

    pub async fn join(&self, id: &EntityKey, user: &UserId) -> Result<(), AppError> {
        self.core
            .transact(vec![RemoteWrite::ArrayAppend {
                collection: Collection::Series,
                key: id.clone(),
                field: "participant_ids".into(),
                value: json!(user.as_str()),
            }])
            .await
    }

    pub async fn leave(&self, id: &EntityKey, user: &UserId) -> Result<(), AppError> {
        self.core
            .transact(vec![RemoteWrite::ArrayRemove {
                collection: Collection::Series,
                key: id.clone(),
                field: "participant_ids".into(),
                value: json!(user.as_str()),
            }])
            .await
    }
}
