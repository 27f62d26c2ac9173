use crate::domain::value_objects::{Collection, EntityKey};
use crate::shared::error::AppError;
use serde_json::Value;

pub mod message;
pub mod poll;
pub mod profile;
pub mod serie;
pub mod streak;

pub use message::Message;
pub use poll::{Poll, PollOption};
pub use profile::Profile;
pub use serie::{GeoPoint, Serie};
pub use streak::StreakRecord;

/// ローカルストアとリモートの間を往復するエンティティのコーデック。
///
/// `decode` は欠損・不正なフィールドを黙ってデフォルト値で埋めず、
/// `DeserializationError` として呼び出し側へ返す。
pub trait CacheEntity: Clone + Send + Sync + 'static {
    fn collection() -> Collection;
    fn key(&self) -> EntityKey;
    fn encode(&self) -> Result<Value, AppError>;
    fn decode(doc: Value) -> Result<Self, AppError>;
}

pub(crate) fn decode_with<T: serde::de::DeserializeOwned>(
    collection: Collection,
    doc: Value,
) -> Result<T, AppError> {
    serde_json::from_value(doc)
        .map_err(|err| AppError::DeserializationError(format!("malformed {collection} document: {err}")))
}

pub(crate) fn encode_with<T: serde::Serialize>(
    collection: Collection,
    entity: &T,
) -> Result<Value, AppError> {
    serde_json::to_value(entity)
        .map_err(|err| AppError::SerializationError(format!("{collection} document: {err}")))
}
