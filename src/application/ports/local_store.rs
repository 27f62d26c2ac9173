use crate::domain::value_objects::{Collection, EntityKey};
use crate::shared::error::AppError;
use async_trait::async_trait;
use serde_json::Value;

/// ローカルストアの問い合わせに使う述語。デコード済みドキュメントを受け取る。
pub type StorePredicate = Box<dyn Fn(&Value) -> bool + Send + Sync>;

/// 端末内の永続キャッシュ。コレクション × 主キーで1ドキュメントを保持する。
///
/// バッチ書き込みは1つの論理単位として適用され、途中状態が
/// 後続の読み取りから観測されることはない。
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// 同じキーのエントリを置き換える。冪等。
    async fn upsert(
        &self,
        collection: Collection,
        key: &EntityKey,
        doc: Value,
    ) -> Result<(), AppError>;

    /// 複数エントリを単一トランザクションで置き換える。
    async fn upsert_batch(
        &self,
        collection: Collection,
        entries: Vec<(EntityKey, Value)>,
    ) -> Result<(), AppError>;

    /// 存在しないキーに対しては何もしない。
    async fn delete(&self, collection: Collection, key: &EntityKey) -> Result<(), AppError>;

    /// 述語に一致する全エントリを削除し、削除件数を返す。
    async fn delete_where(
        &self,
        collection: Collection,
        predicate: StorePredicate,
    ) -> Result<u64, AppError>;

    /// スナップショットを返す。順序付けは呼び出し側が行う。
    async fn list(
        &self,
        collection: Collection,
        predicate: StorePredicate,
    ) -> Result<Vec<Value>, AppError>;

    async fn get(
        &self,
        collection: Collection,
        key: &EntityKey,
    ) -> Result<Option<Value>, AppError>;
}
