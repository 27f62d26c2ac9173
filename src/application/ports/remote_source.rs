use crate::domain::filters::QueryDescriptor;
use crate::domain::value_objects::{Collection, EntityKey};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Remote backend unavailable: {0}")]
    Unavailable(String),

    #[error("Remote document missing: {collection}/{key}")]
    Missing { collection: String, key: String },

    #[error("Remote transaction aborted: {0}")]
    TransactionAborted(String),

    #[error("Remote stream closed")]
    StreamClosed,

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// リモートへの書き込み1件。`transact` でまとめて原子的に適用できる。
///
/// `ArrayAppend` は集合的追加（既存なら何もしない）、`Increment` は
/// 整数フィールドへの加算。`field` は `votes.opt1` のようなドット区切りの
/// ネストパスを許す。
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteWrite {
    Put {
        collection: Collection,
        key: EntityKey,
        doc: Value,
    },
    Merge {
        collection: Collection,
        key: EntityKey,
        patch: Value,
    },
    Delete {
        collection: Collection,
        key: EntityKey,
    },
    ArrayAppend {
        collection: Collection,
        key: EntityKey,
        field: String,
        value: Value,
    },
    ArrayRemove {
        collection: Collection,
        key: EntityKey,
        field: String,
        value: Value,
    },
    Increment {
        collection: Collection,
        key: EntityKey,
        field: String,
        delta: i64,
    },
}

impl RemoteWrite {
    pub fn collection(&self) -> Collection {
        match self {
            RemoteWrite::Put { collection, .. }
            | RemoteWrite::Merge { collection, .. }
            | RemoteWrite::Delete { collection, .. }
            | RemoteWrite::ArrayAppend { collection, .. }
            | RemoteWrite::ArrayRemove { collection, .. }
            | RemoteWrite::Increment { collection, .. } => *collection,
        }
    }

    pub fn key(&self) -> &EntityKey {
        match self {
            RemoteWrite::Put { key, .. }
            | RemoteWrite::Merge { key, .. }
            | RemoteWrite::Delete { key, .. }
            | RemoteWrite::ArrayAppend { key, .. }
            | RemoteWrite::ArrayRemove { key, .. }
            | RemoteWrite::Increment { key, .. } => key,
        }
    }

    /// 現在のドキュメントへこの書き込みを適用した結果を返す。
    /// `Ok(None)` は削除。`Delete` 以外は対象ドキュメントの存在を要求する
    /// （`Put` を除く）。
    pub fn apply(&self, current: Option<&Value>) -> RemoteResult<Option<Value>> {
        let missing = || RemoteError::Missing {
            collection: self.collection().to_string(),
            key: self.key().to_string(),
        };

        match self {
            RemoteWrite::Put { doc, .. } => Ok(Some(doc.clone())),
            RemoteWrite::Delete { .. } => Ok(None),
            RemoteWrite::Merge { patch, .. } => {
                let mut doc = current.ok_or_else(missing)?.clone();
                merge_fields(&mut doc, patch)?;
                Ok(Some(doc))
            }
            RemoteWrite::ArrayAppend { field, value, .. } => {
                let mut doc = current.ok_or_else(missing)?.clone();
                let slot = field_slot(&mut doc, field)?;
                match slot {
                    Value::Null => *slot = Value::Array(vec![value.clone()]),
                    Value::Array(items) => {
                        if !items.contains(value) {
                            items.push(value.clone());
                        }
                    }
                    _ => {
                        return Err(RemoteError::Internal(format!(
                            "field {field} is not an array"
                        )));
                    }
                }
                Ok(Some(doc))
            }
            RemoteWrite::ArrayRemove { field, value, .. } => {
                let mut doc = current.ok_or_else(missing)?.clone();
                let slot = field_slot(&mut doc, field)?;
                if let Value::Array(items) = slot {
                    items.retain(|item| item != value);
                }
                Ok(Some(doc))
            }
            RemoteWrite::Increment { field, delta, .. } => {
                let mut doc = current.ok_or_else(missing)?.clone();
                let slot = field_slot(&mut doc, field)?;
                let base = slot.as_i64().unwrap_or(0);
                *slot = Value::from(base + delta);
                Ok(Some(doc))
            }
        }
    }
}

/// `votes.opt1` のようなドット区切りパスの位置を返す。
/// 途中のオブジェクトは無ければ作る。
fn field_slot<'a>(doc: &'a mut Value, path: &str) -> RemoteResult<&'a mut Value> {
    let mut current = doc;
    for part in path.split('.') {
        let object = current.as_object_mut().ok_or_else(|| {
            RemoteError::Internal(format!("path {path} does not traverse an object"))
        })?;
        current = object.entry(part.to_string()).or_insert(Value::Null);
    }
    Ok(current)
}

/// 与えられたフィールドだけを上書きする浅いマージ。
fn merge_fields(doc: &mut Value, patch: &Value) -> RemoteResult<()> {
    let target = doc
        .as_object_mut()
        .ok_or_else(|| RemoteError::Internal("merge target is not an object".to_string()))?;
    let fields = patch
        .as_object()
        .ok_or_else(|| RemoteError::Internal("merge patch is not an object".to_string()))?;
    for (field, value) in fields {
        target.insert(field.clone(), value.clone());
    }
    Ok(())
}

/// リモート購読が流すスナップショット。常に全件入れ替え。
pub type RemoteSnapshot = RemoteResult<Vec<Value>>;

/// ライブ購読のハンドル。キャンセルは冪等で、`Drop` でも必ず解除される。
pub struct RemoteSubscription {
    rx: mpsc::Receiver<RemoteSnapshot>,
    canceller: Option<Box<dyn FnOnce() + Send>>,
}

impl RemoteSubscription {
    pub fn new(
        rx: mpsc::Receiver<RemoteSnapshot>,
        canceller: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            rx,
            canceller: Some(Box::new(canceller)),
        }
    }

    /// 次のスナップショットを待つ。購読が終了していたら `None`。
    pub async fn next(&mut self) -> Option<RemoteSnapshot> {
        self.rx.recv().await
    }

    /// バックエンド側のリスナーを解除する。2回目以降は何もしない。
    pub fn cancel(&mut self) {
        if let Some(canceller) = self.canceller.take() {
            canceller();
        }
    }
}

impl Drop for RemoteSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// バックエンド（システム・オブ・レコード)への抽象。
///
/// すべての操作は失敗し得るし、応答が返らないこともある。
/// 待ち時間の上限はリポジトリ側で課す。
#[async_trait]
pub trait RemoteDataSource: Send + Sync {
    /// クエリに一致する全件スナップショットのライブ購読を開く。
    async fn subscribe(&self, descriptor: QueryDescriptor) -> RemoteResult<RemoteSubscription>;

    /// 一度きりの問い合わせ。カスケード削除の子キー列挙に使う。
    async fn fetch(&self, descriptor: QueryDescriptor) -> RemoteResult<Vec<Value>>;

    /// 存在しないキーは `Ok(None)`。エラーとは区別される。
    async fn get(&self, collection: Collection, key: &EntityKey) -> RemoteResult<Option<Value>>;

    async fn put(
        &self,
        collection: Collection,
        key: &EntityKey,
        doc: Value,
    ) -> RemoteResult<()>;

    /// 与えたフィールドだけを上書きするマージ書き込み。
    async fn merge(
        &self,
        collection: Collection,
        key: &EntityKey,
        patch: Value,
    ) -> RemoteResult<()>;

    async fn delete(&self, collection: Collection, key: &EntityKey) -> RemoteResult<()>;

    /// 一連の書き込みを原子的に適用する。途中で失敗したら何も適用されない。
    async fn transact(&self, writes: Vec<RemoteWrite>) -> RemoteResult<()>;
}
