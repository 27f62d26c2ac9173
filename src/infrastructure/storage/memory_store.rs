use crate::application::ports::local_store::{LocalStore, StorePredicate};
use crate::domain::value_objects::{Collection, EntityKey};
use crate::shared::error::AppError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

type DocTables = HashMap<Collection, HashMap<String, Value>>;

/// テスト・プレビュー用のインメモリなローカルストア。
/// 永続版と同じインターフェースを実装する。
#[derive(Default)]
pub struct MemoryLocalStore {
    tables: Arc<RwLock<DocTables>>,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    async fn upsert(
        &self,
        collection: Collection,
        key: &EntityKey,
        doc: Value,
    ) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        tables
            .entry(collection)
            .or_default()
            .insert(key.to_string(), doc);
        Ok(())
    }

    async fn upsert_batch(
        &self,
        collection: Collection,
        entries: Vec<(EntityKey, Value)>,
    ) -> Result<(), AppError> {
        // 1つの write ロックの下で適用し、途中状態を見せない
        let mut tables = self.tables.write().await;
        let table = tables.entry(collection).or_default();
        for (key, doc) in entries {
            table.insert(key.to_string(), doc);
        }
        Ok(())
    }

    async fn delete(&self, collection: Collection, key: &EntityKey) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        if let Some(table) = tables.get_mut(&collection) {
            table.remove(key.as_str());
        }
        Ok(())
    }

    async fn delete_where(
        &self,
        collection: Collection,
        predicate: StorePredicate,
    ) -> Result<u64, AppError> {
        let mut tables = self.tables.write().await;
        let Some(table) = tables.get_mut(&collection) else {
            return Ok(0);
        };
        let before = table.len();
        table.retain(|_, doc| !predicate(doc));
        Ok((before - table.len()) as u64)
    }

    async fn list(
        &self,
        collection: Collection,
        predicate: StorePredicate,
    ) -> Result<Vec<Value>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(&collection)
            .map(|table| {
                table
                    .values()
                    .filter(|doc| predicate(doc))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get(
        &self,
        collection: Collection,
        key: &EntityKey,
    ) -> Result<Option<Value>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(&collection)
            .and_then(|table| table.get(key.as_str()))
            .cloned())
    }
}
