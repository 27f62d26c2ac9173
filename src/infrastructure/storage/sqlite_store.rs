use crate::application::ports::local_store::{LocalStore, StorePredicate};
use crate::domain::value_objects::{Collection, EntityKey};
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::{Pool, Sqlite};

use super::rows::StoredDocRow;

/// SQLite 上のローカルストア。コレクションごとに1テーブル、
/// 主キーはドメイン id、ペイロードは JSON 文字列。
pub struct SqliteLocalStore {
    pool: Pool<Sqlite>,
}

impl SqliteLocalStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn initialize_schema(pool: &Pool<Sqlite>) -> Result<(), AppError> {
        for collection in Collection::ALL {
            let sql = format!(
                r#"
                CREATE TABLE IF NOT EXISTS {} (
                    id TEXT PRIMARY KEY,
                    doc TEXT NOT NULL,
                    updated_at INTEGER NOT NULL
                )
                "#,
                collection.table_name()
            );
            sqlx::query(&sql).execute(pool).await?;
        }
        Ok(())
    }

    fn parse_doc(collection: Collection, id: &str, raw: &str) -> Option<Value> {
        match serde_json::from_str(raw) {
            Ok(doc) => Some(doc),
            Err(err) => {
                tracing::warn!("Skipping corrupt cache row {}/{}: {}", collection, id, err);
                None
            }
        }
    }
}

#[async_trait]
impl LocalStore for SqliteLocalStore {
    async fn upsert(
        &self,
        collection: Collection,
        key: &EntityKey,
        doc: Value,
    ) -> Result<(), AppError> {
        let sql = format!(
            r#"
            INSERT INTO {} (id, doc, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                doc = excluded.doc,
                updated_at = excluded.updated_at
            "#,
            collection.table_name()
        );
        sqlx::query(&sql)
            .bind(key.as_str())
            .bind(doc.to_string())
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_batch(
        &self,
        collection: Collection,
        entries: Vec<(EntityKey, Value)>,
    ) -> Result<(), AppError> {
        if entries.is_empty() {
            return Ok(());
        }

        let sql = format!(
            r#"
            INSERT INTO {} (id, doc, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                doc = excluded.doc,
                updated_at = excluded.updated_at
            "#,
            collection.table_name()
        );
        let now = Utc::now().timestamp();

        let mut tx = self.pool.begin().await?;
        for (key, doc) in entries {
            sqlx::query(&sql)
                .bind(key.as_str())
                .bind(doc.to_string())
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, collection: Collection, key: &EntityKey) -> Result<(), AppError> {
        let sql = format!("DELETE FROM {} WHERE id = ?1", collection.table_name());
        sqlx::query(&sql)
            .bind(key.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_where(
        &self,
        collection: Collection,
        predicate: StorePredicate,
    ) -> Result<u64, AppError> {
        let select = format!("SELECT id, doc FROM {}", collection.table_name());
        let rows = sqlx::query_as::<_, StoredDocRow>(&select)
            .fetch_all(&self.pool)
            .await?;

        let matching: Vec<String> = rows
            .into_iter()
            .filter_map(|row| {
                Self::parse_doc(collection, &row.id, &row.doc)
                    .filter(|doc| predicate(doc))
                    .map(|_| row.id)
            })
            .collect();

        if matching.is_empty() {
            return Ok(0);
        }

        let delete = format!("DELETE FROM {} WHERE id = ?1", collection.table_name());
        let mut tx = self.pool.begin().await?;
        for id in &matching {
            sqlx::query(&delete).bind(id).execute(&mut *tx).await?;
        }
        tx.commit().await?;

        Ok(matching.len() as u64)
    }

    async fn list(
        &self,
        collection: Collection,
        predicate: StorePredicate,
    ) -> Result<Vec<Value>, AppError> {
        let sql = format!("SELECT id, doc FROM {}", collection.table_name());
        let rows = sqlx::query_as::<_, StoredDocRow>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| Self::parse_doc(collection, &row.id, &row.doc))
            .filter(|doc| predicate(doc))
            .collect())
    }

    async fn get(
        &self,
        collection: Collection,
        key: &EntityKey,
    ) -> Result<Option<Value>, AppError> {
        let sql = format!("SELECT id, doc FROM {} WHERE id = ?1", collection.table_name());
        let row = sqlx::query_as::<_, StoredDocRow>(&sql)
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.and_then(|row| Self::parse_doc(collection, &row.id, &row.doc)))
    }
}
