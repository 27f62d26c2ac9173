use crate::application::ports::remote_source::{
    RemoteDataSource, RemoteError, RemoteResult, RemoteSnapshot, RemoteSubscription, RemoteWrite,
};
use crate::domain::filters::QueryDescriptor;
use crate::domain::value_objects::{Collection, EntityKey};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

const SUBSCRIBER_BUFFER: usize = 64;

type DocTables = HashMap<Collection, BTreeMap<String, Value>>;

struct RemoteSubscriber {
    descriptor: QueryDescriptor,
    tx: mpsc::Sender<RemoteSnapshot>,
}

/// インメモリのリモートデータソース。
///
/// 書き込みが確定するたびに、該当コレクションの購読者へ全件
/// スナップショットを再送する。テストでは `set_stalled` で push を
/// 止めてタイムアウト経路を、`fail_next` で失敗経路を再現できる。
///
/// 購読解除を同期的に行うため、内部状態は std の同期プリミティブで持つ。
/// どの操作もロックを await越しに保持しない。
pub struct MemoryRemoteDataSource {
    tables: Arc<Mutex<DocTables>>,
    subscribers: Arc<Mutex<HashMap<u64, RemoteSubscriber>>>,
    next_subscription_id: Arc<AtomicU64>,
    stalled: Arc<AtomicBool>,
    fail_next: Arc<Mutex<Option<RemoteError>>>,
}

impl Default for MemoryRemoteDataSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemoteDataSource {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(Mutex::new(HashMap::new())),
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            next_subscription_id: Arc::new(AtomicU64::new(1)),
            stalled: Arc::new(AtomicBool::new(false)),
            fail_next: Arc::new(Mutex::new(None)),
        }
    }

    /// push を止めて購読をストールさせる。解除時は滞っていた分を送り直す。
    pub fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
        if !stalled {
            let affected: Vec<Collection> = {
                let subscribers = lock(&self.subscribers);
                let mut collections = Vec::new();
                for subscriber in subscribers.values() {
                    if !collections.contains(&subscriber.descriptor.collection) {
                        collections.push(subscriber.descriptor.collection);
                    }
                }
                collections
            };
            for collection in affected {
                self.notify_collection(collection);
            }
        }
    }

    /// 次の1操作を指定のエラーで失敗させる。
    pub fn fail_next(&self, error: RemoteError) {
        *lock(&self.fail_next) = Some(error);
    }

    /// 購読者へエラーを1件流す。読み取り経路の非タイムアウト異常の再現用。
    pub fn emit_error(&self, error: RemoteError) {
        let subscribers = lock(&self.subscribers);
        for subscriber in subscribers.values() {
            let _ = subscriber.tx.try_send(Err(RemoteError::Internal(error.to_string())));
        }
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }

    /// テストのシード投入用。購読者への通知も行う。
    pub fn seed(&self, collection: Collection, key: &EntityKey, doc: Value) {
        lock(&self.tables)
            .entry(collection)
            .or_default()
            .insert(key.to_string(), doc);
        self.notify_collection(collection);
    }

    fn take_failure(&self) -> RemoteResult<()> {
        match lock(&self.fail_next).take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn snapshot_for(tables: &DocTables, descriptor: &QueryDescriptor) -> Vec<Value> {
        tables
            .get(&descriptor.collection)
            .map(|table| {
                table
                    .values()
                    .filter(|doc| descriptor.matches(doc))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn notify_collection(&self, collection: Collection) {
        if self.stalled.load(Ordering::SeqCst) {
            return;
        }

        let tables = lock(&self.tables);
        let mut subscribers = lock(&self.subscribers);
        subscribers.retain(|id, subscriber| {
            if subscriber.descriptor.collection != collection {
                return true;
            }
            let snapshot = Self::snapshot_for(&tables, &subscriber.descriptor);
            match subscriber.tx.try_send(Ok(snapshot)) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Closed(_)) => false,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!("Remote subscriber {} is lagging, dropping snapshot", id);
                    true
                }
            }
        });
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl RemoteDataSource for MemoryRemoteDataSource {
    async fn subscribe(&self, descriptor: QueryDescriptor) -> RemoteResult<RemoteSubscription> {
        self.take_failure()?;

        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = self.next_subscription_id.fetch_add(1, Ordering::Relaxed);

        if !self.stalled.load(Ordering::SeqCst) {
            let tables = lock(&self.tables);
            let _ = tx.try_send(Ok(Self::snapshot_for(&tables, &descriptor)));
        }

        lock(&self.subscribers).insert(id, RemoteSubscriber { descriptor, tx });

        let subscribers = Arc::clone(&self.subscribers);
        Ok(RemoteSubscription::new(rx, move || {
            lock(&subscribers).remove(&id);
        }))
    }

    async fn fetch(&self, descriptor: QueryDescriptor) -> RemoteResult<Vec<Value>> {
        self.take_failure()?;
        let tables = lock(&self.tables);
        Ok(Self::snapshot_for(&tables, &descriptor))
    }

    async fn get(&self, collection: Collection, key: &EntityKey) -> RemoteResult<Option<Value>> {
        self.take_failure()?;
        Ok(lock(&self.tables)
            .get(&collection)
            .and_then(|table| table.get(key.as_str()))
            .cloned())
    }

    async fn put(
        &self,
        collection: Collection,
        key: &EntityKey,
        doc: Value,
    ) -> RemoteResult<()> {
        self.transact(vec![RemoteWrite::Put {
            collection,
            key: key.clone(),
            doc,
        }])
        .await
    }

    async fn merge(
        &self,
        collection: Collection,
        key: &EntityKey,
        patch: Value,
    ) -> RemoteResult<()> {
        self.transact(vec![RemoteWrite::Merge {
            collection,
            key: key.clone(),
            patch,
        }])
        .await
    }

    async fn delete(&self, collection: Collection, key: &EntityKey) -> RemoteResult<()> {
        self.transact(vec![RemoteWrite::Delete {
            collection,
            key: key.clone(),
        }])
        .await
    }

    async fn transact(&self, writes: Vec<RemoteWrite>) -> RemoteResult<()> {
        self.take_failure()?;

        let mut affected: Vec<Collection> = Vec::new();
        {
            let mut tables = lock(&self.tables);

            // 全書き込みをコピーへ適用してから差し替える。途中で失敗したら
            // 元の状態は触らない
            let mut staged = tables.clone();
            for write in &writes {
                let collection = write.collection();
                let key = write.key().to_string();
                let table = staged.entry(collection).or_default();
                match write.apply(table.get(&key))? {
                    Some(doc) => {
                        table.insert(key, doc);
                    }
                    None => {
                        table.remove(&key);
                    }
                }
                if !affected.contains(&collection) {
                    affected.push(collection);
                }
            }
            *tables = staged;
        }

        for collection in affected {
            self.notify_collection(collection);
        }
        Ok(())
    }
}
