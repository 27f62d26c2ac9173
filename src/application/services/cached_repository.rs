use crate::application::ports::connectivity::ConnectivityMonitor;
use crate::application::ports::local_store::{LocalStore, StorePredicate};
use crate::application::ports::remote_source::{
    RemoteDataSource, RemoteError, RemoteSnapshot, RemoteSubscription, RemoteWrite,
};
use crate::domain::entities::CacheEntity;
use crate::domain::filters::{EntityFilter, QueryDescriptor};
use crate::domain::value_objects::{Collection, EntityKey};
use crate::shared::config::SyncConfig;
use crate::shared::error::AppError;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::error::Elapsed;

/// 読み取り購読のハンドル。
///
/// `next` は新しい結果列が出るたびに返す。キャンセル（または Drop）で
/// 購読タスクごと止まり、以降この購読に起因するローカル書き込みや
/// リモート呼び出しは発生しない。
pub struct EntityWatch<E> {
    rx: mpsc::UnboundedReceiver<Vec<E>>,
    task: JoinHandle<()>,
}

impl<E> EntityWatch<E> {
    pub async fn next(&mut self) -> Option<Vec<E>> {
        self.rx.recv().await
    }

    pub fn cancel(&self) {
        self.task.abort();
    }
}

impl<E> Drop for EntityWatch<E> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// UI 側で combinator を使えるよう `Stream` としても振る舞う。
impl<E> futures::Stream for EntityWatch<E> {
    type Item = Vec<E>;

    fn poll_next(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

/// キャッシュ優先の同期リポジトリ本体。
///
/// 読み取りはまずローカルストアから返し、オンラインならリモート購読へ
/// 切り替える。書き込みはオンライン時のみ受け付け、リモートで確定した
/// 変更だけをキャッシュへ反映する。
#[derive(Clone)]
pub struct CachedRepository {
    remote: Arc<dyn RemoteDataSource>,
    local: Arc<dyn LocalStore>,
    connectivity: Arc<dyn ConnectivityMonitor>,
    config: SyncConfig,
}

enum LiveEvent {
    Connectivity(Option<bool>),
    Remote(Result<Option<RemoteSnapshot>, Elapsed>),
}

impl CachedRepository {
    pub fn new(
        remote: Arc<dyn RemoteDataSource>,
        local: Arc<dyn LocalStore>,
        connectivity: Arc<dyn ConnectivityMonitor>,
        config: SyncConfig,
    ) -> Self {
        Self {
            remote,
            local,
            connectivity,
            config,
        }
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    pub fn local(&self) -> Arc<dyn LocalStore> {
        Arc::clone(&self.local)
    }

    pub(crate) fn ensure_online(&self) -> Result<(), AppError> {
        if self.connectivity.is_online() {
            Ok(())
        } else {
            Err(AppError::Offline)
        }
    }

    /// 読み取り購読を開く。即座にキャッシュのスナップショットを流し、
    /// 接続状態に応じてリモート購読へ昇格・降格する。
    pub fn observe<F: EntityFilter>(&self, filter: F) -> EntityWatch<F::Entity> {
        let (tx, rx) = mpsc::unbounded_channel();
        let remote = Arc::clone(&self.remote);
        let local = Arc::clone(&self.local);
        let connectivity = Arc::clone(&self.connectivity);
        let timeout = self.config.remote_timeout();

        let task = tokio::spawn(async move {
            // INIT: ネットワーク状態に関係なく、まずキャッシュから返す
            let initial = cache_snapshot(&local, &filter).await.unwrap_or_else(|err| {
                tracing::warn!("Cache read failed on subscribe: {}", err);
                Vec::new()
            });
            if tx.send(initial).is_err() {
                return;
            }

            let mut connectivity_rx = connectivity.observe();
            let mut remote_sub: Option<RemoteSubscription> = None;
            let mut degraded = false;
            let mut first_event = true;

            loop {
                let event = match remote_sub.as_mut() {
                    Some(sub) => tokio::select! {
                        state = connectivity_rx.next() => LiveEvent::Connectivity(state),
                        emission = tokio::time::timeout(timeout, sub.next()) => {
                            LiveEvent::Remote(emission)
                        }
                    },
                    None => LiveEvent::Connectivity(connectivity_rx.next().await),
                };

                match event {
                    LiveEvent::Connectivity(None) => break,
                    LiveEvent::Connectivity(Some(true)) => {
                        first_event = false;
                        degraded = false;
                        match tokio::time::timeout(
                            timeout,
                            remote.subscribe(filter.descriptor(Utc::now())),
                        )
                        .await
                        {
                            Ok(Ok(sub)) => remote_sub = Some(sub),
                            Ok(Err(err)) => {
                                tracing::warn!("Remote subscribe failed: {}", err);
                            }
                            Err(_) => {
                                degraded = true;
                                if !emit_cache(&local, &filter, &tx).await {
                                    break;
                                }
                            }
                        }
                    }
                    LiveEvent::Connectivity(Some(false)) => {
                        if let Some(mut sub) = remote_sub.take() {
                            sub.cancel();
                        }
                        degraded = false;
                        // 初回イベントがオフラインの場合は INIT の emission が
                        // そのままキャッシュスナップショットなので重ねて流さない
                        if !first_event && !emit_cache(&local, &filter, &tx).await {
                            break;
                        }
                        first_event = false;
                    }
                    LiveEvent::Remote(Ok(Some(Ok(docs)))) => {
                        degraded = false;
                        let mut decoded = Vec::with_capacity(docs.len());
                        for doc in docs {
                            match F::Entity::decode(doc.clone()) {
                                Ok(entity) => decoded.push((entity, doc)),
                                Err(err) => tracing::warn!("Skipping remote document: {}", err),
                            }
                        }
                        decoded.sort_by(|a, b| filter.compare(&a.0, &b.0));

                        let entities: Vec<F::Entity> =
                            decoded.iter().map(|(entity, _)| entity.clone()).collect();
                        if tx.send(entities).is_err() {
                            break;
                        }

                        // 呼び出し側への emission を待たせずに書き戻す
                        let entries: Vec<(EntityKey, Value)> = decoded
                            .into_iter()
                            .map(|(entity, doc)| (entity.key(), doc))
                            .collect();
                        if let Err(err) = local
                            .upsert_batch(F::Entity::collection(), entries)
                            .await
                        {
                            tracing::warn!("Cache write-through failed: {}", err);
                        }
                    }
                    LiveEvent::Remote(Ok(Some(Err(err)))) => {
                        // 直前に流した結果のほうが新しい可能性があるため、
                        // キャッシュを流し直さず現状維持とする
                        tracing::warn!("Remote subscription error: {}", err);
                    }
                    LiveEvent::Remote(Ok(None)) => {
                        tracing::warn!("Remote subscription closed by backend");
                        remote_sub = None;
                    }
                    LiveEvent::Remote(Err(_)) => {
                        if !degraded {
                            degraded = true;
                            if !emit_cache(&local, &filter, &tx).await {
                                break;
                            }
                        }
                    }
                }
            }
        });

        EntityWatch { rx, task }
    }

    /// 単発読み取り。キャッシュ優先で、無ければオンライン時のみ
    /// リモートへ問い合わせて書き戻す。存在しないキーは `Ok(None)`。
    pub async fn get<E: CacheEntity>(&self, key: &EntityKey) -> Result<Option<E>, AppError> {
        if let Some(doc) = self.local.get(E::collection(), key).await? {
            return E::decode(doc).map(Some);
        }

        if !self.connectivity.is_online() {
            return Ok(None);
        }

        match self.remote.get(E::collection(), key).await? {
            Some(doc) => {
                let entity = E::decode(doc.clone())?;
                self.local.upsert(E::collection(), key, doc).await?;
                Ok(Some(entity))
            }
            None => Ok(None),
        }
    }

    /// リモートの権威ドキュメントを読む。書き込み前の事前条件チェック用。
    pub async fn get_remote<E: CacheEntity>(
        &self,
        key: &EntityKey,
    ) -> Result<Option<E>, AppError> {
        self.ensure_online()?;
        match self.remote.get(E::collection(), key).await? {
            Some(doc) => E::decode(doc).map(Some),
            None => Ok(None),
        }
    }

    /// エンティティ全体の作成・置き換え。
    pub async fn save<E: CacheEntity>(&self, entity: &E) -> Result<(), AppError> {
        self.ensure_online()?;
        let key = entity.key();
        let doc = entity.encode()?;
        self.remote.put(E::collection(), &key, doc.clone()).await?;
        self.local.upsert(E::collection(), &key, doc).await?;
        Ok(())
    }

    /// 与えたフィールドだけを上書きするマージ更新。
    pub async fn merge<E: CacheEntity>(
        &self,
        key: &EntityKey,
        patch: Value,
    ) -> Result<(), AppError> {
        self.ensure_online()?;
        self.remote
            .merge(E::collection(), key, patch.clone())
            .await?;
        self.mirror_writes(vec![RemoteWrite::Merge {
            collection: E::collection(),
            key: key.clone(),
            patch,
        }])
        .await
    }

    pub async fn delete<E: CacheEntity>(&self, key: &EntityKey) -> Result<(), AppError> {
        self.ensure_online()?;
        self.remote.delete(E::collection(), key).await?;
        self.local.delete(E::collection(), key).await?;
        Ok(())
    }

    /// 一連の書き込みをリモートで原子的に確定させ、同じ変更を
    /// キャッシュへ1つの論理単位として反映する。
    pub async fn transact(&self, writes: Vec<RemoteWrite>) -> Result<(), AppError> {
        self.ensure_online()?;
        self.remote.transact(writes.clone()).await?;
        self.mirror_writes(writes).await
    }

    /// 一度きりのリモート問い合わせ。カスケード削除の子キー列挙に使う。
    pub async fn fetch_remote(
        &self,
        descriptor: QueryDescriptor,
    ) -> Result<Vec<Value>, AppError> {
        self.ensure_online()?;
        Ok(self.remote.fetch(descriptor).await?)
    }

    /// 述語に一致するキャッシュエントリを削除する。
    pub async fn delete_where_local(
        &self,
        collection: Collection,
        predicate: StorePredicate,
    ) -> Result<u64, AppError> {
        self.local.delete_where(collection, predicate).await
    }

    /// リモートで確定済みの書き込み列をキャッシュへ反映する。
    ///
    /// キャッシュに無いドキュメントへの部分更新は、次のリモート push に
    /// 任せてスキップする。
    async fn mirror_writes(&self, writes: Vec<RemoteWrite>) -> Result<(), AppError> {
        let mut staged: HashMap<(Collection, EntityKey), Option<Value>> = HashMap::new();

        for write in writes {
            let collection = write.collection();
            let key = write.key().clone();
            let slot = (collection, key.clone());

            let current = match staged.get(&slot) {
                Some(doc) => doc.clone(),
                None => self.local.get(collection, &key).await?,
            };

            match write.apply(current.as_ref()) {
                Ok(next) => {
                    staged.insert(slot, next);
                }
                Err(RemoteError::Missing { .. }) => {
                    staged.remove(&slot);
                }
                Err(err) => {
                    tracing::warn!("Cache mirror skipped for {}/{}: {}", collection, key, err);
                }
            }
        }

        let mut upserts: HashMap<Collection, Vec<(EntityKey, Value)>> = HashMap::new();
        let mut deletes: Vec<(Collection, EntityKey)> = Vec::new();
        for ((collection, key), doc) in staged {
            match doc {
                Some(doc) => upserts.entry(collection).or_default().push((key, doc)),
                None => deletes.push((collection, key)),
            }
        }

        for (collection, entries) in upserts {
            self.local.upsert_batch(collection, entries).await?;
        }
        for (collection, key) in deletes {
            self.local.delete(collection, &key).await?;
        }
        Ok(())
    }
}

/// キャッシュからフィルタ済み・整列済みのスナップショットを読む。
async fn cache_snapshot<F: EntityFilter>(
    local: &Arc<dyn LocalStore>,
    filter: &F,
) -> Result<Vec<F::Entity>, AppError> {
    let now = Utc::now();
    let predicate_filter = filter.clone();
    let predicate: StorePredicate = Box::new(move |doc| {
        match F::Entity::decode(doc.clone()) {
            Ok(entity) => predicate_filter.matches(&entity, now),
            // 壊れたドキュメントは上で警告を出して除外する
            Err(_) => true,
        }
    });

    let docs = local.list(F::Entity::collection(), predicate).await?;
    let mut entities = Vec::with_capacity(docs.len());
    for doc in docs {
        match F::Entity::decode(doc) {
            Ok(entity) => entities.push(entity),
            Err(err) => tracing::warn!("Skipping cached document: {}", err),
        }
    }
    entities.sort_by(|a, b| filter.compare(a, b));
    Ok(entities)
}

/// キャッシュスナップショットを1回流す。送信先が閉じていたら `false`。
async fn emit_cache<F: EntityFilter>(
    local: &Arc<dyn LocalStore>,
    filter: &F,
    tx: &mpsc::UnboundedSender<Vec<F::Entity>>,
) -> bool {
    match cache_snapshot(local, filter).await {
        Ok(entities) => tx.send(entities).is_ok(),
        Err(err) => {
            tracing::warn!("Cache fallback read failed: {}", err);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Serie;
    use crate::domain::filters::SerieFilter;
    use crate::domain::value_objects::{GroupId, UserId};
    use crate::infrastructure::connectivity::{ConnectivityHandle, NetworkStatusMonitor};
    use crate::infrastructure::remote::MemoryRemoteDataSource;
    use crate::infrastructure::storage::MemoryLocalStore;
    use chrono::TimeZone;
    use serde_json::json;
    use std::time::Duration;

    fn setup(
        online: bool,
    ) -> (
        CachedRepository,
        Arc<MemoryRemoteDataSource>,
        Arc<MemoryLocalStore>,
        ConnectivityHandle,
    ) {
        let remote = Arc::new(MemoryRemoteDataSource::new());
        let local = Arc::new(MemoryLocalStore::new());
        let monitor = Arc::new(NetworkStatusMonitor::new(online));
        let handle = monitor.handle();
        let config = SyncConfig {
            remote_timeout_secs: 1,
            subscription_buffer: 64,
        };
        let repository = CachedRepository::new(
            Arc::clone(&remote) as Arc<dyn RemoteDataSource>,
            Arc::clone(&local) as Arc<dyn LocalStore>,
            monitor,
            config,
        );
        (repository, remote, local, handle)
    }

    fn serie(id: &str, participants: &[&str], starts_at: i64, ends_at: i64) -> Serie {
        Serie {
            id: EntityKey::new(id.into()).unwrap(),
            group_id: GroupId::new("g1".into()).unwrap(),
            owner_id: UserId::new("owner".into()).unwrap(),
            title: format!("serie {id}"),
            description: None,
            location: None,
            participant_ids: participants
                .iter()
                .map(|p| UserId::new((*p).into()).unwrap())
                .collect(),
            starts_at: Utc.timestamp_opt(starts_at, 0).unwrap(),
            ends_at: Utc.timestamp_opt(ends_at, 0).unwrap(),
            created_at: Utc.timestamp_opt(0, 0).unwrap(),
        }
    }

    fn overview() -> SerieFilter {
        SerieFilter::Overview(UserId::new("u1".into()).unwrap())
    }

    async fn expect_next(watch: &mut EntityWatch<Serie>) -> Vec<Serie> {
        tokio::time::timeout(Duration::from_secs(3), watch.next())
            .await
            .expect("emission expected")
            .expect("stream closed unexpectedly")
    }

    async fn expect_silence(watch: &mut EntityWatch<Serie>, wait: Duration) {
        let result = tokio::time::timeout(wait, watch.next()).await;
        assert!(result.is_err(), "unexpected emission: {:?}", result);
    }

    #[tokio::test]
    async fn test_observe_emits_cache_then_remote_snapshot() {
        let (repository, remote, _local, _handle) = setup(true);
        let a = serie("a", &["u1"], 1, 10);
        let b = serie("b", &["u1"], 2, 10);
        // 逆順にシードしても emission は開始時刻の昇順
        remote.seed(Collection::Series, &b.key(), b.encode().unwrap());
        remote.seed(Collection::Series, &a.key(), a.encode().unwrap());

        let mut watch = repository.observe(overview());

        assert_eq!(expect_next(&mut watch).await, Vec::<Serie>::new());
        let live = expect_next(&mut watch).await;
        assert_eq!(live.len(), 2);
        assert_eq!(live[0].id.as_str(), "a");
        assert_eq!(live[1].id.as_str(), "b");
    }

    #[tokio::test]
    async fn test_remote_snapshot_is_written_through_to_cache() {
        let (repository, remote, local, _handle) = setup(true);
        let a = serie("a", &["u1"], 1, 10);
        remote.seed(Collection::Series, &a.key(), a.encode().unwrap());

        let mut watch = repository.observe(overview());
        expect_next(&mut watch).await;
        expect_next(&mut watch).await;

        // emission は書き戻しを待たないため、少しだけ猶予を与える
        tokio::time::sleep(Duration::from_millis(50)).await;
        let cached = local.get(Collection::Series, &a.key()).await.unwrap();
        assert!(cached.is_some());
    }

    #[tokio::test]
    async fn test_offline_subscription_serves_cache_only() {
        let (repository, remote, local, _handle) = setup(false);
        let a = serie("a", &["u1"], 1, 10);
        local
            .upsert(Collection::Series, &a.key(), a.encode().unwrap())
            .await
            .unwrap();
        remote.seed(Collection::Series, &serie("b", &["u1"], 2, 10).key(), serie("b", &["u1"], 2, 10).encode().unwrap());

        let mut watch = repository.observe(overview());

        let cached = expect_next(&mut watch).await;
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].id.as_str(), "a");
        // オフラインのままリモート購読は開かれない
        expect_silence(&mut watch, Duration::from_millis(300)).await;
        assert_eq!(remote.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_going_online_upgrades_to_live_remote() {
        let (repository, remote, _local, handle) = setup(false);
        let a = serie("a", &["u1"], 1, 10);
        remote.seed(Collection::Series, &a.key(), a.encode().unwrap());

        let mut watch = repository.observe(overview());
        assert_eq!(expect_next(&mut watch).await, Vec::<Serie>::new());

        handle.set_online(true);

        let live = expect_next(&mut watch).await;
        assert_eq!(live.len(), 1);
        assert_eq!(remote.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_going_offline_tears_down_subscription_and_emits_cache() {
        let (repository, remote, _local, handle) = setup(true);
        let a = serie("a", &["u1"], 1, 10);
        remote.seed(Collection::Series, &a.key(), a.encode().unwrap());

        let mut watch = repository.observe(overview());
        expect_next(&mut watch).await;
        expect_next(&mut watch).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        handle.set_online(false);

        // 書き戻し済みのキャッシュからのスナップショット
        let cached = expect_next(&mut watch).await;
        assert_eq!(cached.len(), 1);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(remote.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_timeout_falls_back_to_cache_exactly_once() {
        let (repository, remote, local, _handle) = setup(true);
        remote.set_stalled(true);
        let a = serie("a", &["u1"], 1, 10);
        local
            .upsert(Collection::Series, &a.key(), a.encode().unwrap())
            .await
            .unwrap();

        let mut watch = repository.observe(overview());

        let initial = expect_next(&mut watch).await;
        assert_eq!(initial.len(), 1);

        // 購読はストールしているので、タイムアウト後にキャッシュへ退避する
        let fallback = expect_next(&mut watch).await;
        assert_eq!(fallback.len(), 1);

        // 以降のタイムアウトでは再 emission しない
        expect_silence(&mut watch, Duration::from_millis(2500)).await;
    }

    #[tokio::test]
    async fn test_remote_emission_resets_timeout_degradation() {
        let (repository, remote, _local, _handle) = setup(true);
        remote.set_stalled(true);

        let mut watch = repository.observe(overview());
        expect_next(&mut watch).await;
        // タイムアウトによる退避
        expect_next(&mut watch).await;

        remote.set_stalled(false);
        let a = serie("a", &["u1"], 1, 10);
        remote
            .put(Collection::Series, &a.key(), a.encode().unwrap())
            .await
            .unwrap();

        let live = expect_next(&mut watch).await;
        assert_eq!(live.len(), 1);
    }

    #[tokio::test]
    async fn test_remote_error_keeps_last_emission() {
        let (repository, remote, _local, _handle) = setup(true);
        let mut watch = repository.observe(overview());
        expect_next(&mut watch).await;
        expect_next(&mut watch).await;

        remote.emit_error(RemoteError::Unavailable("flaky backend".into()));

        // エラーではキャッシュを流し直さない
        expect_silence(&mut watch, Duration::from_millis(300)).await;

        let a = serie("a", &["u1"], 1, 10);
        remote
            .put(Collection::Series, &a.key(), a.encode().unwrap())
            .await
            .unwrap();
        let live = expect_next(&mut watch).await;
        assert_eq!(live.len(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_stops_all_activity() {
        let (repository, remote, local, _handle) = setup(true);
        let mut watch = repository.observe(overview());
        expect_next(&mut watch).await;
        expect_next(&mut watch).await;
        assert_eq!(remote.subscriber_count(), 1);

        watch.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(remote.subscriber_count(), 0);

        // キャンセル後のリモート更新はキャッシュへ書き戻されない
        let a = serie("a", &["u1"], 1, 10);
        remote
            .put(Collection::Series, &a.key(), a.encode().unwrap())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(local.get(Collection::Series, &a.key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_watch_works_as_a_stream() {
        use futures::StreamExt;

        let (repository, remote, _local, _handle) = setup(true);
        let a = serie("a", &["u1"], 1, 10);
        remote.seed(Collection::Series, &a.key(), a.encode().unwrap());

        let watch = repository.observe(overview());
        let emissions: Vec<Vec<Serie>> = watch.take(2).collect().await;

        assert!(emissions[0].is_empty());
        assert_eq!(emissions[1].len(), 1);
    }

    #[tokio::test]
    async fn test_dropping_watch_deregisters_subscription() {
        let (repository, remote, _local, _handle) = setup(true);
        let mut watch = repository.observe(overview());
        expect_next(&mut watch).await;
        assert_eq!(remote.subscriber_count(), 1);

        drop(watch);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(remote.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_read_your_writes_from_cache() {
        let (repository, _remote, _local, handle) = setup(true);
        let a = serie("a", &["u1"], 1, 10);

        repository.save(&a).await.unwrap();

        // 直後にオフラインへ落ちても書き込みはキャッシュから読める
        handle.set_online(false);
        let read: Option<Serie> = repository.get(&a.key()).await.unwrap();
        assert_eq!(read.unwrap().id.as_str(), "a");
    }

    #[tokio::test]
    async fn test_offline_writes_fail_fast_without_side_effects() {
        let (repository, remote, local, _handle) = setup(false);
        let a = serie("a", &["u1"], 1, 10);

        let save = repository.save(&a).await;
        assert!(matches!(save, Err(AppError::Offline)));

        let merge = repository
            .merge::<Serie>(&a.key(), json!({"title": "new"}))
            .await;
        assert!(matches!(merge, Err(AppError::Offline)));

        let delete = repository.delete::<Serie>(&a.key()).await;
        assert!(matches!(delete, Err(AppError::Offline)));

        let transact = repository
            .transact(vec![RemoteWrite::Delete {
                collection: Collection::Series,
                key: a.key(),
            }])
            .await;
        assert!(matches!(transact, Err(AppError::Offline)));

        assert!(remote.get(Collection::Series, &a.key()).await.unwrap().is_none());
        assert!(local.get(Collection::Series, &a.key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remote_write_failure_leaves_cache_untouched() {
        let (repository, remote, local, _handle) = setup(true);
        let a = serie("a", &["u1"], 1, 10);
        remote.fail_next(RemoteError::Unavailable("backend down".into()));

        let result = repository.save(&a).await;

        assert!(matches!(result, Err(AppError::Remote(_))));
        assert!(local.get(Collection::Series, &a.key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_fetches_remote_and_caches_when_missing_locally() {
        let (repository, remote, local, handle) = setup(true);
        let a = serie("a", &["u1"], 1, 10);
        remote.seed(Collection::Series, &a.key(), a.encode().unwrap());

        let read: Option<Serie> = repository.get(&a.key()).await.unwrap();
        assert!(read.is_some());
        assert!(local.get(Collection::Series, &a.key()).await.unwrap().is_some());

        // 以後はオフラインでも読める
        handle.set_online(false);
        let read: Option<Serie> = repository.get(&a.key()).await.unwrap();
        assert!(read.is_some());
    }

    #[tokio::test]
    async fn test_get_distinguishes_absent_from_error() {
        let (repository, _remote, _local, _handle) = setup(true);
        let missing = EntityKey::new("missing".into()).unwrap();

        let read: Option<Serie> = repository.get(&missing).await.unwrap();
        assert!(read.is_none());
    }

    #[tokio::test]
    async fn test_malformed_cache_document_is_skipped_on_observe() {
        let (repository, _remote, local, _handle) = setup(false);
        let a = serie("a", &["u1"], 1, 10);
        local
            .upsert(Collection::Series, &a.key(), a.encode().unwrap())
            .await
            .unwrap();
        local
            .upsert(
                Collection::Series,
                &EntityKey::new("bad".into()).unwrap(),
                json!({"id": "bad"}),
            )
            .await
            .unwrap();

        let mut watch = repository.observe(overview());
        let cached = expect_next(&mut watch).await;

        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].id.as_str(), "a");
    }

    #[tokio::test]
    async fn test_malformed_document_surfaces_on_point_read() {
        let (repository, _remote, local, _handle) = setup(false);
        let bad = EntityKey::new("bad".into()).unwrap();
        local
            .upsert(Collection::Series, &bad, json!({"id": "bad"}))
            .await
            .unwrap();

        let read: Result<Option<Serie>, AppError> = repository.get(&bad).await;
        assert!(matches!(read, Err(AppError::DeserializationError(_))));
    }

    #[tokio::test]
    async fn test_transact_mirrors_confirmed_writes_into_cache() {
        let (repository, _remote, local, _handle) = setup(true);
        let a = serie("a", &[], 1, 10);
        repository.save(&a).await.unwrap();

        repository
            .transact(vec![RemoteWrite::ArrayAppend {
                collection: Collection::Series,
                key: a.key(),
                field: "participant_ids".into(),
                value: json!("u1"),
            }])
            .await
            .unwrap();

        let cached = local
            .get(Collection::Series, &a.key())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cached["participant_ids"], json!(["u1"]));
    }

    #[tokio::test]
    async fn test_transact_skips_mirror_for_uncached_documents() {
        let (repository, remote, local, _handle) = setup(true);
        let a = serie("a", &[], 1, 10);
        // リモートにだけ存在するドキュメント
        remote.seed(Collection::Series, &a.key(), a.encode().unwrap());

        repository
            .transact(vec![RemoteWrite::ArrayAppend {
                collection: Collection::Series,
                key: a.key(),
                field: "participant_ids".into(),
                value: json!("u1"),
            }])
            .await
            .unwrap();

        assert!(local.get(Collection::Series, &a.key()).await.unwrap().is_none());
    }
}
