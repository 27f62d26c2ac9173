use crate::application::ports::remote_source::RemoteWrite;
use crate::application::services::cached_repository::{CachedRepository, EntityWatch};
use crate::domain::entities::Profile;
use crate::domain::filters::ProfileFilter;
use crate::domain::value_objects::{Collection, EntityKey, UserId};
use crate::shared::error::AppError;
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// プロフィールコレクションの読み書き。
///
/// フォロー関係は両者のカウンタを1つのリモートトランザクションで更新し、
/// キャッシュにも同じ変更を1つの論理単位として反映する。
pub struct ProfileRepository {
    core: CachedRepository,
}

impl ProfileRepository {
    pub fn new(core: CachedRepository) -> Self {
        Self { core }
    }

    pub fn observe(&self, user: UserId) -> EntityWatch<Profile> {
        self.core.observe(ProfileFilter::User(user))
    }

    /// 存在しないプロフィールは `Ok(None)`。
    pub async fn get(&self, user: &UserId) -> Result<Option<Profile>, AppError> {
        self.core.get(&profile_key(user)).await
    }

    pub async fn upsert(&self, profile: &Profile) -> Result<(), AppError> {
        self.core.save(profile).await
    }

    pub async fn update(&self, user: &UserId, patch: ProfilePatch) -> Result<(), AppError> {
        let patch = serde_json::to_value(&patch)?;
        self.core.merge::<Profile>(&profile_key(user), patch).await
    }

    /// `me` が `target` をフォローする。既にフォロー済みなら何もしない。
    pub async fn follow(&self, me: &UserId, target: &UserId) -> Result<(), AppError> {
        if me == target {
            return Err(AppError::ValidationError(
                "Cannot follow yourself".to_string(),
            ));
        }

        let profile = self.authoritative_profile(me).await?;
        if profile.is_following(target) {
            return Ok(());
        }

        self.core
            .transact(vec![
                RemoteWrite::ArrayAppend {
                    collection: Collection::Profiles,
                    key: profile_key(me),
                    field: "following_ids".into(),
                    value: json!(target.as_str()),
                },
                RemoteWrite::Increment {
                    collection: Collection::Profiles,
                    key: profile_key(me),
                    field: "following_count".into(),
                    delta: 1,
                },
                RemoteWrite::Increment {
                    collection: Collection::Profiles,
                    key: profile_key(target),
                    field: "follower_count".into(),
                    delta: 1,
                },
            ])
            .await
    }

    /// フォローを解除する。フォローしていなければ何もしない。
    pub async fn unfollow(&self, me: &UserId, target: &UserId) -> Result<(), AppError> {
        let profile = self.authoritative_profile(me).await?;
        if !profile.is_following(target) {
            return Ok(());
        }

        self.core
            .transact(vec![
                RemoteWrite::ArrayRemove {
                    collection: Collection::Profiles,
                    key: profile_key(me),
                    field: "following_ids".into(),
                    value: json!(target.as_str()),
                },
                RemoteWrite::Increment {
                    collection: Collection::Profiles,
                    key: profile_key(me),
                    field: "following_count".into(),
                    delta: -1,
                },
                RemoteWrite::Increment {
                    collection: Collection::Profiles,
                    key: profile_key(target),
                    field: "follower_count".into(),
                    delta: -1,
                },
            ])
            .await
    }

    async fn authoritative_profile(&self, user: &UserId) -> Result<Profile, AppError> {
        self.core
            .get_remote(&profile_key(user))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("profile {user}")))
    }
}

fn profile_key(user: &UserId) -> EntityKey {
    EntityKey::new(user.to_string()).expect("user id is non-empty")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::local_store::LocalStore;
    use crate::application::ports::remote_source::RemoteDataSource;
    use crate::infrastructure::connectivity::{ConnectivityHandle, NetworkStatusMonitor};
    use crate::infrastructure::remote::MemoryRemoteDataSource;
    use crate::infrastructure::storage::MemoryLocalStore;
    use crate::shared::config::SyncConfig;
    use chrono::Utc;
    use std::sync::Arc;

    fn setup(
        online: bool,
    ) -> (
        ProfileRepository,
        Arc<MemoryRemoteDataSource>,
        Arc<MemoryLocalStore>,
        ConnectivityHandle,
    ) {
        let remote = Arc::new(MemoryRemoteDataSource::new());
        let local = Arc::new(MemoryLocalStore::new());
        let monitor = Arc::new(NetworkStatusMonitor::new(online));
        let handle = monitor.handle();
        let core = CachedRepository::new(
            Arc::clone(&remote) as Arc<dyn RemoteDataSource>,
            Arc::clone(&local) as Arc<dyn LocalStore>,
            monitor,
            SyncConfig {
                remote_timeout_secs: 1,
                subscription_buffer: 64,
            },
        );
        (ProfileRepository::new(core), remote, local, handle)
    }

    fn user(id: &str) -> UserId {
        UserId::new(id.into()).unwrap()
    }

    async fn seed_profiles(repository: &ProfileRepository) {
        for id in ["me", "them"] {
            repository
                .upsert(&Profile::new(user(id), format!("user {id}"), Utc::now()))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_follow_updates_both_counters_atomically() {
        let (repository, _remote, _local, _handle) = setup(true);
        seed_profiles(&repository).await;

        repository.follow(&user("me"), &user("them")).await.unwrap();

        let me = repository.get(&user("me")).await.unwrap().unwrap();
        let them = repository.get(&user("them")).await.unwrap().unwrap();
        assert_eq!(me.following_count, 1);
        assert!(me.is_following(&user("them")));
        assert_eq!(them.follower_count, 1);
    }

    #[tokio::test]
    async fn test_follow_twice_is_idempotent() {
        let (repository, _remote, _local, _handle) = setup(true);
        seed_profiles(&repository).await;

        repository.follow(&user("me"), &user("them")).await.unwrap();
        repository.follow(&user("me"), &user("them")).await.unwrap();

        let them = repository.get(&user("them")).await.unwrap().unwrap();
        assert_eq!(them.follower_count, 1);
    }

    #[tokio::test]
    async fn test_unfollow_reverses_follow() {
        let (repository, _remote, _local, _handle) = setup(true);
        seed_profiles(&repository).await;
        repository.follow(&user("me"), &user("them")).await.unwrap();

        repository.unfollow(&user("me"), &user("them")).await.unwrap();

        let me = repository.get(&user("me")).await.unwrap().unwrap();
        let them = repository.get(&user("them")).await.unwrap().unwrap();
        assert_eq!(me.following_count, 0);
        assert!(!me.is_following(&user("them")));
        assert_eq!(them.follower_count, 0);
    }

    #[tokio::test]
    async fn test_partial_transaction_failure_leaves_both_caches_untouched() {
        let (repository, remote, local, _handle) = setup(true);
        // 相手のプロフィールが未作成のままフォローし、
        // トランザクションを途中で失敗させる
        repository
            .upsert(&Profile::new(user("me"), "user me".into(), Utc::now()))
            .await
            .unwrap();

        let result = repository.follow(&user("me"), &user("them")).await;

        assert!(matches!(result, Err(AppError::Remote(_))));
        let me = local
            .get(Collection::Profiles, &profile_key(&user("me")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(me["following_count"], serde_json::json!(0));
        assert_eq!(me["following_ids"], serde_json::json!([]));
        let me_remote = remote
            .get(Collection::Profiles, &profile_key(&user("me")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(me_remote["following_count"], serde_json::json!(0));
    }

    #[tokio::test]
    async fn test_follow_offline_fails_fast() {
        let (repository, _remote, local, handle) = setup(true);
        seed_profiles(&repository).await;

        handle.set_online(false);
        let result = repository.follow(&user("me"), &user("them")).await;

        assert!(matches!(result, Err(AppError::Offline)));
        let them = local
            .get(Collection::Profiles, &profile_key(&user("them")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(them["follower_count"], serde_json::json!(0));
    }

    #[tokio::test]
    async fn test_get_missing_profile_is_absent_not_error() {
        let (repository, _remote, _local, _handle) = setup(true);

        let read = repository.get(&user("ghost")).await.unwrap();
        assert!(read.is_none());
    }

    #[tokio::test]
    async fn test_follow_yourself_is_rejected() {
        let (repository, _remote, _local, _handle) = setup(true);
        seed_profiles(&repository).await;

        let result = repository.follow(&user("me"), &user("me")).await;
        assert!(matches!(result, Err(AppError::ValidationError(_))));
    }
}
