use crate::application::services::cached_repository::{CachedRepository, EntityWatch};
use crate::domain::entities::StreakRecord;
use crate::domain::filters::StreakFilter;
use crate::domain::value_objects::{GroupId, UserId};
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};

/// 週次ストリークの読み書き。
///
/// 記録の更新はリモートの現在値を読み、ドメインの状態遷移を適用して
/// 書き戻す read-modify-write。並行編集は後勝ち。
pub struct StreakRepository {
    core: CachedRepository,
}

impl StreakRepository {
    pub fn new(core: CachedRepository) -> Self {
        Self { core }
    }

    pub fn observe_group(&self, group: GroupId) -> EntityWatch<StreakRecord> {
        self.core.observe(StreakFilter::Group(group))
    }

    pub async fn get(
        &self,
        group: &GroupId,
        user: &UserId,
    ) -> Result<Option<StreakRecord>, AppError> {
        self.core.get(&StreakRecord::storage_key(group, user)).await
    }

    /// 参加イベントを1件記録へ反映する。
    pub async fn record_activity(
        &self,
        group: &GroupId,
        user: &UserId,
        at: DateTime<Utc>,
    ) -> Result<StreakRecord, AppError> {
        let key = StreakRecord::storage_key(group, user);
        let current: Option<StreakRecord> = self.core.get_remote(&key).await?;

        let next = match current {
            Some(record) => record.with_activity(at),
            None => StreakRecord::started(group.clone(), user.clone(), at),
        };
        self.core.save(&next).await?;
        Ok(next)
    }

    /// 直近の参加イベントの削除を記録へ反映する。
    ///
    /// `other_activity_in_same_week` は削除した週に別のアクティビティが
    /// 残っているかどうか。記録が無ければ何もしない。
    pub async fn remove_activity(
        &self,
        group: &GroupId,
        user: &UserId,
        other_activity_in_same_week: bool,
    ) -> Result<Option<StreakRecord>, AppError> {
        let key = StreakRecord::storage_key(group, user);
        let current: Option<StreakRecord> = self.core.get_remote(&key).await?;

        match current {
            None => Ok(None),
            Some(record) => {
                let next = record.with_activity_removed(other_activity_in_same_week);
                self.core.save(&next).await?;
                Ok(Some(next))
            }
        }
    }
}
