use crate::domain::entities::{decode_with, encode_with, CacheEntity};
use crate::domain::value_objects::{Collection, EntityKey, GroupId, UserId};
use crate::shared::error::AppError;
use chrono::{DateTime, Datelike, Days, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `t` を含む週の開始時刻（UTC、月曜 00:00 起点）。
pub fn week_bucket(t: DateTime<Utc>) -> DateTime<Utc> {
    let date = t.date_naive();
    let monday = date - Days::new(u64::from(date.weekday().num_days_from_monday()));
    monday.and_hms_opt(0, 0, 0).unwrap().and_utc()
}

const WEEK_SECONDS: i64 = 7 * 24 * 60 * 60;

/// グループ × ユーザーごとの週次ストリーク。
///
/// `current_*` は進行中の連続記録、`best_*` は過去最高値で減少しない。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreakRecord {
    pub group_id: GroupId,
    pub user_id: UserId,
    #[serde(default)]
    pub current_weeks: u32,
    #[serde(default)]
    pub current_activities: u32,
    #[serde(default)]
    pub best_weeks: u32,
    #[serde(default)]
    pub best_activities: u32,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub last_active_week: Option<DateTime<Utc>>,
}

impl StreakRecord {
    pub fn started(group_id: GroupId, user_id: UserId, at: DateTime<Utc>) -> Self {
        Self {
            group_id,
            user_id,
            current_weeks: 1,
            current_activities: 1,
            best_weeks: 1,
            best_activities: 1,
            last_active_week: Some(week_bucket(at)),
        }
    }

    pub fn storage_key(group_id: &GroupId, user_id: &UserId) -> EntityKey {
        EntityKey::new(format!("{group_id}:{user_id}")).expect("group and user ids are non-empty")
    }

    /// 新しいアクティビティを記録に反映する。
    pub fn with_activity(mut self, at: DateTime<Utc>) -> Self {
        let bucket = week_bucket(at);
        let last = match self.last_active_week {
            Some(last) => last,
            None => {
                // 進行中の記録が無い場合は新しい連続記録を開始する
                self.current_weeks = 1;
                self.current_activities = 1;
                self.best_weeks = self.best_weeks.max(1);
                self.best_activities = self.best_activities.max(1);
                self.last_active_week = Some(bucket);
                return self;
            }
        };

        let delta = bucket.timestamp() - last.timestamp();
        if delta == 0 {
            self.current_activities += 1;
        } else if delta == WEEK_SECONDS {
            self.current_weeks += 1;
            self.current_activities += 1;
            self.last_active_week = Some(bucket);
        } else {
            // 1週以上空いた。連続記録を最初からやり直す
            self.current_weeks = 1;
            self.current_activities = 1;
            self.last_active_week = Some(bucket);
        }

        self.best_weeks = self.best_weeks.max(self.current_weeks);
        self.best_activities = self.best_activities.max(self.current_activities);
        self
    }

    /// 直近のアクティビティの削除を記録へ反映する。
    ///
    /// 同じ週に別のアクティビティが残るなら件数のみ減らし、
    /// 週内最後の1件だった場合は進行中の記録を打ち切る。
    /// `best_*` はどちらの場合も変更しない。
    pub fn with_activity_removed(mut self, other_activity_in_same_week: bool) -> Self {
        if other_activity_in_same_week {
            self.current_activities = self.current_activities.saturating_sub(1);
        } else {
            self.current_weeks = 0;
            self.current_activities = 0;
            self.last_active_week = None;
        }
        self
    }
}

impl CacheEntity for StreakRecord {
    fn collection() -> Collection {
        Collection::Streaks
    }

    fn key(&self) -> EntityKey {
        Self::storage_key(&self.group_id, &self.user_id)
    }

    fn encode(&self) -> Result<Value, AppError> {
        encode_with(Self::collection(), self)
    }

    fn decode(doc: Value) -> Result<Self, AppError> {
        decode_with(Self::collection(), doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn group() -> GroupId {
        GroupId::new("group1".into()).unwrap()
    }

    fn user() -> UserId {
        UserId::new("user1".into()).unwrap()
    }

    /// 2025-01-06 は月曜日
    fn monday() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 6, 12, 0, 0).unwrap()
    }

    fn weeks_later(base: DateTime<Utc>, weeks: i64) -> DateTime<Utc> {
        base + chrono::Duration::weeks(weeks)
    }

    #[test]
    fn test_week_bucket_is_monday_aligned() {
        let wednesday = Utc.with_ymd_and_hms(2025, 1, 8, 23, 59, 59).unwrap();
        let sunday = Utc.with_ymd_and_hms(2025, 1, 12, 0, 0, 1).unwrap();
        let expected = Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).unwrap();

        assert_eq!(week_bucket(wednesday), expected);
        assert_eq!(week_bucket(sunday), expected);
        assert_eq!(week_bucket(expected), expected);
    }

    #[test]
    fn test_first_activity_starts_streak() {
        let record = StreakRecord::started(group(), user(), monday());

        assert_eq!(record.current_weeks, 1);
        assert_eq!(record.current_activities, 1);
        assert_eq!(record.best_weeks, 1);
        assert_eq!(record.best_activities, 1);
        assert_eq!(record.last_active_week, Some(week_bucket(monday())));
    }

    #[test]
    fn test_same_week_increments_activities_only() {
        let record = StreakRecord::started(group(), user(), monday());
        let record = record.with_activity(monday() + chrono::Duration::days(2));

        assert_eq!(record.current_weeks, 1);
        assert_eq!(record.current_activities, 2);
        assert_eq!(record.best_activities, 2);
    }

    #[test]
    fn test_consecutive_week_extends_streak() {
        let record = StreakRecord::started(group(), user(), monday());
        let record = record.with_activity(weeks_later(monday(), 1));

        assert_eq!(record.current_weeks, 2);
        assert_eq!(record.current_activities, 2);
        assert_eq!(record.best_weeks, 2);
    }

    #[test]
    fn test_skipped_week_resets_current_run() {
        // W, W+1, W+3 とアクティビティが続き W+2 が抜けるケース
        let record = StreakRecord::started(group(), user(), monday());
        let record = record.with_activity(weeks_later(monday(), 1));
        let record = record.with_activity(weeks_later(monday(), 3));

        assert_eq!(record.current_weeks, 1);
        assert_eq!(record.current_activities, 1);
        assert_eq!(record.best_weeks, 2);
        assert_eq!(record.best_activities, 2);
    }

    #[test]
    fn test_removal_with_remaining_activity_decrements() {
        let record = StreakRecord::started(group(), user(), monday());
        let record = record.with_activity(monday() + chrono::Duration::hours(1));
        let record = record.with_activity_removed(true);

        assert_eq!(record.current_weeks, 1);
        assert_eq!(record.current_activities, 1);
        assert_eq!(record.best_activities, 2);
    }

    #[test]
    fn test_removal_of_only_activity_clears_current_run() {
        let record = StreakRecord::started(group(), user(), monday());
        let record = record.with_activity(weeks_later(monday(), 1));
        let record = record.with_activity_removed(false);

        assert_eq!(record.current_weeks, 0);
        assert_eq!(record.current_activities, 0);
        assert_eq!(record.last_active_week, None);
        // best は履歴なので残る
        assert_eq!(record.best_weeks, 2);
        assert_eq!(record.best_activities, 2);
    }

    #[test]
    fn test_activity_after_cleared_run_restarts() {
        let record = StreakRecord::started(group(), user(), monday());
        let record = record.with_activity(weeks_later(monday(), 1));
        let record = record.with_activity_removed(false);
        let record = record.with_activity(weeks_later(monday(), 5));

        assert_eq!(record.current_weeks, 1);
        assert_eq!(record.current_activities, 1);
        assert_eq!(record.best_weeks, 2);
    }
}
