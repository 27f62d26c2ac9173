use crate::domain::entities::StreakRecord;
use crate::domain::filters::{Clause, EntityFilter, QueryDescriptor};
use crate::domain::value_objects::{Collection, GroupId};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::cmp::Ordering;

/// ストリーク一覧のクエリ形。グループ単位、連続週数の降順。
#[derive(Debug, Clone)]
pub enum StreakFilter {
    Group(GroupId),
}

impl EntityFilter for StreakFilter {
    type Entity = StreakRecord;

    fn descriptor(&self, _now: DateTime<Utc>) -> QueryDescriptor {
        match self {
            StreakFilter::Group(id) => {
                QueryDescriptor::new(Collection::Streaks).with(Clause::Eq {
                    field: "group_id",
                    value: Value::String(id.to_string()),
                })
            }
        }
    }

    fn matches(&self, entity: &StreakRecord, _now: DateTime<Utc>) -> bool {
        match self {
            StreakFilter::Group(id) => &entity.group_id == id,
        }
    }

    fn compare(&self, a: &StreakRecord, b: &StreakRecord) -> Ordering {
        b.current_weeks
            .cmp(&a.current_weeks)
            .then_with(|| a.user_id.cmp(&b.user_id))
    }
}
