use crate::domain::entities::Serie;
use crate::domain::filters::{Clause, CmpOp, EntityFilter, QueryDescriptor};
use crate::domain::value_objects::{Collection, UserId};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::cmp::Ordering;

/// シリーズ一覧の画面別クエリ形。
///
/// - `Overview`: 参加中のシリーズ、開始時刻の昇順
/// - `Search`: 未参加かつ開始が未来のシリーズ、開始時刻の昇順
/// - `Map`: 開催中または開始が未来のシリーズ（`ends_at > now`）、開始時刻の昇順
/// - `History`: 参加済みで終了したシリーズ（`ends_at < now`）、終了時刻の降順
#[derive(Debug, Clone)]
pub enum SerieFilter {
    Overview(UserId),
    Search(UserId),
    Map,
    History(UserId),
}

fn user_value(user: &UserId) -> Value {
    Value::String(user.to_string())
}

impl EntityFilter for SerieFilter {
    type Entity = Serie;

    fn descriptor(&self, now: DateTime<Utc>) -> QueryDescriptor {
        let now = now.timestamp();
        match self {
            SerieFilter::Overview(user) => {
                QueryDescriptor::new(Collection::Series).with(Clause::ArrayContains {
                    field: "participant_ids",
                    value: user_value(user),
                })
            }
            SerieFilter::Search(user) => QueryDescriptor::new(Collection::Series)
                .with(Clause::ArrayNotContains {
                    field: "participant_ids",
                    value: user_value(user),
                })
                .with(Clause::Cmp {
                    field: "starts_at",
                    op: CmpOp::Ge,
                    value: now,
                }),
            SerieFilter::Map => QueryDescriptor::new(Collection::Series).with(Clause::Cmp {
                field: "ends_at",
                op: CmpOp::Gt,
                value: now,
            }),
            SerieFilter::History(user) => QueryDescriptor::new(Collection::Series)
                .with(Clause::ArrayContains {
                    field: "participant_ids",
                    value: user_value(user),
                })
                .with(Clause::Cmp {
                    field: "ends_at",
                    op: CmpOp::Lt,
                    value: now,
                }),
        }
    }

    fn matches(&self, entity: &Serie, now: DateTime<Utc>) -> bool {
        let now = now.timestamp();
        match self {
            SerieFilter::Overview(user) => entity.has_participant(user),
            SerieFilter::Search(user) => {
                !entity.has_participant(user) && entity.starts_at.timestamp() >= now
            }
            SerieFilter::Map => entity.ends_at.timestamp() > now,
            SerieFilter::History(user) => {
                entity.has_participant(user) && entity.ends_at.timestamp() < now
            }
        }
    }

    fn compare(&self, a: &Serie, b: &Serie) -> Ordering {
        match self {
            SerieFilter::History(_) => b
                .ends_at
                .cmp(&a.ends_at)
                .then_with(|| a.id.cmp(&b.id)),
            _ => a
                .starts_at
                .cmp(&b.starts_at)
                .then_with(|| a.id.cmp(&b.id)),
        }
    }
}
