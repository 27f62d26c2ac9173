use crate::domain::entities::Profile;
use crate::domain::filters::{Clause, EntityFilter, QueryDescriptor};
use crate::domain::value_objects::{Collection, UserId};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::cmp::Ordering;

/// プロフィールのクエリ形。単一ユーザーのライブ購読に使う。
#[derive(Debug, Clone)]
pub enum ProfileFilter {
    User(UserId),
}

impl EntityFilter for ProfileFilter {
    type Entity = Profile;

    fn descriptor(&self, _now: DateTime<Utc>) -> QueryDescriptor {
        match self {
            ProfileFilter::User(id) => {
                QueryDescriptor::new(Collection::Profiles).with(Clause::Eq {
                    field: "id",
                    value: Value::String(id.to_string()),
                })
            }
        }
    }

    fn matches(&self, entity: &Profile, _now: DateTime<Utc>) -> bool {
        match self {
            ProfileFilter::User(id) => &entity.id == id,
        }
    }

    fn compare(&self, a: &Profile, b: &Profile) -> Ordering {
        a.id.cmp(&b.id)
    }
}
