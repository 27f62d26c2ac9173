use crate::domain::entities::Poll;
use crate::domain::filters::{Clause, EntityFilter, QueryDescriptor};
use crate::domain::value_objects::{Collection, ConversationId};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::cmp::Ordering;

/// 投票一覧のクエリ形。会話単位、作成時刻の昇順。
#[derive(Debug, Clone)]
pub enum PollFilter {
    Conversation(ConversationId),
}

impl EntityFilter for PollFilter {
    type Entity = Poll;

    fn descriptor(&self, _now: DateTime<Utc>) -> QueryDescriptor {
        match self {
            PollFilter::Conversation(id) => {
                QueryDescriptor::new(Collection::Polls).with(Clause::Eq {
                    field: "conversation_id",
                    value: Value::String(id.to_string()),
                })
            }
        }
    }

    fn matches(&self, entity: &Poll, _now: DateTime<Utc>) -> bool {
        match self {
            PollFilter::Conversation(id) => &entity.conversation_id == id,
        }
    }

    fn compare(&self, a: &Poll, b: &Poll) -> Ordering {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    }
}
