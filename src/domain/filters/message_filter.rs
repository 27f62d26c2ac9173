use crate::domain::entities::Message;
use crate::domain::filters::{Clause, EntityFilter, QueryDescriptor};
use crate::domain::value_objects::{Collection, ConversationId};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::cmp::Ordering;

/// メッセージ一覧のクエリ形。会話単位、送信時刻の昇順。
#[derive(Debug, Clone)]
pub enum MessageFilter {
    Conversation(ConversationId),
}

impl EntityFilter for MessageFilter {
    type Entity = Message;

    fn descriptor(&self, _now: DateTime<Utc>) -> QueryDescriptor {
        match self {
            MessageFilter::Conversation(id) => {
                QueryDescriptor::new(Collection::Messages).with(Clause::Eq {
                    field: "conversation_id",
                    value: Value::String(id.to_string()),
                })
            }
        }
    }

    fn matches(&self, entity: &Message, _now: DateTime<Utc>) -> bool {
        match self {
            MessageFilter::Conversation(id) => &entity.conversation_id == id,
        }
    }

    fn compare(&self, a: &Message, b: &Message) -> Ordering {
        a.sent_at.cmp(&b.sent_at).then_with(|| a.id.cmp(&b.id))
    }
}
