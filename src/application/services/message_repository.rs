use crate::application::ports::remote_source::RemoteWrite;
use crate::application::services::cached_repository::{CachedRepository, EntityWatch};
use crate::domain::entities::Message;
use crate::domain::filters::{EntityFilter, MessageFilter, PollFilter};
use crate::domain::value_objects::{Collection, ConversationId, EntityKey, UserId};
use crate::shared::error::AppError;
use chrono::Utc;
use serde_json::{json, Value};

/// メッセージコレクションの読み書き。
pub struct MessageRepository {
    core: CachedRepository,
}

impl MessageRepository {
    pub fn new(core: CachedRepository) -> Self {
        Self { core }
    }

    pub fn observe_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> EntityWatch<Message> {
        self.core.observe(MessageFilter::Conversation(conversation_id))
    }

    pub async fn get(&self, id: &EntityKey) -> Result<Option<Message>, AppError> {
        self.core.get(id).await
    }

    pub async fn send(
        &self,
        conversation_id: ConversationId,
        sender_id: UserId,
        text: String,
    ) -> Result<Message, AppError> {
        let message = Message::new(conversation_id, sender_id, text, Utc::now());
        self.core.save(&message).await?;
        Ok(message)
    }

    pub async fn edit(&self, id: &EntityKey, text: String) -> Result<(), AppError> {
        let patch = json!({
            "text": text,
            "edited_at": Utc::now().timestamp(),
        });
        self.core.merge::<Message>(id, patch).await
    }

    /// 既読者リストへ読者を追加する。既に含まれていれば何も変わらない。
    pub async fn mark_read(&self, id: &EntityKey, reader: &UserId) -> Result<(), AppError> {
        self.core
            .transact(vec![RemoteWrite::ArrayAppend {
                collection: Collection::Messages,
                key: id.clone(),
                field: "read_by".into(),
                value: json!(reader.as_str()),
            }])
            .await
    }

    pub async fn delete(&self, id: &EntityKey) -> Result<(), AppError> {
        self.core.delete::<Message>(id).await
    }

    /// 会話ごと削除する。子のメッセージと投票をリモートで1トランザクション
    /// として消し、ローカルキャッシュも同じ範囲で掃除する。
    pub async fn delete_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<(), AppError> {
        self.core.ensure_online()?;

        let now = Utc::now();
        let message_filter = MessageFilter::Conversation(conversation_id.clone());
        let poll_filter = PollFilter::Conversation(conversation_id.clone());

        let mut writes = Vec::new();
        let messages = self.core.fetch_remote(message_filter.descriptor(now)).await?;
        collect_deletes(Collection::Messages, &messages, &mut writes);
        let polls = self.core.fetch_remote(poll_filter.descriptor(now)).await?;
        collect_deletes(Collection::Polls, &polls, &mut writes);

        if !writes.is_empty() {
            self.core.transact(writes).await?;
        }

        // リモートが知らないローカル残留エントリも含めて消す
        for collection in [Collection::Messages, Collection::Polls] {
            let conversation = conversation_id.to_string();
            self.core
                .delete_where_local(
                    collection,
                    Box::new(move |doc| {
                        doc.get("conversation_id").and_then(Value::as_str)
                            == Some(conversation.as_str())
                    }),
                )
                .await?;
        }
        Ok(())
    }
}

fn collect_deletes(collection: Collection, docs: &[Value], writes: &mut Vec<RemoteWrite>) {
    for doc in docs {
        match doc.get("id").and_then(Value::as_str) {
            Some(id) => match EntityKey::new(id.to_string()) {
                Ok(key) => writes.push(RemoteWrite::Delete { collection, key }),
                Err(err) => tracing::warn!("Skipping {} document with bad id: {}", collection, err),
            },
            None => tracing::warn!("Skipping {} document without id", collection),
        }
    }
}
