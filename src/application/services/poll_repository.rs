use crate::application::ports::remote_source::RemoteWrite;
use crate::application::services::cached_repository::{CachedRepository, EntityWatch};
use crate::domain::entities::{Poll, PollOption};
use crate::domain::filters::PollFilter;
use crate::domain::value_objects::{Collection, ConversationId, EntityKey, UserId};
use crate::shared::error::AppError;
use chrono::Utc;
use serde_json::json;

/// 投票コレクションの読み書き。
///
/// 締め切り済みかどうかは変更開始時点のリモートの権威ドキュメントで
/// 判定する。それ以降に締め切られたケースは後勝ちとして扱う。
pub struct PollRepository {
    core: CachedRepository,
}

impl PollRepository {
    pub fn new(core: CachedRepository) -> Self {
        Self { core }
    }

    pub fn observe_conversation(&self, conversation_id: ConversationId) -> EntityWatch<Poll> {
        self.core.observe(PollFilter::Conversation(conversation_id))
    }

    pub async fn get(&self, id: &EntityKey) -> Result<Option<Poll>, AppError> {
        self.core.get(id).await
    }

    pub async fn create(
        &self,
        conversation_id: ConversationId,
        author_id: UserId,
        question: String,
        options: Vec<PollOption>,
    ) -> Result<Poll, AppError> {
        if options.is_empty() {
            return Err(AppError::ValidationError(
                "Poll needs at least one option".to_string(),
            ));
        }
        let poll = Poll::new(conversation_id, author_id, question, options, Utc::now());
        self.core.save(&poll).await?;
        Ok(poll)
    }

    pub async fn close(&self, id: &EntityKey) -> Result<(), AppError> {
        self.core.merge::<Poll>(id, json!({"closed": true})).await
    }

    pub async fn vote(
        &self,
        poll_id: &EntityKey,
        option_id: &str,
        voter: &UserId,
    ) -> Result<(), AppError> {
        let poll = self.checked_poll(poll_id, option_id).await?;
        self.core
            .transact(vec![RemoteWrite::ArrayAppend {
                collection: Collection::Polls,
                key: poll.id,
                field: format!("votes.{option_id}"),
                value: json!(voter.as_str()),
            }])
            .await
    }

    pub async fn remove_vote(
        &self,
        poll_id: &EntityKey,
        option_id: &str,
        voter: &UserId,
    ) -> Result<(), AppError> {
        let poll = self.checked_poll(poll_id, option_id).await?;
        self.core
            .transact(vec![RemoteWrite::ArrayRemove {
                collection: Collection::Polls,
                key: poll.id,
                field: format!("votes.{option_id}"),
                value: json!(voter.as_str()),
            }])
            .await
    }

    pub async fn delete(&self, id: &EntityKey) -> Result<(), AppError> {
        self.core.delete::<Poll>(id).await
    }

    async fn checked_poll(&self, poll_id: &EntityKey, option_id: &str) -> Result<Poll, AppError> {
        let poll: Poll = self
            .core
            .get_remote(poll_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("poll {poll_id}")))?;
        if poll.closed {
            return Err(AppError::ValidationError("Poll is closed".to_string()));
        }
        if !poll.has_option(option_id) {
            return Err(AppError::ValidationError(format!(
                "Poll has no option {option_id}"
            )));
        }
        Ok(poll)
    }
}
