// db/messagedb.rs
use async_trait::async_trait;

use super::db::DBClient;
use super::store::{Collection, Filter, OrderBy, StoreResult};
use crate::models::{messagemodel::*, LifecycleStatus};

#[async_trait]
pub trait MessageExt {
    async fn get_message(&self, message_id: &str) -> StoreResult<Option<Message>>;

    async fn save_message(&self, message: &Message) -> StoreResult<Message>;

    async fn update_message(&self, message: &Message) -> StoreResult<Message>;

    /// Both directions of a conversation, oldest first.
    async fn get_messages_between(
        &self,
        account_one: &str,
        account_two: &str,
    ) -> StoreResult<Vec<Message>>;

    async fn get_messages_by_status(&self, status: ModerationStatus) -> StoreResult<Vec<Message>>;
}

#[async_trait]
impl MessageExt for DBClient {
    async fn get_message(&self, message_id: &str) -> StoreResult<Option<Message>> {
        self.fetch(Collection::Messages, message_id).await
    }

    async fn save_message(&self, message: &Message) -> StoreResult<Message> {
        self.insert(Collection::Messages, message).await
    }

    async fn update_message(&self, message: &Message) -> StoreResult<Message> {
        self.replace(Collection::Messages, message).await
    }

    async fn get_messages_between(
        &self,
        account_one: &str,
        account_two: &str,
    ) -> StoreResult<Vec<Message>> {
        let order = OrderBy::asc("createdAt");
        let mut messages: Vec<Message> = self
            .find(
                Collection::Messages,
                &Filter::all().eq("senderId", account_one).eq("recipientId", account_two),
                Some(&order),
            )
            .await?;
        if account_one != account_two {
            let replies: Vec<Message> = self
                .find(
                    Collection::Messages,
                    &Filter::all().eq("senderId", account_two).eq("recipientId", account_one),
                    Some(&order),
                )
                .await?;
            messages.extend(replies);
        }
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(messages)
    }

    async fn get_messages_by_status(&self, status: ModerationStatus) -> StoreResult<Vec<Message>> {
        self.find(
            Collection::Messages,
            &Filter::all().eq("moderationStatus", status.to_str()),
            Some(&OrderBy::asc("createdAt")),
        )
        .await
    }
}
