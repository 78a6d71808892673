// db/notificationdb.rs
use async_trait::async_trait;
use serde_json::json;

use super::db::{DBClient, Subscription};
use super::store::{Collection, Filter, OrderBy, StoreResult};
use crate::models::notificationmodel::Notification;

#[async_trait]
pub trait NotificationExt {
    /// Fails with `AlreadyExists` when a notification with the same id was
    /// already created.
    async fn save_notification(&self, notification: &Notification) -> StoreResult<Notification>;

    async fn get_notification(&self, notification_id: &str) -> StoreResult<Option<Notification>>;

    async fn get_notifications(
        &self,
        recipient_id: &str,
        unread_only: bool,
    ) -> StoreResult<Vec<Notification>>;

    async fn mark_notification_read(&self, notification_id: &str) -> StoreResult<()>;

    /// Returns how many notifications were flipped.
    async fn mark_all_notifications_read(&self, recipient_id: &str) -> StoreResult<usize>;

    async fn subscribe_notifications(
        &self,
        recipient_id: &str,
    ) -> StoreResult<Subscription<Notification>>;
}

fn recipient_filter(recipient_id: &str) -> Filter {
    Filter::all().eq("recipientAccountId", recipient_id)
}

#[async_trait]
impl NotificationExt for DBClient {
    async fn save_notification(&self, notification: &Notification) -> StoreResult<Notification> {
        self.insert(Collection::Notifications, notification).await
    }

    async fn get_notification(&self, notification_id: &str) -> StoreResult<Option<Notification>> {
        self.fetch(Collection::Notifications, notification_id).await
    }

    async fn get_notifications(
        &self,
        recipient_id: &str,
        unread_only: bool,
    ) -> StoreResult<Vec<Notification>> {
        let mut filter = recipient_filter(recipient_id);
        if unread_only {
            filter = filter.eq("read", false);
        }
        self.find(Collection::Notifications, &filter, Some(&OrderBy::desc("createdAt")))
            .await
    }

    async fn mark_notification_read(&self, notification_id: &str) -> StoreResult<()> {
        self.patch(Collection::Notifications, notification_id, json!({ "read": true }))
            .await
    }

    async fn mark_all_notifications_read(&self, recipient_id: &str) -> StoreResult<usize> {
        let unread = self.get_notifications(recipient_id, true).await?;
        for notification in &unread {
            self.mark_notification_read(&notification.id).await?;
        }
        Ok(unread.len())
    }

    async fn subscribe_notifications(
        &self,
        recipient_id: &str,
    ) -> StoreResult<Subscription<Notification>> {
        self.subscribe(
            Collection::Notifications,
            recipient_filter(recipient_id),
            Some(OrderBy::desc("createdAt")),
        )
        .await
    }
}
