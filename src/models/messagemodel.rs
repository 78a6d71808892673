use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EntityType, LifecycleStatus};
use crate::db::db::Versioned;
use crate::utils::content_filter::SensitiveCategory;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Question,
    Reply,
}

impl MessageKind {
    pub fn to_str(&self) -> &'static str {
        match self {
            MessageKind::Question => "question",
            MessageKind::Reply => "reply",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ModerationStatus {
    Pending,
    Approved,
    Rejected,
}

impl LifecycleStatus for ModerationStatus {
    const ENTITY: EntityType = EntityType::Message;

    fn to_str(&self) -> &'static str {
        match self {
            ModerationStatus::Pending => "pending",
            ModerationStatus::Approved => "approved",
            ModerationStatus::Rejected => "rejected",
        }
    }

    fn can_transition(&self, to: Self) -> bool {
        matches!(
            (self, to),
            (ModerationStatus::Pending, ModerationStatus::Approved)
                | (ModerationStatus::Pending, ModerationStatus::Rejected)
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub request_id: Option<String>,
    pub kind: MessageKind,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<String>,
    pub moderation_status: ModerationStatus,
    #[serde(default)]
    pub redactions: Vec<SensitiveCategory>,
    pub moderated_by: Option<String>,
    pub moderated_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub version: i64,
}

impl Message {
    /// Senders see their own messages in any state, recipients only once approved.
    pub fn visible_to(&self, account_id: &str) -> bool {
        self.sender_id == account_id
            || (self.recipient_id == account_id
                && self.moderation_status == ModerationStatus::Approved)
    }
}

impl Versioned for Message {
    fn id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> i64 {
        self.version
    }
}
