pub mod accountmodel;
pub mod auditmodel;
pub mod bidmodel;
pub mod messagemodel;
pub mod notificationmodel;
pub mod quotemodel;

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum EntityType {
    Account,
    QuoteRequest,
    ProfessionalBid,
    Message,
    Notification,
}

impl EntityType {
    pub fn to_str(&self) -> &'static str {
        match self {
            EntityType::Account => "account",
            EntityType::QuoteRequest => "quoteRequest",
            EntityType::ProfessionalBid => "professionalBid",
            EntityType::Message => "message",
            EntityType::Notification => "notification",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_str())
    }
}

/// A persisted status with a closed transition table.
pub trait LifecycleStatus: Copy + PartialEq + std::fmt::Debug {
    const ENTITY: EntityType;

    fn to_str(&self) -> &'static str;

    fn can_transition(&self, to: Self) -> bool;
}
