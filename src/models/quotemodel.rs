use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EntityType, LifecycleStatus};
use crate::db::db::Versioned;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuoteRequestStatus {
    #[serde(rename = "en_attente")]
    PendingValidation,
    #[serde(rename = "valide")]
    Validated,
    #[serde(rename = "en_discussion")]
    InDiscussion,
    #[serde(rename = "attente_reponse")]
    AwaitingResponse,
    #[serde(rename = "signe")]
    Signed,
    #[serde(rename = "refuse")]
    Refused,
    #[serde(rename = "annule")]
    Cancelled,
}

impl QuoteRequestStatus {
    pub const OPEN_FOR_BIDS: [QuoteRequestStatus; 3] = [
        QuoteRequestStatus::Validated,
        QuoteRequestStatus::InDiscussion,
        QuoteRequestStatus::AwaitingResponse,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QuoteRequestStatus::Signed | QuoteRequestStatus::Refused | QuoteRequestStatus::Cancelled
        )
    }

    /// Validated and visible to approved professionals.
    pub fn is_open_for_bids(&self) -> bool {
        Self::OPEN_FOR_BIDS.contains(self)
    }

    /// Descriptive fields may still change.
    pub fn is_editable(&self) -> bool {
        !self.is_terminal()
    }
}

impl LifecycleStatus for QuoteRequestStatus {
    const ENTITY: EntityType = EntityType::QuoteRequest;

    fn to_str(&self) -> &'static str {
        match self {
            QuoteRequestStatus::PendingValidation => "en_attente",
            QuoteRequestStatus::Validated => "valide",
            QuoteRequestStatus::InDiscussion => "en_discussion",
            QuoteRequestStatus::AwaitingResponse => "attente_reponse",
            QuoteRequestStatus::Signed => "signe",
            QuoteRequestStatus::Refused => "refuse",
            QuoteRequestStatus::Cancelled => "annule",
        }
    }

    fn can_transition(&self, to: Self) -> bool {
        use QuoteRequestStatus::*;
        match (self, to) {
            (PendingValidation, Validated) => true,
            (PendingValidation, Refused) => true,
            (PendingValidation, Cancelled) => true,
            (Validated, InDiscussion) => true,
            (Validated, AwaitingResponse) => true,
            (Validated, Signed) => true,
            (Validated, Cancelled) => true,
            (InDiscussion, Validated) => true,
            (InDiscussion, AwaitingResponse) => true,
            (InDiscussion, Signed) => true,
            (InDiscussion, Cancelled) => true,
            (AwaitingResponse, Validated) => true,
            (AwaitingResponse, InDiscussion) => true,
            (AwaitingResponse, Signed) => true,
            (AwaitingResponse, Cancelled) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for QuoteRequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub street: String,
    pub city: String,
    pub postal_code: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub id: String,
    pub owner_account_id: String,
    pub project_type: String,
    pub surface_area: f64,
    pub description: String,
    pub address: Address,
    #[serde(default)]
    pub photos: Vec<String>,
    pub status: QuoteRequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub validated_at: Option<DateTime<Utc>>,
    pub refused_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub signed_at: Option<DateTime<Utc>>,
    pub accepted_bid_id: Option<String>,
    #[serde(default)]
    pub version: i64,
}

impl QuoteRequest {
    /// Move to `to`, stamping the matching timestamp. The caller has already
    /// checked the transition table.
    pub fn apply_status(&mut self, to: QuoteRequestStatus, at: DateTime<Utc>) {
        self.status = to;
        self.updated_at = at;
        match to {
            QuoteRequestStatus::Validated if self.validated_at.is_none() => {
                self.validated_at = Some(at)
            }
            QuoteRequestStatus::Refused => self.refused_at = Some(at),
            QuoteRequestStatus::Cancelled => self.cancelled_at = Some(at),
            QuoteRequestStatus::Signed => self.signed_at = Some(at),
            _ => {}
        }
    }
}

impl Versioned for QuoteRequest {
    fn id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> i64 {
        self.version
    }
}
