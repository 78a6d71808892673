use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EntityType, LifecycleStatus};
use crate::db::db::Versioned;
use crate::utils::pricing::Money;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BidStatus {
    #[serde(rename = "brouillon")]
    Draft,
    #[serde(rename = "en_attente_validation")]
    AwaitingValidation,
    #[serde(rename = "accepte")]
    Accepted,
    #[serde(rename = "refuse")]
    Refused,
    #[serde(rename = "en_attente_signature")]
    AwaitingSignature,
    #[serde(rename = "signe")]
    Signed,
    #[serde(rename = "en_attente_paiement")]
    AwaitingPayment,
    #[serde(rename = "paye")]
    Paid,
}

impl BidStatus {
    pub const OUTSTANDING: [BidStatus; 2] = [BidStatus::Draft, BidStatus::AwaitingValidation];

    /// Not yet decided by the request owner.
    pub fn is_outstanding(&self) -> bool {
        Self::OUTSTANDING.contains(self)
    }
}

impl LifecycleStatus for BidStatus {
    const ENTITY: EntityType = EntityType::ProfessionalBid;

    fn to_str(&self) -> &'static str {
        match self {
            BidStatus::Draft => "brouillon",
            BidStatus::AwaitingValidation => "en_attente_validation",
            BidStatus::Accepted => "accepte",
            BidStatus::Refused => "refuse",
            BidStatus::AwaitingSignature => "en_attente_signature",
            BidStatus::Signed => "signe",
            BidStatus::AwaitingPayment => "en_attente_paiement",
            BidStatus::Paid => "paye",
        }
    }

    fn can_transition(&self, to: Self) -> bool {
        use BidStatus::*;
        match (self, to) {
            (Draft, AwaitingValidation) => true,
            (Draft, Refused) => true,
            (AwaitingValidation, Accepted) => true,
            (AwaitingValidation, Refused) => true,
            (Accepted, AwaitingSignature) => true,
            (AwaitingSignature, Signed) => true,
            (AwaitingSignature, Paid) => true,
            (Signed, AwaitingPayment) => true,
            (AwaitingPayment, Paid) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for BidStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_str())
    }
}

/// How the bid came to exist. Both paths produce the same entity.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BidOrigin {
    Marketplace,
    #[serde(rename_all = "camelCase")]
    QuestionReply { message_id: String },
}

impl Default for BidOrigin {
    fn default() -> Self {
        BidOrigin::Marketplace
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub description: String,
    pub quantity: f64,
    pub unit_price: Money,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct BidTotals {
    #[serde(rename = "subtotalHT")]
    pub subtotal_ht: Money,
    pub tva: Money,
    #[serde(rename = "totalTTC")]
    pub total_ttc: Money,
    pub deposit: Money,
    pub platform_commission: Money,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProfessionalBid {
    pub id: String,
    pub request_id: String,
    pub professional_account_id: String,
    pub client_email: String,
    #[serde(default)]
    pub origin: BidOrigin,
    pub labor_details: LineItem,
    #[serde(default)]
    pub consumable_materials: Vec<LineItem>,
    #[serde(default)]
    pub non_consumable_materials: Vec<LineItem>,
    pub totals: BidTotals,
    pub status: BidStatus,
    pub refusal_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub signed_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub payment_reference: Option<String>,
    #[serde(default)]
    pub version: i64,
}

impl ProfessionalBid {
    pub fn apply_status(&mut self, to: BidStatus, at: DateTime<Utc>) {
        self.status = to;
        self.updated_at = at;
        match to {
            BidStatus::AwaitingValidation => self.submitted_at = Some(at),
            BidStatus::Signed => self.signed_at = Some(at),
            BidStatus::Paid => self.paid_at = Some(at),
            _ => {}
        }
    }
}

impl Versioned for ProfessionalBid {
    fn id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> i64 {
        self.version
    }
}
