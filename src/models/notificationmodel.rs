use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::db::Versioned;
use crate::utils::pricing::Money;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    NewQuoteRequest,
    QuoteRequestValidated,
    QuoteRequestValidation,
    NewMessage,
    PendingMessage,
    QuoteValidation,
    PaymentCompleted,
}

impl NotificationType {
    pub fn to_str(&self) -> &'static str {
        match self {
            NotificationType::NewQuoteRequest => "NEW_QUOTE_REQUEST",
            NotificationType::QuoteRequestValidated => "QUOTE_REQUEST_VALIDATED",
            NotificationType::QuoteRequestValidation => "QUOTE_REQUEST_VALIDATION",
            NotificationType::NewMessage => "NEW_MESSAGE",
            NotificationType::PendingMessage => "PENDING_MESSAGE",
            NotificationType::QuoteValidation => "QUOTE_VALIDATION",
            NotificationType::PaymentCompleted => "PAYMENT_COMPLETED",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            NotificationType::NewQuoteRequest => "Nouvelle demande de devis",
            NotificationType::QuoteRequestValidated => "Demande de devis validée",
            NotificationType::QuoteRequestValidation => "Demande de devis à valider",
            NotificationType::NewMessage => "Nouveau message",
            NotificationType::PendingMessage => "Message à modérer",
            NotificationType::QuoteValidation => "Mise à jour de devis",
            NotificationType::PaymentCompleted => "Paiement effectué",
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestSummary {
    pub request_id: String,
    pub project_type: String,
    pub city: String,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BidSummary {
    pub bid_id: String,
    pub request_id: String,
    pub professional_account_id: String,
    pub status: String,
    #[serde(rename = "totalTTC")]
    pub total_ttc: Money,
    pub refusal_reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSummary {
    pub bid_id: String,
    pub request_id: String,
    pub amount: Money,
    pub payment_reference: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageSummary {
    pub message_id: String,
    pub sender_id: String,
    pub request_id: Option<String>,
    pub kind: String,
    pub preview: String,
}

/// The one payload shape each notification type carries.
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationPayload {
    Request(RequestSummary),
    Bid(BidSummary),
    Payment(PaymentSummary),
    Message(MessageSummary),
}

impl NotificationPayload {
    /// Whether this payload is the schema `kind` is defined with.
    pub fn fits(&self, kind: NotificationType) -> bool {
        use NotificationType::*;
        match self {
            NotificationPayload::Request(_) => {
                matches!(kind, NewQuoteRequest | QuoteRequestValidated | QuoteRequestValidation)
            }
            NotificationPayload::Bid(_) => kind == QuoteValidation,
            NotificationPayload::Payment(_) => kind == PaymentCompleted,
            NotificationPayload::Message(_) => matches!(kind, NewMessage | PendingMessage),
        }
    }

    pub fn body(&self) -> String {
        match self {
            NotificationPayload::Request(r) => {
                format!("{} à {} ({})", r.project_type, r.city, r.status)
            }
            NotificationPayload::Bid(b) => {
                format!("Devis {} : {} ({} € TTC)", b.bid_id, b.status, b.total_ttc)
            }
            NotificationPayload::Payment(p) => {
                format!("Paiement de {} € reçu pour le devis {}", p.amount, p.bid_id)
            }
            NotificationPayload::Message(m) => m.preview.clone(),
        }
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        match self {
            NotificationPayload::Request(summary) => serde_json::to_value(summary),
            NotificationPayload::Bid(summary) => serde_json::to_value(summary),
            NotificationPayload::Payment(summary) => serde_json::to_value(summary),
            NotificationPayload::Message(summary) => serde_json::to_value(summary),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub recipient_account_id: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub payload: Value,
    pub title: String,
    pub body: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub version: i64,
}

impl Versioned for Notification {
    fn id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> i64 {
        self.version
    }
}
