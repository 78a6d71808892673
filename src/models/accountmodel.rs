use chrono::prelude::*;
use serde::{Deserialize, Serialize};

use super::{EntityType, LifecycleStatus};
use crate::db::db::Versioned;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Individual,
    Professional,
    Admin,
}

impl Role {
    pub fn to_str(&self) -> &'static str {
        match self {
            Role::Individual => "individual",
            Role::Professional => "professional",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_str())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl LifecycleStatus for ApprovalStatus {
    const ENTITY: EntityType = EntityType::Account;

    fn to_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }

    /// Admins may reverse a decision; nothing goes back to pending.
    fn can_transition(&self, to: Self) -> bool {
        matches!(
            (self, to),
            (ApprovalStatus::Pending, ApprovalStatus::Approved)
                | (ApprovalStatus::Pending, ApprovalStatus::Rejected)
                | (ApprovalStatus::Approved, ApprovalStatus::Rejected)
                | (ApprovalStatus::Rejected, ApprovalStatus::Approved)
        )
    }
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_str())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct BankingDetails {
    pub iban: String,
    pub bic: String,
    pub holder: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProfessionalDocuments {
    pub id_card: Option<String>,
    pub kbis: Option<String>,
    pub insurance: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProfessionalProfile {
    pub company_name: String,
    pub siret: String,
    pub banking_details: BankingDetails,
    pub documents: ProfessionalDocuments,
    pub approval_status: ApprovalStatus,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Principal id issued by the identity provider
    pub id: String,
    pub email: String,
    pub role: Role,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub professional: Option<ProfessionalProfile>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub version: i64,
}

impl Account {
    pub fn approval_status(&self) -> Option<ApprovalStatus> {
        self.professional.as_ref().map(|p| p.approval_status)
    }

    pub fn is_approved_professional(&self) -> bool {
        self.role == Role::Professional && self.approval_status() == Some(ApprovalStatus::Approved)
    }
}

impl Versioned for Account {
    fn id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> i64 {
        self.version
    }
}
