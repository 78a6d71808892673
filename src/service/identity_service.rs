// service/identity_service.rs
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    db::{accountdb::AccountExt, db::DBClient},
    models::accountmodel::{ApprovalStatus, Role},
    service::error::ServiceError,
};

/// Who is calling, as resolved from the account record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub account_id: String,
    pub email: String,
    pub role: Role,
    pub approval_status: Option<ApprovalStatus>,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is(&self, account_id: &str) -> bool {
        self.account_id == account_id
    }

    pub fn require_role(&self, allowed: &[Role], action: &str) -> Result<(), ServiceError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            tracing::warn!(
                account_id = %self.account_id,
                role = %self.role,
                action,
                "role check failed"
            );
            Err(ServiceError::NotAuthorizedRole(action.to_string()))
        }
    }

    pub fn require_admin(&self, action: &str) -> Result<(), ServiceError> {
        self.require_role(&[Role::Admin], action)
    }

    /// Professional role and an approved profile. Anything short of approval
    /// fails the same way whatever the target entity looks like.
    pub fn require_approved_professional(&self, action: &str) -> Result<(), ServiceError> {
        self.require_role(&[Role::Professional], action)?;
        match self.approval_status {
            Some(ApprovalStatus::Approved) => Ok(()),
            _ => Err(ServiceError::ProfessionalNotApproved(self.account_id.clone())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IdentityService {
    db_client: Arc<DBClient>,
}

impl IdentityService {
    pub fn new(db_client: Arc<DBClient>) -> Self {
        Self { db_client }
    }

    pub async fn resolve(&self, principal: Option<&str>) -> Result<Identity, ServiceError> {
        let principal = principal
            .filter(|p| !p.is_empty())
            .ok_or(ServiceError::Unauthenticated)?;

        let account = self
            .db_client
            .get_account(principal)
            .await?
            .ok_or_else(|| ServiceError::AccountRecordMissing(principal.to_string()))?;

        Ok(Identity {
            approval_status: account.approval_status(),
            account_id: account.id,
            email: account.email,
            role: account.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(role: Role, approval_status: Option<ApprovalStatus>) -> Identity {
        Identity {
            account_id: "a1".into(),
            email: "a1@example.fr".into(),
            role,
            approval_status,
        }
    }

    #[test]
    fn pending_professional_is_not_approved() {
        let pending = identity(Role::Professional, Some(ApprovalStatus::Pending));
        assert_eq!(
            pending.require_approved_professional("bid"),
            Err(ServiceError::ProfessionalNotApproved("a1".into()))
        );
        let approved = identity(Role::Professional, Some(ApprovalStatus::Approved));
        assert!(approved.require_approved_professional("bid").is_ok());
    }

    #[test]
    fn individual_cannot_act_as_admin() {
        let individual = identity(Role::Individual, None);
        assert!(matches!(
            individual.require_admin("validate"),
            Err(ServiceError::NotAuthorizedRole(_))
        ));
        assert!(matches!(
            individual.require_approved_professional("bid"),
            Err(ServiceError::NotAuthorizedRole(_))
        ));
    }
}
