// service/account_service.rs
use std::sync::Arc;

use chrono::Utc;

use crate::{
    db::{accountdb::AccountExt, db::DBClient, quotedb::QuoteRequestExt, store::StoreError},
    models::{
        accountmodel::{
            Account, ApprovalStatus, BankingDetails, ProfessionalDocuments, ProfessionalProfile, Role,
        },
        quotemodel::QuoteRequestStatus,
        EntityType, LifecycleStatus,
    },
    service::{
        audit_service::AuditService,
        bid_service::{BidService, REASON_ACCOUNT_DELETED},
        error::ServiceError,
        identity_service::Identity,
        lifecycle::{self, load},
        notification_service::TransitionEvent,
        quote_service::QuoteService,
    },
};

#[derive(Debug, Clone, PartialEq)]
pub struct NewProfessionalProfile {
    pub company_name: String,
    pub siret: String,
    pub banking_details: BankingDetails,
    pub documents: ProfessionalDocuments,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub professional: Option<NewProfessionalProfile>,
}

/// What a deletion took down with it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeletionReport {
    pub cancelled_requests: Vec<String>,
    pub refused_bids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AccountService {
    db_client: Arc<DBClient>,
    quote_service: Arc<QuoteService>,
    bid_service: Arc<BidService>,
    audit_service: Arc<AuditService>,
}

impl AccountService {
    pub fn new(
        db_client: Arc<DBClient>,
        quote_service: Arc<QuoteService>,
        bid_service: Arc<BidService>,
        audit_service: Arc<AuditService>,
    ) -> Self {
        Self {
            db_client,
            quote_service,
            bid_service,
            audit_service,
        }
    }

    /// Create the account record for an authenticated principal.
    pub async fn register(
        &self,
        principal: &str,
        registration: Registration,
    ) -> Result<Account, ServiceError> {
        if principal.is_empty() {
            return Err(ServiceError::Unauthenticated);
        }

        let professional = match (registration.role, registration.professional) {
            (Role::Admin, _) => {
                tracing::warn!("🚫 {} tried to self-register as admin", principal);
                return Err(ServiceError::NotAuthorizedRole(
                    "register as admin".to_string(),
                ));
            }
            (Role::Professional, Some(profile)) => Some(ProfessionalProfile {
                company_name: profile.company_name,
                siret: profile.siret,
                banking_details: profile.banking_details,
                documents: profile.documents,
                approval_status: ApprovalStatus::Pending,
            }),
            (Role::Professional, None) => {
                return Err(ServiceError::Validation(
                    "professional accounts need a company profile".to_string(),
                ))
            }
            (Role::Individual, _) => None,
        };

        let now = Utc::now();
        let account = Account {
            id: principal.to_string(),
            email: registration.email,
            role: registration.role,
            display_name: registration.display_name,
            professional,
            created_at: now,
            updated_at: now,
            version: 0,
        };

        let account = self.db_client.save_account(&account).await?;
        tracing::info!("👤 Registered {} as {}", account.id, account.role);
        Ok(account)
    }

    /// Create the configured admin account unless it is already there.
    pub async fn ensure_admin(&self, account_id: &str, email: &str) -> Result<Account, ServiceError> {
        if let Some(existing) = self.db_client.get_account(account_id).await? {
            return Ok(existing);
        }

        let now = Utc::now();
        let admin = Account {
            id: account_id.to_string(),
            email: email.to_string(),
            role: Role::Admin,
            display_name: "Administrateur".to_string(),
            professional: None,
            created_at: now,
            updated_at: now,
            version: 0,
        };
        match self.db_client.save_account(&admin).await {
            Ok(account) => {
                tracing::info!("🔑 Bootstrap admin {} created", account.id);
                Ok(account)
            }
            Err(StoreError::AlreadyExists { .. }) => load(&self.db_client, account_id).await,
            Err(e) => Err(e.into()),
        }
    }

    pub async fn set_approval(
        &self,
        identity: &Identity,
        account_id: &str,
        status: ApprovalStatus,
    ) -> Result<Account, ServiceError> {
        identity.require_admin("approve professionals")?;

        let mut previous = None;
        let outcome = lifecycle::modify(&self.db_client, account_id, |account: &mut Account| {
            let Some(profile) = account.professional.as_mut() else {
                return Err(ServiceError::Validation(format!(
                    "account {} is not a professional",
                    account_id
                )));
            };
            let from = profile.approval_status;
            if from == status {
                return Ok(false);
            }
            if !from.can_transition(status) {
                return Err(lifecycle::invalid_transition(from, status));
            }
            profile.approval_status = status;
            account.updated_at = Utc::now();
            previous = Some(from);
            Ok(true)
        })
        .await?;

        if let (true, Some(from)) = (outcome.is_applied(), previous) {
            tracing::info!(
                "🪪 Professional {} moved {} -> {} by {}",
                account_id,
                from,
                status,
                identity.account_id
            );
            let event = TransitionEvent::changed(account_id, from, status, &identity.account_id);
            self.audit_service.record(&event, None).await;
        }
        Ok(outcome.into_entity())
    }

    pub async fn get_profile(&self, identity: &Identity, account_id: &str) -> Result<Account, ServiceError> {
        if !identity.is_admin() && !identity.is(account_id) {
            return Err(ServiceError::not_owner(
                EntityType::Account,
                account_id,
                &identity.account_id,
            ));
        }
        load(&self.db_client, account_id).await
    }

    pub async fn list_professionals(
        &self,
        identity: &Identity,
        status: Option<ApprovalStatus>,
    ) -> Result<Vec<Account>, ServiceError> {
        identity.require_admin("list professionals")?;
        Ok(self.db_client.get_professionals(status).await?)
    }

    /// Remove an account after closing out everything that still depends on
    /// it. The account record goes last so a failure part way leaves it
    /// retryable.
    pub async fn delete_account(
        &self,
        identity: &Identity,
        account_id: &str,
    ) -> Result<DeletionReport, ServiceError> {
        if !identity.is_admin() && !identity.is(account_id) {
            return Err(ServiceError::not_owner(
                EntityType::Account,
                account_id,
                &identity.account_id,
            ));
        }
        let account: Account = load(&self.db_client, account_id).await?;
        let actor_id = identity.account_id.as_str();
        let mut report = DeletionReport::default();

        match account.role {
            Role::Individual => {
                let requests = self.db_client.get_quote_requests_by_owner(account_id).await?;
                for request in requests.into_iter().filter(|r| !r.status.is_terminal()) {
                    match self
                        .quote_service
                        .advance(
                            &request.id,
                            QuoteRequestStatus::Cancelled,
                            actor_id,
                            Some(REASON_ACCOUNT_DELETED),
                        )
                        .await
                    {
                        Ok(outcome) if outcome.is_applied() => {
                            report.cancelled_requests.push(request.id)
                        }
                        Ok(_) => {}
                        // Closed concurrently; nothing left to cancel.
                        Err(ServiceError::InvalidTransition { .. }) => {}
                        Err(e) => return Err(e),
                    }
                }
            }
            Role::Professional => {
                let refused = self.bid_service.withdraw_all(account_id, actor_id).await?;
                report.refused_bids = refused.into_iter().map(|bid| bid.id).collect();
            }
            Role::Admin => {}
        }

        match self.db_client.delete_account(account_id).await {
            Ok(()) | Err(StoreError::NotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }
        tracing::info!(
            "🗑️ Account {} deleted by {} ({} request(s) cancelled, {} bid(s) refused)",
            account_id,
            actor_id,
            report.cancelled_requests.len(),
            report.refused_bids.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::biddb::BidExt;
    use crate::models::bidmodel::BidStatus;
    use crate::test_utils::{marseille_bid, new_request, test_app};

    fn pro_registration() -> Registration {
        Registration {
            email: "contact@toitures-sud.fr".into(),
            display_name: "Toitures du Sud".into(),
            role: Role::Professional,
            professional: Some(NewProfessionalProfile {
                company_name: "Toitures du Sud".into(),
                siret: "73282932000074".into(),
                banking_details: BankingDetails::default(),
                documents: ProfessionalDocuments::default(),
            }),
        }
    }

    #[tokio::test]
    async fn professionals_register_pending_until_approved() {
        let app = test_app();
        let owner = app.individual("owner").await;
        let admin = app.admin("admin").await;
        let request = app.validated_request(&owner, &admin).await;
        let accounts = &app.state.account_service;

        let account = accounts.register("pro-new", pro_registration()).await.unwrap();
        assert_eq!(account.approval_status(), Some(ApprovalStatus::Pending));

        let pending = app.state.identity_service.resolve(Some("pro-new")).await.unwrap();
        let err = app
            .state
            .bid_service
            .submit_bid(&pending, &request.id, marseille_bid())
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::ProfessionalNotApproved("pro-new".into()));

        let approved = accounts
            .set_approval(&admin, "pro-new", ApprovalStatus::Approved)
            .await
            .unwrap();
        assert!(approved.is_approved_professional());

        let identity = app.state.identity_service.resolve(Some("pro-new")).await.unwrap();
        app.state
            .bid_service
            .submit_bid(&identity, &request.id, marseille_bid())
            .await
            .unwrap();

        let trail = app
            .state
            .audit_service
            .trail(&admin, EntityType::Account, "pro-new")
            .await
            .unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].from_state.as_deref(), Some("pending"));
        assert_eq!(trail[0].to_state, "approved");
    }

    #[tokio::test]
    async fn approval_never_returns_to_pending() {
        let app = test_app();
        let admin = app.admin("admin").await;
        let accounts = &app.state.account_service;
        accounts.register("pro-new", pro_registration()).await.unwrap();

        accounts
            .set_approval(&admin, "pro-new", ApprovalStatus::Rejected)
            .await
            .unwrap();
        let err = accounts
            .set_approval(&admin, "pro-new", ApprovalStatus::Pending)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition { .. }));

        let reinstated = accounts
            .set_approval(&admin, "pro-new", ApprovalStatus::Approved)
            .await
            .unwrap();
        assert!(reinstated.is_approved_professional());
    }

    #[tokio::test]
    async fn registration_rules() {
        let app = test_app();
        let accounts = &app.state.account_service;

        let err = accounts
            .register(
                "sneaky",
                Registration {
                    role: Role::Admin,
                    professional: None,
                    ..pro_registration()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotAuthorizedRole(_)));

        let err = accounts
            .register(
                "pro-bare",
                Registration {
                    professional: None,
                    ..pro_registration()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let individual = accounts
            .register(
                "owner",
                Registration {
                    email: "marie@example.fr".into(),
                    display_name: "Marie".into(),
                    role: Role::Individual,
                    professional: None,
                },
            )
            .await
            .unwrap();
        assert!(individual.professional.is_none());
    }

    #[tokio::test]
    async fn bootstrap_admin_is_created_once() {
        let app = test_app();
        let accounts = &app.state.account_service;

        let first = accounts.ensure_admin("root", "root@etancheconnect.fr").await.unwrap();
        let second = accounts.ensure_admin("root", "other@etancheconnect.fr").await.unwrap();
        assert_eq!(first.role, Role::Admin);
        assert_eq!(second.email, "root@etancheconnect.fr");
    }

    #[tokio::test]
    async fn deleting_an_individual_cancels_open_requests() {
        let app = test_app();
        let owner = app.individual("owner").await;
        let admin = app.admin("admin").await;
        let pro = app.professional("pro-1").await;
        let open = app.validated_request(&owner, &admin).await;
        let waiting = app.state.quote_service.submit(&owner, new_request()).await.unwrap();
        let bid = app
            .state
            .bid_service
            .submit_bid(&pro, &open.id, marseille_bid())
            .await
            .unwrap()
            .bid;

        let report = app.state.account_service.delete_account(&owner, "owner").await.unwrap();
        let mut cancelled = report.cancelled_requests.clone();
        cancelled.sort();
        let mut expected = vec![open.id.clone(), waiting.id.clone()];
        expected.sort();
        assert_eq!(cancelled, expected);

        let bid = app.state.db_client.get_bid(&bid.id).await.unwrap().unwrap();
        assert_eq!(bid.status, BidStatus::Refused);
        assert!(app.state.db_client.get_account("owner").await.unwrap().is_none());

        let err = app.state.identity_service.resolve(Some("owner")).await.unwrap_err();
        assert_eq!(err, ServiceError::AccountRecordMissing("owner".into()));
    }

    #[tokio::test]
    async fn deleting_a_professional_withdraws_bids() {
        let app = test_app();
        let owner = app.individual("owner").await;
        let admin = app.admin("admin").await;
        let pro = app.professional("pro-1").await;
        let request = app.validated_request(&owner, &admin).await;
        let bid = app
            .state
            .bid_service
            .submit_bid(&pro, &request.id, marseille_bid())
            .await
            .unwrap()
            .bid;

        let report = app.state.account_service.delete_account(&admin, "pro-1").await.unwrap();
        assert_eq!(report.refused_bids, vec![bid.id.clone()]);

        let bid = app.state.db_client.get_bid(&bid.id).await.unwrap().unwrap();
        assert_eq!(bid.refusal_reason.as_deref(), Some(REASON_ACCOUNT_DELETED));
        let request = app.state.db_client.get_quote_request(&request.id).await.unwrap().unwrap();
        assert_eq!(request.status, QuoteRequestStatus::Validated);
    }

    #[tokio::test]
    async fn only_self_or_admin_deletes() {
        let app = test_app();
        let owner = app.individual("owner").await;
        app.individual("other").await;

        let err = app
            .state
            .account_service
            .delete_account(&owner, "other")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotOwner { .. }));
        assert!(app.state.db_client.get_account("other").await.unwrap().is_some());
    }
}
