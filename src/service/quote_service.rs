// service/quote_service.rs
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    db::{biddb::BidExt, db::DBClient, quotedb::QuoteRequestExt},
    models::{
        accountmodel::Role,
        bidmodel::BidStatus,
        quotemodel::{Address, QuoteRequest, QuoteRequestStatus},
        EntityType, LifecycleStatus,
    },
    service::{
        audit_service::AuditService,
        bid_service::{refuse_outstanding_bids, REASON_CLAIM_RELEASED, REASON_REQUEST_CANCELLED},
        blob_store::BlobStore,
        error::ServiceError,
        identity_service::Identity,
        lifecycle::{self, load, Modified},
        notification_service::{FanoutSubject, NotificationService, TransitionEvent},
    },
};

#[derive(Debug, Clone, PartialEq)]
pub struct NewQuoteRequest {
    pub project_type: String,
    pub surface_area: f64,
    pub description: String,
    pub address: Address,
    pub photos: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuoteRequestChanges {
    pub project_type: Option<String>,
    pub surface_area: Option<f64>,
    pub description: Option<String>,
    pub address: Option<Address>,
}

fn check_surface(surface_area: f64) -> Result<(), ServiceError> {
    if surface_area.is_finite() && surface_area > 0.0 {
        Ok(())
    } else {
        Err(ServiceError::Validation(
            "surfaceArea must be a positive number".to_string(),
        ))
    }
}

fn require_owner(identity: &Identity, request: &QuoteRequest) -> Result<(), ServiceError> {
    if identity.is(&request.owner_account_id) {
        Ok(())
    } else {
        Err(ServiceError::not_owner(
            EntityType::QuoteRequest,
            &request.id,
            &identity.account_id,
        ))
    }
}

/// Closed requests take no more edits. Reported as a self-transition the
/// table does not allow.
fn require_editable(request: &QuoteRequest) -> Result<(), ServiceError> {
    if request.status.is_editable() {
        Ok(())
    } else {
        Err(lifecycle::invalid_transition(request.status, request.status))
    }
}

#[derive(Debug, Clone)]
pub struct QuoteService {
    db_client: Arc<DBClient>,
    notification_service: Arc<NotificationService>,
    audit_service: Arc<AuditService>,
    blob_store: Arc<dyn BlobStore>,
}

impl QuoteService {
    pub fn new(
        db_client: Arc<DBClient>,
        notification_service: Arc<NotificationService>,
        audit_service: Arc<AuditService>,
        blob_store: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            db_client,
            notification_service,
            audit_service,
            blob_store,
        }
    }

    pub async fn submit(
        &self,
        identity: &Identity,
        new_request: NewQuoteRequest,
    ) -> Result<QuoteRequest, ServiceError> {
        identity.require_role(&[Role::Individual], "submit a quote request")?;
        check_surface(new_request.surface_area)?;

        let now = Utc::now();
        let request = QuoteRequest {
            id: Uuid::new_v4().to_string(),
            owner_account_id: identity.account_id.clone(),
            project_type: new_request.project_type,
            surface_area: new_request.surface_area,
            description: new_request.description,
            address: new_request.address,
            photos: new_request.photos,
            status: QuoteRequestStatus::PendingValidation,
            created_at: now,
            updated_at: now,
            validated_at: None,
            refused_at: None,
            cancelled_at: None,
            signed_at: None,
            accepted_bid_id: None,
            version: 0,
        };

        let request = self.db_client.save_quote_request(&request).await?;
        tracing::info!(
            "📝 Quote request {} submitted by {} ({})",
            request.id,
            identity.account_id,
            request.project_type
        );

        let event = TransitionEvent::created(&request.id, request.status, &identity.account_id);
        self.audit_service.record(&event, None).await;
        self.notification_service
            .dispatch(&event, FanoutSubject::QuoteRequest(&request))
            .await;

        Ok(request)
    }

    pub async fn get(&self, identity: &Identity, request_id: &str) -> Result<QuoteRequest, ServiceError> {
        let request: QuoteRequest = load(&self.db_client, request_id).await?;

        if identity.is_admin() || identity.is(&request.owner_account_id) {
            return Ok(request);
        }

        if identity.role == Role::Professional {
            identity.require_approved_professional("view quote requests")?;
            if request.status.is_open_for_bids() {
                return Ok(request);
            }
            let bids = self.db_client.get_bids_for_request(request_id).await?;
            if bids.iter().any(|bid| identity.is(&bid.professional_account_id)) {
                return Ok(request);
            }
            // Closed to bidding and never bid on: looks the same as absent.
            return Err(ServiceError::not_found(EntityType::QuoteRequest, request_id));
        }

        Err(ServiceError::not_owner(
            EntityType::QuoteRequest,
            request_id,
            &identity.account_id,
        ))
    }

    pub async fn list_mine(&self, identity: &Identity) -> Result<Vec<QuoteRequest>, ServiceError> {
        identity.require_role(&[Role::Individual], "list own quote requests")?;
        Ok(self
            .db_client
            .get_quote_requests_by_owner(&identity.account_id)
            .await?)
    }

    pub async fn list_open(&self, identity: &Identity) -> Result<Vec<QuoteRequest>, ServiceError> {
        identity.require_approved_professional("browse open quote requests")?;
        Ok(self
            .db_client
            .get_quote_requests_by_status(&QuoteRequestStatus::OPEN_FOR_BIDS)
            .await?)
    }

    pub async fn list_pending(&self, identity: &Identity) -> Result<Vec<QuoteRequest>, ServiceError> {
        identity.require_admin("list quote requests awaiting validation")?;
        Ok(self
            .db_client
            .get_quote_requests_by_status(&[QuoteRequestStatus::PendingValidation])
            .await?)
    }

    /// What the caller's role is meant to see: own requests, the open
    /// marketplace, or everything pending for admins.
    pub async fn list_for(&self, identity: &Identity) -> Result<Vec<QuoteRequest>, ServiceError> {
        match identity.role {
            Role::Individual => self.list_mine(identity).await,
            Role::Professional => self.list_open(identity).await,
            Role::Admin => self.list_pending(identity).await,
        }
    }

    pub async fn validate(&self, identity: &Identity, request_id: &str) -> Result<QuoteRequest, ServiceError> {
        identity.require_admin("validate quote requests")?;
        let outcome = self
            .apply(
                request_id,
                QuoteRequestStatus::Validated,
                &identity.account_id,
                None,
                |_| Ok(()),
                |_| {},
            )
            .await?;
        Ok(outcome.into_entity())
    }

    pub async fn refuse(
        &self,
        identity: &Identity,
        request_id: &str,
        reason: Option<&str>,
    ) -> Result<QuoteRequest, ServiceError> {
        identity.require_admin("refuse quote requests")?;
        let outcome = self
            .apply(
                request_id,
                QuoteRequestStatus::Refused,
                &identity.account_id,
                reason,
                |_| Ok(()),
                |_| {},
            )
            .await?;
        Ok(outcome.into_entity())
    }

    pub async fn cancel(&self, identity: &Identity, request_id: &str) -> Result<QuoteRequest, ServiceError> {
        let outcome = self
            .apply(
                request_id,
                QuoteRequestStatus::Cancelled,
                &identity.account_id,
                None,
                |request| require_owner(identity, request),
                |_| {},
            )
            .await?;
        Ok(outcome.into_entity())
    }

    pub async fn edit(
        &self,
        identity: &Identity,
        request_id: &str,
        changes: QuoteRequestChanges,
    ) -> Result<QuoteRequest, ServiceError> {
        if let Some(surface_area) = changes.surface_area {
            check_surface(surface_area)?;
        }

        let outcome = lifecycle::modify(&self.db_client, request_id, |request: &mut QuoteRequest| {
            require_owner(identity, request)?;
            require_editable(request)?;

            let before = request.clone();
            if let Some(project_type) = &changes.project_type {
                request.project_type = project_type.clone();
            }
            if let Some(surface_area) = changes.surface_area {
                request.surface_area = surface_area;
            }
            if let Some(description) = &changes.description {
                request.description = description.clone();
            }
            if let Some(address) = &changes.address {
                request.address = address.clone();
            }
            if *request == before {
                return Ok(false);
            }
            request.updated_at = Utc::now();
            Ok(true)
        })
        .await?;

        Ok(outcome.into_entity())
    }

    /// Upload a photo and append its URL to the request.
    pub async fn attach_photo(
        &self,
        identity: &Identity,
        request_id: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<QuoteRequest, ServiceError> {
        let request: QuoteRequest = load(&self.db_client, request_id).await?;
        require_owner(identity, &request)?;
        require_editable(&request)?;
        if bytes.is_empty() {
            return Err(ServiceError::Validation("photo is empty".to_string()));
        }

        let safe_name: String = file_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let path = format!("quote-requests/{}/{}-{}", request_id, Uuid::new_v4(), safe_name);
        let url = self.blob_store.upload(&path, bytes).await?;

        let outcome = lifecycle::modify(&self.db_client, request_id, |request: &mut QuoteRequest| {
            require_editable(request)?;
            if request.photos.contains(&url) {
                return Ok(false);
            }
            request.photos.push(url.clone());
            request.updated_at = Utc::now();
            Ok(true)
        })
        .await?;

        tracing::info!("📷 Photo attached to quote request {}", request_id);
        Ok(outcome.into_entity())
    }

    /// Transition driven by another entity (bids, messages, account
    /// deletion). No ownership check; the caller has done its own.
    pub async fn advance(
        &self,
        request_id: &str,
        to: QuoteRequestStatus,
        actor_id: &str,
        reason: Option<&str>,
    ) -> Result<Modified<QuoteRequest>, ServiceError> {
        self.apply(request_id, to, actor_id, reason, |_| Ok(()), |_| {})
            .await
    }

    /// Close the request on behalf of an accepted bid. Only one bid can ever
    /// hold the request: a second claimant finds it signed for someone else.
    pub async fn sign_for_bid(
        &self,
        request_id: &str,
        bid_id: &str,
        actor_id: &str,
    ) -> Result<Modified<QuoteRequest>, ServiceError> {
        self.apply(
            request_id,
            QuoteRequestStatus::Signed,
            actor_id,
            None,
            |request| match request.accepted_bid_id.as_deref() {
                Some(holder) if holder != bid_id => Err(lifecycle::invalid_transition(
                    request.status,
                    QuoteRequestStatus::Signed,
                )),
                _ => Ok(()),
            },
            |request| request.accepted_bid_id = Some(bid_id.to_string()),
        )
        .await
    }

    /// Undo `sign_for_bid` when the bid could not be moved to `accepte` after
    /// all. The request goes back to bidding with its remaining bids.
    pub async fn release_claim(
        &self,
        request_id: &str,
        bid_id: &str,
        actor_id: &str,
    ) -> Result<Modified<QuoteRequest>, ServiceError> {
        let bids = self.db_client.get_bids_for_request(request_id).await?;
        let reopened = if bids
            .iter()
            .any(|bid| bid.id != bid_id && bid.status == BidStatus::AwaitingValidation)
        {
            QuoteRequestStatus::InDiscussion
        } else {
            QuoteRequestStatus::Validated
        };

        let outcome = lifecycle::modify(&self.db_client, request_id, |request: &mut QuoteRequest| {
            if request.status != QuoteRequestStatus::Signed
                || request.accepted_bid_id.as_deref() != Some(bid_id)
            {
                return Ok(false);
            }
            request.accepted_bid_id = None;
            request.signed_at = None;
            request.apply_status(reopened, Utc::now());
            Ok(true)
        })
        .await?;

        if let Some(event) = TransitionEvent::from_modified(&outcome, actor_id) {
            tracing::warn!(
                "↩️ Request {} released by bid {}, back to {}",
                request_id,
                bid_id,
                reopened.to_str()
            );
            self.audit_service.record(&event, Some(REASON_CLAIM_RELEASED)).await;
        }
        Ok(outcome)
    }

    /// Like `advance` but only when the request currently sits in one of
    /// `from`; anything else is left alone.
    pub async fn advance_from(
        &self,
        request_id: &str,
        from: &[QuoteRequestStatus],
        to: QuoteRequestStatus,
        actor_id: &str,
    ) -> Result<Modified<QuoteRequest>, ServiceError> {
        let request: QuoteRequest = load(&self.db_client, request_id).await?;
        if !from.contains(&request.status) {
            return Ok(Modified::Unchanged(request));
        }
        match self.advance(request_id, to, actor_id, None).await {
            // Somebody moved it first; keep whatever they decided.
            Err(ServiceError::InvalidTransition { .. }) => {
                let current = load(&self.db_client, request_id).await?;
                Ok(Modified::Unchanged(current))
            }
            other => other,
        }
    }

    async fn apply<C, U>(
        &self,
        request_id: &str,
        to: QuoteRequestStatus,
        actor_id: &str,
        reason: Option<&str>,
        check: C,
        update: U,
    ) -> Result<Modified<QuoteRequest>, ServiceError>
    where
        C: FnMut(&QuoteRequest) -> Result<(), ServiceError> + Send,
        U: FnMut(&mut QuoteRequest) + Send,
    {
        let outcome =
            lifecycle::transition::<QuoteRequest, _, _>(&self.db_client, request_id, to, check, update)
                .await?;

        if let Some(event) = TransitionEvent::from_modified(&outcome, actor_id) {
            self.audit_service.record(&event, reason).await;
            self.notification_service
                .dispatch(&event, FanoutSubject::QuoteRequest(outcome.entity()))
                .await;
        }

        let request = outcome.entity();
        if matches!(request.status, QuoteRequestStatus::Refused | QuoteRequestStatus::Cancelled) {
            let refused = refuse_outstanding_bids(
                &self.db_client,
                &self.notification_service,
                &self.audit_service,
                request,
                REASON_REQUEST_CANCELLED,
                actor_id,
            )
            .await?;
            if !refused.is_empty() {
                tracing::info!(
                    "🧹 Refused {} outstanding bid(s) on closed request {} ({})",
                    refused.len(),
                    request.id,
                    request.status.to_str()
                );
            }
        }

        Ok(outcome)
    }
}
