// service/bid_service.rs
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    db::{biddb::BidExt, db::DBClient},
    models::{
        accountmodel::{Account, Role},
        bidmodel::{BidOrigin, BidStatus, BidTotals, LineItem, ProfessionalBid},
        messagemodel::Message,
        quotemodel::{QuoteRequest, QuoteRequestStatus},
        EntityType, LifecycleStatus,
    },
    service::{
        audit_service::AuditService,
        error::ServiceError,
        identity_service::Identity,
        lifecycle::{self, load, Modified},
        notification_service::{FanoutSubject, NotificationService, TransitionEvent},
        quote_service::QuoteService,
        signature_provider::{SignatureOutcome, SignatureProvider},
    },
    utils::pricing::{
        compute_totals, verify_client_totals, ClientTotals, StaleTotals, MAX_QUANTITY,
        MAX_UNIT_PRICE_CENTS,
    },
};

pub const REASON_REQUEST_CANCELLED: &str = "request_cancelled";
pub const REASON_OTHER_BID_ACCEPTED: &str = "other_bid_accepted";
pub const REASON_ACCOUNT_DELETED: &str = "account_deleted";
pub const REASON_CLAIM_RELEASED: &str = "accepted_bid_unavailable";

/// Actor recorded for transitions driven by the payment webhook.
pub const PAYMENT_ACTOR: &str = "payment-provider";

#[derive(Debug, Clone, PartialEq)]
pub struct BidLines {
    pub labor: LineItem,
    pub consumables: Vec<LineItem>,
    pub non_consumables: Vec<LineItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewBid {
    pub lines: BidLines,
    pub client_totals: Option<ClientTotals>,
    pub origin: BidOrigin,
}

/// A stored bid plus the soft warning raised when the client's own totals
/// disagreed with ours.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedBid {
    pub bid: ProfessionalBid,
    pub stale_totals: Option<StaleTotals>,
}

fn check_line(item: &LineItem, label: &str) -> Result<(), ServiceError> {
    if item.description.trim().is_empty() {
        return Err(ServiceError::Validation(format!("{} needs a description", label)));
    }
    if !item.quantity.is_finite() || item.quantity <= 0.0 || item.quantity > MAX_QUANTITY {
        return Err(ServiceError::Validation(format!(
            "{} quantity must be a positive number up to {}",
            label, MAX_QUANTITY
        )));
    }
    if item.unit_price.cents() < 0 || item.unit_price.cents() > MAX_UNIT_PRICE_CENTS {
        return Err(ServiceError::Validation(format!(
            "{} unit price must be between 0 and {} cents",
            label, MAX_UNIT_PRICE_CENTS
        )));
    }
    Ok(())
}

fn check_lines(lines: &BidLines) -> Result<(), ServiceError> {
    check_line(&lines.labor, "labor")?;
    for item in &lines.consumables {
        check_line(item, "consumable material")?;
    }
    for item in &lines.non_consumables {
        check_line(item, "non-consumable material")?;
    }
    Ok(())
}

/// The request has been signed for this bid, even if the bid itself has not
/// been written as accepted yet.
fn holds(request: &QuoteRequest, bid_id: &str) -> bool {
    request.accepted_bid_id.as_deref() == Some(bid_id)
}

fn require_open(request: &QuoteRequest) -> Result<(), ServiceError> {
    if request.status.is_open_for_bids() {
        Ok(())
    } else {
        Err(ServiceError::RequestNotValidated {
            request_id: request.id.clone(),
            status: request.status.to_str().to_string(),
        })
    }
}

fn require_request_owner(identity: &Identity, request: &QuoteRequest) -> Result<(), ServiceError> {
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

fn require_bidder(identity: &Identity, bid: &ProfessionalBid) -> Result<(), ServiceError> {
    if identity.is(&bid.professional_account_id) {
        Ok(())
    } else {
        Err(ServiceError::not_owner(
            EntityType::ProfessionalBid,
            &bid.id,
            &identity.account_id,
        ))
    }
}

fn check_client_totals(
    subject_id: &str,
    client_totals: Option<&ClientTotals>,
    computed: &BidTotals,
) -> Option<StaleTotals> {
    let client_totals = client_totals?;
    match verify_client_totals(client_totals, computed) {
        Ok(()) => None,
        Err(stale) => {
            tracing::warn!("🧮 {} ({}); using server totals", stale, subject_id);
            Some(stale)
        }
    }
}

/// Audit and fan out a bid transition that was actually written.
async fn announce(
    notification_service: &NotificationService,
    audit_service: &AuditService,
    outcome: &Modified<ProfessionalBid>,
    request: &QuoteRequest,
    actor_id: &str,
    reason: Option<&str>,
) {
    if let Some(event) = TransitionEvent::from_modified(outcome, actor_id) {
        audit_service.record(&event, reason).await;
        notification_service
            .dispatch(
                &event,
                FanoutSubject::Bid {
                    bid: outcome.entity(),
                    request,
                },
            )
            .await;
    }
}

/// Refuse every bid on `request` still waiting for a decision. Bids that
/// were already accepted or decided are left alone, so running this twice
/// changes nothing.
pub async fn refuse_outstanding_bids(
    db_client: &DBClient,
    notification_service: &NotificationService,
    audit_service: &AuditService,
    request: &QuoteRequest,
    reason: &str,
    actor_id: &str,
) -> Result<Vec<ProfessionalBid>, ServiceError> {
    let bids = db_client.get_bids_for_request(&request.id).await?;
    let mut refused = Vec::new();

    for bid in bids
        .into_iter()
        .filter(|bid| bid.status.is_outstanding() && !holds(request, &bid.id))
    {
        let outcome = match lifecycle::transition::<ProfessionalBid, _, _>(
            db_client,
            &bid.id,
            BidStatus::Refused,
            |_| Ok(()),
            |bid| bid.refusal_reason = Some(reason.to_string()),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(ServiceError::InvalidTransition { .. }) | Err(ServiceError::NotFound { .. }) => {
                tracing::debug!(bid = %bid.id, "bid left the outstanding set, not refusing");
                continue;
            }
            Err(e) => return Err(e),
        };

        announce(
            notification_service,
            audit_service,
            &outcome,
            request,
            actor_id,
            Some(reason),
        )
        .await;
        if outcome.is_applied() {
            refused.push(outcome.into_entity());
        }
    }

    Ok(refused)
}

#[derive(Debug, Clone)]
pub struct BidService {
    db_client: Arc<DBClient>,
    quote_service: Arc<QuoteService>,
    notification_service: Arc<NotificationService>,
    audit_service: Arc<AuditService>,
    signature_provider: Arc<dyn SignatureProvider>,
}

impl BidService {
    pub fn new(
        db_client: Arc<DBClient>,
        quote_service: Arc<QuoteService>,
        notification_service: Arc<NotificationService>,
        audit_service: Arc<AuditService>,
        signature_provider: Arc<dyn SignatureProvider>,
    ) -> Self {
        Self {
            db_client,
            quote_service,
            notification_service,
            audit_service,
            signature_provider,
        }
    }

    /// Store a bid without showing it to the request owner yet.
    pub async fn save_draft(
        &self,
        identity: &Identity,
        request_id: &str,
        lines: BidLines,
        origin: BidOrigin,
    ) -> Result<ProfessionalBid, ServiceError> {
        let (request, client_email) = self.prepare(identity, request_id, &lines, &origin).await?;
        let bid = self
            .create(identity, &request, client_email, lines, origin, BidStatus::Draft)
            .await?;
        tracing::info!("🗒️ Draft bid {} saved on request {}", bid.id, request.id);
        Ok(bid)
    }

    /// Send a draft to the request owner. Totals are recomputed from the lines
    /// as they stand now.
    pub async fn submit_draft(
        &self,
        identity: &Identity,
        bid_id: &str,
        client_totals: Option<ClientTotals>,
    ) -> Result<SubmittedBid, ServiceError> {
        identity.require_approved_professional("submit bids")?;
        let draft: ProfessionalBid = load(&self.db_client, bid_id).await?;
        require_bidder(identity, &draft)?;
        let request: QuoteRequest = load(&self.db_client, &draft.request_id).await?;
        require_open(&request)?;

        let totals = compute_totals(
            &draft.labor_details,
            &draft.consumable_materials,
            &draft.non_consumable_materials,
        )?;
        let stale_totals = check_client_totals(bid_id, client_totals.as_ref(), &totals);

        let outcome = lifecycle::transition::<ProfessionalBid, _, _>(
            &self.db_client,
            bid_id,
            BidStatus::AwaitingValidation,
            |bid| require_bidder(identity, bid),
            |bid| bid.totals = totals,
        )
        .await?;

        announce(
            &self.notification_service,
            &self.audit_service,
            &outcome,
            &request,
            &identity.account_id,
            None,
        )
        .await;
        self.open_discussion(&request.id, &identity.account_id).await?;

        Ok(SubmittedBid {
            bid: outcome.into_entity(),
            stale_totals,
        })
    }

    pub async fn submit_bid(
        &self,
        identity: &Identity,
        request_id: &str,
        new_bid: NewBid,
    ) -> Result<SubmittedBid, ServiceError> {
        let (request, client_email) = self
            .prepare(identity, request_id, &new_bid.lines, &new_bid.origin)
            .await?;

        let totals = compute_totals(
            &new_bid.lines.labor,
            &new_bid.lines.consumables,
            &new_bid.lines.non_consumables,
        )?;
        let stale_totals =
            check_client_totals(request_id, new_bid.client_totals.as_ref(), &totals);

        let bid = self
            .create(
                identity,
                &request,
                client_email,
                new_bid.lines,
                new_bid.origin,
                BidStatus::AwaitingValidation,
            )
            .await?;
        tracing::info!(
            "💶 Bid {} submitted on request {} by {} ({} TTC)",
            bid.id,
            request.id,
            identity.account_id,
            bid.totals.total_ttc
        );

        self.open_discussion(&request.id, &identity.account_id).await?;
        Ok(SubmittedBid { bid, stale_totals })
    }

    /// The owner picks this bid. The request is claimed first so that two
    /// accepts on different bids cannot both win.
    pub async fn accept_bid(&self, identity: &Identity, bid_id: &str) -> Result<ProfessionalBid, ServiceError> {
        let bid: ProfessionalBid = load(&self.db_client, bid_id).await?;
        let request: QuoteRequest = load(&self.db_client, &bid.request_id).await?;
        require_request_owner(identity, &request)?;

        let already_holder = request.accepted_bid_id.as_deref() == Some(bid_id);
        match bid.status {
            BidStatus::AwaitingValidation => {}
            _ if already_holder => {}
            other => return Err(lifecycle::invalid_transition(other, BidStatus::Accepted)),
        }

        let request = self
            .quote_service
            .sign_for_bid(&request.id, bid_id, &identity.account_id)
            .await?
            .into_entity();

        let accepted = lifecycle::modify(&self.db_client, bid_id, |bid: &mut ProfessionalBid| {
            match bid.status {
                BidStatus::AwaitingValidation => {
                    bid.apply_status(BidStatus::Accepted, Utc::now());
                    Ok(true)
                }
                BidStatus::Accepted
                | BidStatus::AwaitingSignature
                | BidStatus::Signed
                | BidStatus::AwaitingPayment
                | BidStatus::Paid => Ok(false),
                other => Err(lifecycle::invalid_transition(other, BidStatus::Accepted)),
            }
        })
        .await;
        let outcome = match accepted {
            Ok(outcome) => outcome,
            Err(error) => {
                // The bid left the running between the claim and this write.
                tracing::warn!(
                    "⚠️ Bid {} could not be accepted after request {} was signed for it: {}",
                    bid_id,
                    request.id,
                    error
                );
                if let Err(release) = self
                    .quote_service
                    .release_claim(&request.id, bid_id, &identity.account_id)
                    .await
                {
                    tracing::error!(
                        "🔥 Request {} still signed for bid {}: {}",
                        request.id,
                        bid_id,
                        release
                    );
                }
                return Err(error);
            }
        };
        if outcome.is_applied() {
            tracing::info!(
                "🔄 {} {} moved en_attente_validation -> accepte",
                EntityType::ProfessionalBid,
                bid_id
            );
        }

        announce(
            &self.notification_service,
            &self.audit_service,
            &outcome,
            &request,
            &identity.account_id,
            None,
        )
        .await;

        refuse_outstanding_bids(
            &self.db_client,
            &self.notification_service,
            &self.audit_service,
            &request,
            REASON_OTHER_BID_ACCEPTED,
            &identity.account_id,
        )
        .await?;

        Ok(outcome.into_entity())
    }

    pub async fn refuse_bid(
        &self,
        identity: &Identity,
        bid_id: &str,
        reason: Option<&str>,
    ) -> Result<ProfessionalBid, ServiceError> {
        let bid: ProfessionalBid = load(&self.db_client, bid_id).await?;
        let request: QuoteRequest = load(&self.db_client, &bid.request_id).await?;
        require_request_owner(identity, &request)?;
        if holds(&request, bid_id) {
            return Err(lifecycle::invalid_transition(BidStatus::Accepted, BidStatus::Refused));
        }

        let outcome = lifecycle::transition::<ProfessionalBid, _, _>(
            &self.db_client,
            bid_id,
            BidStatus::Refused,
            // Drafts are invisible to the owner.
            |bid| match bid.status {
                BidStatus::Draft => Err(ServiceError::not_found(EntityType::ProfessionalBid, &bid.id)),
                _ => Ok(()),
            },
            |bid| bid.refusal_reason = reason.map(str::to_string),
        )
        .await?;

        announce(
            &self.notification_service,
            &self.audit_service,
            &outcome,
            &request,
            &identity.account_id,
            reason,
        )
        .await;

        self.reopen_if_undecided(&request.id, &identity.account_id).await?;
        Ok(outcome.into_entity())
    }

    /// Run the accepted bid through e-signature. A failed or declined
    /// signature leaves the bid waiting for signature; calling again retries.
    pub async fn sign_bid(&self, identity: &Identity, bid_id: &str) -> Result<ProfessionalBid, ServiceError> {
        let bid: ProfessionalBid = load(&self.db_client, bid_id).await?;
        let request: QuoteRequest = load(&self.db_client, &bid.request_id).await?;
        require_request_owner(identity, &request)?;
        let actor_id = identity.account_id.as_str();

        let bid = match bid.status {
            BidStatus::Accepted => {
                self.move_bid(&request, bid_id, BidStatus::AwaitingSignature, actor_id, None)
                    .await?
            }
            BidStatus::AwaitingSignature => bid,
            BidStatus::Signed => {
                return self
                    .move_bid(&request, bid_id, BidStatus::AwaitingPayment, actor_id, None)
                    .await
            }
            BidStatus::AwaitingPayment | BidStatus::Paid => return Ok(bid),
            other => return Err(lifecycle::invalid_transition(other, BidStatus::AwaitingSignature)),
        };

        let signer: Account = load(&self.db_client, &request.owner_account_id).await?;
        let reference = match self.signature_provider.request_signature(&bid, &signer).await {
            Ok(SignatureOutcome::Signed { reference }) => reference,
            Ok(SignatureOutcome::Declined { reason }) => {
                tracing::warn!("✍️ Signature declined for bid {}: {}", bid_id, reason);
                return Err(ServiceError::Collaborator(format!(
                    "signature declined: {}",
                    reason
                )));
            }
            Err(e) => {
                tracing::warn!("⚠️ Signature request for bid {} failed: {}", bid_id, e);
                return Err(e.into());
            }
        };

        self.move_bid(&request, bid_id, BidStatus::Signed, actor_id, Some(&reference))
            .await?;
        self.move_bid(&request, bid_id, BidStatus::AwaitingPayment, actor_id, None)
            .await
    }

    /// Payment confirmed by the payment provider. A repeated callback finds
    /// the bid already paid and changes nothing.
    pub async fn record_payment(
        &self,
        bid_id: &str,
        reference: &str,
    ) -> Result<Modified<ProfessionalBid>, ServiceError> {
        let outcome = lifecycle::transition::<ProfessionalBid, _, _>(
            &self.db_client,
            bid_id,
            BidStatus::Paid,
            |_| Ok(()),
            |bid| bid.payment_reference = Some(reference.to_string()),
        )
        .await?;

        if outcome.is_applied() {
            let request: QuoteRequest = load(&self.db_client, &outcome.entity().request_id).await?;
            announce(
                &self.notification_service,
                &self.audit_service,
                &outcome,
                &request,
                PAYMENT_ACTOR,
                Some(reference),
            )
            .await;
            tracing::info!("💳 Payment {} recorded for bid {}", reference, bid_id);
        } else {
            tracing::info!("💳 Duplicate payment callback for bid {} ignored", bid_id);
        }
        Ok(outcome)
    }

    pub async fn get(&self, identity: &Identity, bid_id: &str) -> Result<ProfessionalBid, ServiceError> {
        let bid: ProfessionalBid = load(&self.db_client, bid_id).await?;
        if identity.is_admin() || identity.is(&bid.professional_account_id) {
            return Ok(bid);
        }
        let request: QuoteRequest = load(&self.db_client, &bid.request_id).await?;
        if identity.is(&request.owner_account_id) {
            if bid.status == BidStatus::Draft {
                return Err(ServiceError::not_found(EntityType::ProfessionalBid, bid_id));
            }
            return Ok(bid);
        }
        Err(ServiceError::not_owner(
            EntityType::ProfessionalBid,
            bid_id,
            &identity.account_id,
        ))
    }

    /// Owner sees submitted bids, admins see everything, a professional sees
    /// only their own.
    pub async fn list_for_request(
        &self,
        identity: &Identity,
        request_id: &str,
    ) -> Result<Vec<ProfessionalBid>, ServiceError> {
        let request: QuoteRequest = load(&self.db_client, request_id).await?;
        let bids = self.db_client.get_bids_for_request(request_id).await?;

        if identity.is_admin() {
            return Ok(bids);
        }
        if identity.is(&request.owner_account_id) {
            return Ok(bids
                .into_iter()
                .filter(|bid| bid.status != BidStatus::Draft)
                .collect());
        }
        if identity.role == Role::Professional {
            return Ok(bids
                .into_iter()
                .filter(|bid| identity.is(&bid.professional_account_id))
                .collect());
        }
        Err(ServiceError::not_owner(
            EntityType::QuoteRequest,
            request_id,
            &identity.account_id,
        ))
    }

    pub async fn list_mine(&self, identity: &Identity) -> Result<Vec<ProfessionalBid>, ServiceError> {
        identity.require_role(&[Role::Professional], "list own bids")?;
        Ok(self
            .db_client
            .get_bids_by_professional(&identity.account_id)
            .await?)
    }

    /// Refuse every undecided bid of a professional whose account is going
    /// away.
    pub async fn withdraw_all(
        &self,
        professional_id: &str,
        actor_id: &str,
    ) -> Result<Vec<ProfessionalBid>, ServiceError> {
        let bids = self.db_client.get_bids_by_professional(professional_id).await?;
        let mut refused = Vec::new();

        for bid in bids.into_iter().filter(|bid| bid.status.is_outstanding()) {
            let request: QuoteRequest = match load(&self.db_client, &bid.request_id).await {
                Ok(request) => request,
                Err(ServiceError::NotFound { .. }) => continue,
                Err(e) => return Err(e),
            };
            if holds(&request, &bid.id) {
                continue;
            }
            let outcome = match lifecycle::transition::<ProfessionalBid, _, _>(
                &self.db_client,
                &bid.id,
                BidStatus::Refused,
                |_| Ok(()),
                |bid| bid.refusal_reason = Some(REASON_ACCOUNT_DELETED.to_string()),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(ServiceError::InvalidTransition { .. }) => continue,
                Err(e) => return Err(e),
            };

            announce(
                &self.notification_service,
                &self.audit_service,
                &outcome,
                &request,
                actor_id,
                Some(REASON_ACCOUNT_DELETED),
            )
            .await;
            self.reopen_if_undecided(&request.id, actor_id).await?;
            if outcome.is_applied() {
                refused.push(outcome.into_entity());
            }
        }
        Ok(refused)
    }

    /// Shared checks for a new bid. Returns the request and the e-mail of
    /// its owner.
    async fn prepare(
        &self,
        identity: &Identity,
        request_id: &str,
        lines: &BidLines,
        origin: &BidOrigin,
    ) -> Result<(QuoteRequest, String), ServiceError> {
        identity.require_approved_professional("submit bids")?;
        let request: QuoteRequest = load(&self.db_client, request_id).await?;
        require_open(&request)?;
        check_lines(lines)?;

        if let BidOrigin::QuestionReply { message_id } = origin {
            let message: Message = load(&self.db_client, message_id).await?;
            if message.request_id.as_deref() != Some(request_id) {
                return Err(ServiceError::Validation(format!(
                    "message {} does not belong to quote request {}",
                    message_id, request_id
                )));
            }
        }

        let owner: Account = load(&self.db_client, &request.owner_account_id).await?;
        Ok((request, owner.email))
    }

    async fn create(
        &self,
        identity: &Identity,
        request: &QuoteRequest,
        client_email: String,
        lines: BidLines,
        origin: BidOrigin,
        status: BidStatus,
    ) -> Result<ProfessionalBid, ServiceError> {
        let now = Utc::now();
        let totals = compute_totals(&lines.labor, &lines.consumables, &lines.non_consumables)?;
        let mut bid = ProfessionalBid {
            id: Uuid::new_v4().to_string(),
            request_id: request.id.clone(),
            professional_account_id: identity.account_id.clone(),
            client_email,
            origin,
            labor_details: lines.labor,
            consumable_materials: lines.consumables,
            non_consumable_materials: lines.non_consumables,
            totals,
            status,
            refusal_reason: None,
            created_at: now,
            updated_at: now,
            submitted_at: None,
            signed_at: None,
            paid_at: None,
            payment_reference: None,
            version: 0,
        };
        bid.apply_status(status, now);

        let bid = self.db_client.save_bid(&bid).await?;
        let event = TransitionEvent::created(&bid.id, bid.status, &identity.account_id);
        self.audit_service.record(&event, None).await;
        self.notification_service
            .dispatch(
                &event,
                FanoutSubject::Bid {
                    bid: &bid,
                    request,
                },
            )
            .await;
        Ok(bid)
    }

    async fn move_bid(
        &self,
        request: &QuoteRequest,
        bid_id: &str,
        to: BidStatus,
        actor_id: &str,
        reason: Option<&str>,
    ) -> Result<ProfessionalBid, ServiceError> {
        let outcome = lifecycle::transition::<ProfessionalBid, _, _>(
            &self.db_client,
            bid_id,
            to,
            |_| Ok(()),
            |_| {},
        )
        .await?;
        announce(
            &self.notification_service,
            &self.audit_service,
            &outcome,
            request,
            actor_id,
            reason,
        )
        .await;
        Ok(outcome.into_entity())
    }

    /// First submitted bid puts the request into discussion.
    async fn open_discussion(&self, request_id: &str, actor_id: &str) -> Result<(), ServiceError> {
        self.quote_service
            .advance_from(
                request_id,
                &[QuoteRequestStatus::Validated, QuoteRequestStatus::AwaitingResponse],
                QuoteRequestStatus::InDiscussion,
                actor_id,
            )
            .await?;
        Ok(())
    }

    /// Back to `valide` once nothing submitted is left to decide on.
    async fn reopen_if_undecided(&self, request_id: &str, actor_id: &str) -> Result<(), ServiceError> {
        let bids = self.db_client.get_bids_for_request(request_id).await?;
        if bids
            .iter()
            .any(|bid| bid.status == BidStatus::AwaitingValidation)
        {
            return Ok(());
        }
        self.quote_service
            .advance_from(
                request_id,
                &[QuoteRequestStatus::InDiscussion],
                QuoteRequestStatus::Validated,
                actor_id,
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::db::quotedb::QuoteRequestExt;
    use crate::models::accountmodel::ApprovalStatus;
    use crate::models::notificationmodel::NotificationType;
    use crate::test_utils::{
        line, marseille_bid, marseille_lines, new_request, test_app, test_app_with_signature,
        FlakySignatureProvider, TestApp,
    };
    use crate::utils::pricing::Money;

    async fn request_status(app: &TestApp, request_id: &str) -> QuoteRequestStatus {
        app.state
            .db_client
            .get_quote_request(request_id)
            .await
            .unwrap()
            .unwrap()
            .status
    }

    #[tokio::test]
    async fn marseille_bid_goes_from_submission_to_payment() {
        let app = test_app();
        let owner = app.individual("owner").await;
        let admin = app.admin("admin").await;
        let pro_1 = app.professional("pro-1").await;
        let pro_2 = app.professional("pro-2").await;
        let request = app.validated_request(&owner, &admin).await;
        let bids = &app.state.bid_service;

        let winner = bids.submit_bid(&pro_1, &request.id, marseille_bid()).await.unwrap().bid;
        let loser = bids.submit_bid(&pro_2, &request.id, marseille_bid()).await.unwrap().bid;
        assert_eq!(winner.status, BidStatus::AwaitingValidation);
        assert_eq!(winner.client_email, "owner@example.fr");
        assert_eq!(winner.totals.subtotal_ht, Money::from_euros(600.0));
        assert_eq!(winner.totals.tva, Money::from_euros(60.0));
        assert_eq!(winner.totals.total_ttc, Money::from_euros(660.0));
        assert_eq!(winner.totals.deposit, Money::from_euros(198.0));
        assert_eq!(winner.totals.platform_commission, Money::from_euros(13.86));
        assert_eq!(request_status(&app, &request.id).await, QuoteRequestStatus::InDiscussion);
        assert_eq!(app.count_notifications("owner", NotificationType::QuoteValidation).await, 2);

        let accepted = bids.accept_bid(&owner, &winner.id).await.unwrap();
        assert_eq!(accepted.status, BidStatus::Accepted);
        let signed_request = app
            .state
            .db_client
            .get_quote_request(&request.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(signed_request.status, QuoteRequestStatus::Signed);
        assert_eq!(signed_request.accepted_bid_id.as_deref(), Some(winner.id.as_str()));

        let loser = app.state.db_client.get_bid(&loser.id).await.unwrap().unwrap();
        assert_eq!(loser.status, BidStatus::Refused);
        assert_eq!(loser.refusal_reason.as_deref(), Some(REASON_OTHER_BID_ACCEPTED));

        let awaiting_payment = bids.sign_bid(&owner, &winner.id).await.unwrap();
        assert_eq!(awaiting_payment.status, BidStatus::AwaitingPayment);
        assert!(awaiting_payment.signed_at.is_some());

        let first = bids.record_payment(&winner.id, "pay_123").await.unwrap();
        let second = bids.record_payment(&winner.id, "pay_123").await.unwrap();
        assert!(first.is_applied());
        assert!(!second.is_applied());
        assert_eq!(second.entity().status, BidStatus::Paid);
        assert_eq!(second.entity().payment_reference.as_deref(), Some("pay_123"));

        assert_eq!(app.count_notifications("owner", NotificationType::PaymentCompleted).await, 1);
        assert_eq!(app.count_notifications("pro-1", NotificationType::PaymentCompleted).await, 1);
        assert_eq!(app.count_notifications("pro-2", NotificationType::PaymentCompleted).await, 0);
    }

    #[tokio::test]
    async fn server_totals_win_over_client_totals() {
        let app = test_app();
        let owner = app.individual("owner").await;
        let admin = app.admin("admin").await;
        let pro = app.professional("pro-1").await;
        let request = app.validated_request(&owner, &admin).await;

        let mut lines = marseille_lines();
        lines.consumables.push(line("Primaire d'accrochage", 3.0, 19.99));
        let submitted = app
            .state
            .bid_service
            .submit_bid(
                &pro,
                &request.id,
                NewBid {
                    lines,
                    client_totals: Some(ClientTotals {
                        total_ttc: Some(1.0),
                        ..Default::default()
                    }),
                    origin: BidOrigin::Marketplace,
                },
            )
            .await
            .unwrap();

        assert!(submitted.stale_totals.is_some());
        assert_eq!(submitted.bid.totals.subtotal_ht.cents(), 65_997);
        assert_eq!(submitted.bid.totals.total_ttc.cents(), 72_597);
    }

    #[tokio::test]
    async fn pending_professional_cannot_bid() {
        let app = test_app();
        let owner = app.individual("owner").await;
        let admin = app.admin("admin").await;
        let pending = app
            .account("pro-9", Role::Professional, Some(ApprovalStatus::Pending))
            .await;
        let request = app.validated_request(&owner, &admin).await;

        let err = app
            .state
            .bid_service
            .submit_bid(&pending, &request.id, marseille_bid())
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::ProfessionalNotApproved("pro-9".into()));
    }

    #[tokio::test]
    async fn unvalidated_request_takes_no_bids() {
        let app = test_app();
        let owner = app.individual("owner").await;
        let pro = app.professional("pro-1").await;
        let request = app.state.quote_service.submit(&owner, new_request()).await.unwrap();

        let err = app
            .state
            .bid_service
            .submit_bid(&pro, &request.id, marseille_bid())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ServiceError::RequestNotValidated {
                request_id: request.id.clone(),
                status: "en_attente".into(),
            }
        );
    }

    #[tokio::test]
    async fn drafts_stay_hidden_until_submitted() {
        let app = test_app();
        let owner = app.individual("owner").await;
        let admin = app.admin("admin").await;
        let pro = app.professional("pro-1").await;
        let request = app.validated_request(&owner, &admin).await;
        let bids = &app.state.bid_service;

        let draft = bids
            .save_draft(&pro, &request.id, marseille_lines(), BidOrigin::Marketplace)
            .await
            .unwrap();
        assert_eq!(draft.status, BidStatus::Draft);
        assert!(bids.list_for_request(&owner, &request.id).await.unwrap().is_empty());
        assert!(matches!(
            bids.get(&owner, &draft.id).await,
            Err(ServiceError::NotFound { .. })
        ));
        assert_eq!(bids.list_mine(&pro).await.unwrap().len(), 1);
        assert_eq!(request_status(&app, &request.id).await, QuoteRequestStatus::Validated);

        let submitted = bids.submit_draft(&pro, &draft.id, None).await.unwrap();
        assert_eq!(submitted.bid.status, BidStatus::AwaitingValidation);
        assert!(submitted.bid.submitted_at.is_some());
        assert_eq!(bids.list_for_request(&owner, &request.id).await.unwrap().len(), 1);
        assert_eq!(request_status(&app, &request.id).await, QuoteRequestStatus::InDiscussion);
        assert_eq!(app.count_notifications("owner", NotificationType::QuoteValidation).await, 1);
    }

    #[tokio::test]
    async fn refusing_the_last_bid_reopens_the_request() {
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
        let refused = app
            .state
            .bid_service
            .refuse_bid(&owner, &bid.id, Some("trop cher"))
            .await
            .unwrap();
        assert_eq!(refused.status, BidStatus::Refused);
        assert_eq!(refused.refusal_reason.as_deref(), Some("trop cher"));
        assert_eq!(request_status(&app, &request.id).await, QuoteRequestStatus::Validated);
        assert_eq!(app.count_notifications("pro-1", NotificationType::QuoteValidation).await, 1);
    }

    #[tokio::test]
    async fn only_the_owner_decides() {
        let app = test_app();
        let owner = app.individual("owner").await;
        let stranger = app.individual("stranger").await;
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

        for identity in [&stranger, &pro, &admin] {
            let err = app.state.bid_service.accept_bid(identity, &bid.id).await.unwrap_err();
            assert!(matches!(err, ServiceError::NotOwner { .. }));
        }
    }

    #[tokio::test]
    async fn concurrent_accepts_pick_one_winner() {
        let app = test_app();
        let owner = app.individual("owner").await;
        let admin = app.admin("admin").await;
        let pro_1 = app.professional("pro-1").await;
        let pro_2 = app.professional("pro-2").await;
        let request = app.validated_request(&owner, &admin).await;
        let bids = &app.state.bid_service;

        let a = bids.submit_bid(&pro_1, &request.id, marseille_bid()).await.unwrap().bid;
        let b = bids.submit_bid(&pro_2, &request.id, marseille_bid()).await.unwrap().bid;

        let (first, second) = tokio::join!(bids.accept_bid(&owner, &a.id), bids.accept_bid(&owner, &b.id));
        assert_eq!(first.is_ok() as u8 + second.is_ok() as u8, 1);

        let stored = bids.list_for_request(&owner, &request.id).await.unwrap();
        let accepted: Vec<_> = stored.iter().filter(|bid| bid.status == BidStatus::Accepted).collect();
        let refused: Vec<_> = stored.iter().filter(|bid| bid.status == BidStatus::Refused).collect();
        assert_eq!(accepted.len(), 1);
        assert_eq!(refused.len(), 1);

        let request = app.state.db_client.get_quote_request(&request.id).await.unwrap().unwrap();
        assert_eq!(request.accepted_bid_id.as_deref(), Some(accepted[0].id.as_str()));
    }

    #[tokio::test]
    async fn accepting_again_changes_nothing() {
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

        let first = app.state.bid_service.accept_bid(&owner, &bid.id).await.unwrap();
        let second = app.state.bid_service.accept_bid(&owner, &bid.id).await.unwrap();
        assert_eq!(first.version, second.version);
        assert_eq!(app.count_notifications("pro-1", NotificationType::QuoteValidation).await, 1);
    }

    #[tokio::test]
    async fn declined_signature_can_be_retried() {
        let app = test_app_with_signature(Arc::new(FlakySignatureProvider::new(1)));
        let owner = app.individual("owner").await;
        let admin = app.admin("admin").await;
        let pro = app.professional("pro-1").await;
        let request = app.validated_request(&owner, &admin).await;
        let bids = &app.state.bid_service;

        let bid = bids.submit_bid(&pro, &request.id, marseille_bid()).await.unwrap().bid;
        bids.accept_bid(&owner, &bid.id).await.unwrap();

        let err = bids.sign_bid(&owner, &bid.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Collaborator(_)));
        let waiting = app.state.db_client.get_bid(&bid.id).await.unwrap().unwrap();
        assert_eq!(waiting.status, BidStatus::AwaitingSignature);

        let signed = bids.sign_bid(&owner, &bid.id).await.unwrap();
        assert_eq!(signed.status, BidStatus::AwaitingPayment);
    }

    #[tokio::test]
    async fn question_reply_bid_must_match_its_request() {
        let app = test_app();
        let owner = app.individual("owner").await;
        let admin = app.admin("admin").await;
        let pro = app.professional("pro-1").await;
        let request = app.validated_request(&owner, &admin).await;
        let other = app.validated_request(&owner, &admin).await;

        let question = app
            .state
            .moderation_service
            .send_message(
                &owner,
                crate::service::moderation_service::NewMessage {
                    recipient_id: "pro-1".into(),
                    request_id: Some(other.id.clone()),
                    content: "Quel délai ?".into(),
                    attachments: vec![],
                },
            )
            .await
            .unwrap();

        let err = app
            .state
            .bid_service
            .submit_bid(
                &pro,
                &request.id,
                NewBid {
                    origin: BidOrigin::QuestionReply {
                        message_id: question.id.clone(),
                    },
                    ..marseille_bid()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let ok = app
            .state
            .bid_service
            .submit_bid(
                &pro,
                &other.id,
                NewBid {
                    origin: BidOrigin::QuestionReply {
                        message_id: question.id,
                    },
                    ..marseille_bid()
                },
            )
            .await
            .unwrap();
        assert_eq!(ok.bid.request_id, other.id);
    }

    #[tokio::test]
    async fn invalid_lines_are_rejected() {
        let app = test_app();
        let owner = app.individual("owner").await;
        let admin = app.admin("admin").await;
        let pro = app.professional("pro-1").await;
        let request = app.validated_request(&owner, &admin).await;

        let mut bid = marseille_bid();
        bid.lines.labor.quantity = 0.0;
        let err = app
            .state
            .bid_service
            .submit_bid(&pro, &request.id, bid)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn oversized_amounts_are_rejected_without_panicking() {
        let app = test_app();
        let owner = app.individual("owner").await;
        let admin = app.admin("admin").await;
        let pro = app.professional("pro-1").await;
        let request = app.validated_request(&owner, &admin).await;

        let mut bid = marseille_bid();
        bid.lines.labor = line("pose", 1e10, 9_999_999.0);
        let err = app
            .state
            .bid_service
            .submit_bid(&pro, &request.id, bid)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        // Every line within bounds, but the sum no longer fits.
        let mut bid = marseille_bid();
        bid.lines.labor = line("pose", 1_000_000.0, 10_000_000.0);
        bid.lines.consumables = vec![line("membrane", 1_000_000.0, 10_000_000.0); 1000];
        let err = app
            .state
            .bid_service
            .submit_bid(&pro, &request.id, bid)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let bids = app
            .state
            .bid_service
            .list_for_request(&admin, &request.id)
            .await
            .unwrap();
        assert!(bids.is_empty());
    }

    #[tokio::test]
    async fn claimed_bid_survives_its_professional_leaving_mid_accept() {
        let app = test_app();
        let owner = app.individual("owner").await;
        let admin = app.admin("admin").await;
        let pro_1 = app.professional("pro-1").await;
        let pro_2 = app.professional("pro-2").await;
        let request = app.validated_request(&owner, &admin).await;
        let bids = &app.state.bid_service;
        let b1 = bids.submit_bid(&pro_1, &request.id, marseille_bid()).await.unwrap().bid;
        let b2 = bids.submit_bid(&pro_2, &request.id, marseille_bid()).await.unwrap().bid;

        // The request is claimed for b1, then pro-1's account goes away
        // before b1 itself is written.
        app.state
            .quote_service
            .sign_for_bid(&request.id, &b1.id, "owner")
            .await
            .unwrap();
        let report = app.state.account_service.delete_account(&admin, "pro-1").await.unwrap();
        assert!(report.refused_bids.is_empty());

        let accepted = bids.accept_bid(&owner, &b1.id).await.unwrap();
        assert_eq!(accepted.status, BidStatus::Accepted);
        let loser = app.state.db_client.get_bid(&b2.id).await.unwrap().unwrap();
        assert_eq!(loser.status, BidStatus::Refused);
        assert_eq!(loser.refusal_reason.as_deref(), Some(REASON_OTHER_BID_ACCEPTED));
        assert_eq!(request_status(&app, &request.id).await, QuoteRequestStatus::Signed);
    }

    #[tokio::test]
    async fn claimed_bid_cannot_be_refused() {
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

        app.state
            .quote_service
            .sign_for_bid(&request.id, &bid.id, "owner")
            .await
            .unwrap();
        let err = app
            .state
            .bid_service
            .refuse_bid(&owner, &bid.id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition { .. }));

        let accepted = app.state.bid_service.accept_bid(&owner, &bid.id).await.unwrap();
        assert_eq!(accepted.status, BidStatus::Accepted);
    }

    #[tokio::test]
    async fn refusal_that_wins_the_race_releases_the_request() {
        let app = test_app();
        let owner = app.individual("owner").await;
        let admin = app.admin("admin").await;
        let pro_1 = app.professional("pro-1").await;
        let pro_2 = app.professional("pro-2").await;
        let request = app.validated_request(&owner, &admin).await;
        let bids = &app.state.bid_service;
        let b1 = bids.submit_bid(&pro_1, &request.id, marseille_bid()).await.unwrap().bid;
        let b2 = bids.submit_bid(&pro_2, &request.id, marseille_bid()).await.unwrap().bid;

        // A refusal that read the request before the claim lands after it.
        app.state
            .quote_service
            .sign_for_bid(&request.id, &b1.id, "owner")
            .await
            .unwrap();
        lifecycle::transition::<ProfessionalBid, _, _>(
            &app.state.db_client,
            &b1.id,
            BidStatus::Refused,
            |_| Ok(()),
            |_| {},
        )
        .await
        .unwrap();

        let err = bids.accept_bid(&owner, &b1.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition { .. }));

        let released = app.state.db_client.get_quote_request(&request.id).await.unwrap().unwrap();
        assert_eq!(released.status, QuoteRequestStatus::InDiscussion);
        assert_eq!(released.accepted_bid_id, None);
        let untouched = app.state.db_client.get_bid(&b2.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, BidStatus::AwaitingValidation);

        // The owner can still pick the other bid.
        let accepted = bids.accept_bid(&owner, &b2.id).await.unwrap();
        assert_eq!(accepted.status, BidStatus::Accepted);
        assert_eq!(request_status(&app, &request.id).await, QuoteRequestStatus::Signed);
    }
}
