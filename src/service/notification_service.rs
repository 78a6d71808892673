// service/notification_service.rs
use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    db::{
        accountdb::AccountExt,
        db::{DBClient, Subscription},
        notificationdb::NotificationExt,
        store::StoreError,
    },
    models::{
        accountmodel::{ApprovalStatus, Role},
        bidmodel::ProfessionalBid,
        messagemodel::Message,
        notificationmodel::*,
        quotemodel::QuoteRequest,
        EntityType, LifecycleStatus,
    },
    service::{
        error::ServiceError,
        identity_service::Identity,
        lifecycle::{Lifecycle, Modified},
        push_transport::{PushMessage, PushTransport},
    },
};

const MESSAGE_PREVIEW_CHARS: usize = 80;

/// A status change that already happened and was persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionEvent {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub from_state: Option<String>,
    pub to_state: String,
    pub actor_id: String,
}

impl TransitionEvent {
    /// Entity created directly in `to`.
    pub fn created<S: LifecycleStatus>(entity_id: &str, to: S, actor_id: &str) -> Self {
        Self {
            entity_type: S::ENTITY,
            entity_id: entity_id.to_string(),
            from_state: None,
            to_state: to.to_str().to_string(),
            actor_id: actor_id.to_string(),
        }
    }

    pub fn changed<S: LifecycleStatus>(entity_id: &str, from: S, to: S, actor_id: &str) -> Self {
        Self {
            from_state: Some(from.to_str().to_string()),
            ..Self::created(entity_id, to, actor_id)
        }
    }

    /// `None` when nothing was written.
    pub fn from_modified<T: Lifecycle>(outcome: &Modified<T>, actor_id: &str) -> Option<Self> {
        match outcome {
            Modified::Applied { before, after } => Some(Self::changed(
                after.id(),
                before.status(),
                after.status(),
                actor_id,
            )),
            Modified::Unchanged(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Audience {
    Admins,
    ApprovedProfessionals,
    RequestOwner,
    Bidder,
    MessageRecipient,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FanoutRule {
    pub entity: EntityType,
    /// `None` matches any previous state.
    pub from_state: Option<&'static str>,
    pub to_state: &'static str,
    pub audience: Audience,
    pub notification_type: NotificationType,
}

const fn rule(
    entity: EntityType,
    from_state: Option<&'static str>,
    to_state: &'static str,
    audience: Audience,
    notification_type: NotificationType,
) -> FanoutRule {
    FanoutRule {
        entity,
        from_state,
        to_state,
        audience,
        notification_type,
    }
}

/// Who hears about which transition. The only place recipients are decided.
pub const FANOUT_TABLE: &[FanoutRule] = &[
    rule(
        EntityType::QuoteRequest,
        None,
        "en_attente",
        Audience::Admins,
        NotificationType::QuoteRequestValidation,
    ),
    rule(
        EntityType::QuoteRequest,
        Some("en_attente"),
        "valide",
        Audience::ApprovedProfessionals,
        NotificationType::NewQuoteRequest,
    ),
    rule(
        EntityType::QuoteRequest,
        Some("en_attente"),
        "valide",
        Audience::RequestOwner,
        NotificationType::QuoteRequestValidated,
    ),
    rule(
        EntityType::ProfessionalBid,
        None,
        "en_attente_validation",
        Audience::RequestOwner,
        NotificationType::QuoteValidation,
    ),
    rule(
        EntityType::ProfessionalBid,
        None,
        "accepte",
        Audience::Bidder,
        NotificationType::QuoteValidation,
    ),
    rule(
        EntityType::ProfessionalBid,
        None,
        "refuse",
        Audience::Bidder,
        NotificationType::QuoteValidation,
    ),
    rule(
        EntityType::ProfessionalBid,
        None,
        "paye",
        Audience::RequestOwner,
        NotificationType::PaymentCompleted,
    ),
    rule(
        EntityType::ProfessionalBid,
        None,
        "paye",
        Audience::Bidder,
        NotificationType::PaymentCompleted,
    ),
    rule(
        EntityType::Message,
        None,
        "pending",
        Audience::Admins,
        NotificationType::PendingMessage,
    ),
    rule(
        EntityType::Message,
        None,
        "approved",
        Audience::MessageRecipient,
        NotificationType::NewMessage,
    ),
];

pub fn plan(event: &TransitionEvent) -> Vec<&'static FanoutRule> {
    FANOUT_TABLE
        .iter()
        .filter(|rule| {
            rule.entity == event.entity_type
                && rule.to_state == event.to_state
                && match rule.from_state {
                    Some(from) => event.from_state.as_deref() == Some(from),
                    None => true,
                }
        })
        .collect()
}

/// The entity an event is about, with whatever context the payloads need.
#[derive(Debug, Clone, Copy)]
pub enum FanoutSubject<'a> {
    QuoteRequest(&'a QuoteRequest),
    Bid {
        bid: &'a ProfessionalBid,
        request: &'a QuoteRequest,
    },
    Message(&'a Message),
}

/// Role-based recipient lists, looked up once per dispatch.
#[derive(Debug, Clone, Default)]
pub struct RecipientDirectory {
    pub admins: Vec<String>,
    pub approved_professionals: Vec<String>,
}

fn resolve(audience: Audience, subject: FanoutSubject<'_>, directory: &RecipientDirectory) -> Vec<String> {
    match (audience, subject) {
        (Audience::Admins, _) => directory.admins.clone(),
        (Audience::ApprovedProfessionals, _) => directory.approved_professionals.clone(),
        (Audience::RequestOwner, FanoutSubject::QuoteRequest(request))
        | (Audience::RequestOwner, FanoutSubject::Bid { request, .. }) => {
            vec![request.owner_account_id.clone()]
        }
        (Audience::Bidder, FanoutSubject::Bid { bid, .. }) => {
            vec![bid.professional_account_id.clone()]
        }
        (Audience::MessageRecipient, FanoutSubject::Message(message)) => {
            vec![message.recipient_id.clone()]
        }
        _ => Vec::new(),
    }
}

fn payload_for(
    kind: NotificationType,
    subject: FanoutSubject<'_>,
    event: &TransitionEvent,
) -> Option<NotificationPayload> {
    let payload = match (kind, subject) {
        (
            NotificationType::NewQuoteRequest
            | NotificationType::QuoteRequestValidated
            | NotificationType::QuoteRequestValidation,
            FanoutSubject::QuoteRequest(request),
        ) => NotificationPayload::Request(RequestSummary {
            request_id: request.id.clone(),
            project_type: request.project_type.clone(),
            city: request.address.city.clone(),
            status: event.to_state.clone(),
        }),
        (NotificationType::QuoteValidation, FanoutSubject::Bid { bid, .. }) => {
            NotificationPayload::Bid(BidSummary {
                bid_id: bid.id.clone(),
                request_id: bid.request_id.clone(),
                professional_account_id: bid.professional_account_id.clone(),
                status: event.to_state.clone(),
                total_ttc: bid.totals.total_ttc,
                refusal_reason: bid.refusal_reason.clone(),
            })
        }
        (NotificationType::PaymentCompleted, FanoutSubject::Bid { bid, .. }) => {
            NotificationPayload::Payment(PaymentSummary {
                bid_id: bid.id.clone(),
                request_id: bid.request_id.clone(),
                amount: bid.totals.total_ttc,
                payment_reference: bid.payment_reference.clone(),
            })
        }
        (
            NotificationType::NewMessage | NotificationType::PendingMessage,
            FanoutSubject::Message(message),
        ) => NotificationPayload::Message(MessageSummary {
            message_id: message.id.clone(),
            sender_id: message.sender_id.clone(),
            request_id: message.request_id.clone(),
            kind: message.kind.to_str().to_string(),
            preview: message.content.chars().take(MESSAGE_PREVIEW_CHARS).collect(),
        }),
        _ => return None,
    };
    debug_assert!(payload.fits(kind));
    Some(payload)
}

/// Same event, type and recipient always give the same id.
pub fn notification_id(event: &TransitionEvent, kind: NotificationType, recipient_id: &str) -> String {
    let name = format!(
        "{}:{}:{}:{}:{}",
        event.entity_type, event.entity_id, event.to_state, kind, recipient_id
    );
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}

/// Pure fanout: the notifications an event produces. The actor is never a
/// recipient and each recipient gets a given type at most once.
pub fn derive(
    event: &TransitionEvent,
    subject: FanoutSubject<'_>,
    directory: &RecipientDirectory,
    now: DateTime<Utc>,
) -> Vec<Notification> {
    let mut seen = HashSet::new();
    let mut notifications = Vec::new();

    for rule in plan(event) {
        let Some(payload) = payload_for(rule.notification_type, subject, event) else {
            tracing::warn!(
                "⚠️ No payload for {} on {} {}",
                rule.notification_type,
                event.entity_type,
                event.entity_id
            );
            continue;
        };
        let Ok(payload_value) = payload.to_value() else {
            continue;
        };

        for recipient in resolve(rule.audience, subject, directory) {
            if recipient == event.actor_id
                || !seen.insert((rule.notification_type, recipient.clone()))
            {
                continue;
            }
            notifications.push(Notification {
                id: notification_id(event, rule.notification_type, &recipient),
                recipient_account_id: recipient,
                notification_type: rule.notification_type,
                payload: payload_value.clone(),
                title: rule.notification_type.title().to_string(),
                body: payload.body(),
                read: false,
                created_at: now,
                version: 0,
            });
        }
    }

    notifications
}

#[derive(Debug, Clone)]
pub struct NotificationService {
    db_client: Arc<DBClient>,
    push_transport: Arc<dyn PushTransport>,
}

impl NotificationService {
    pub fn new(db_client: Arc<DBClient>, push_transport: Arc<dyn PushTransport>) -> Self {
        Self {
            db_client,
            push_transport,
        }
    }

    async fn directory_for(&self, rules: &[&'static FanoutRule]) -> RecipientDirectory {
        let mut directory = RecipientDirectory::default();

        if rules.iter().any(|rule| rule.audience == Audience::Admins) {
            match self.db_client.get_accounts_by_role(Role::Admin).await {
                Ok(admins) => directory.admins = admins.into_iter().map(|a| a.id).collect(),
                Err(e) => tracing::warn!("⚠️ Could not look up admins for fanout: {}", e),
            }
        }

        if rules.iter().any(|rule| rule.audience == Audience::ApprovedProfessionals) {
            match self
                .db_client
                .get_professionals(Some(ApprovalStatus::Approved))
                .await
            {
                Ok(pros) => {
                    directory.approved_professionals = pros.into_iter().map(|a| a.id).collect()
                }
                Err(e) => tracing::warn!("⚠️ Could not look up professionals for fanout: {}", e),
            }
        }

        directory
    }

    /// Persist the notifications for `event` and push them. Never fails: a
    /// lost notification must not undo the transition that caused it.
    pub async fn dispatch(
        &self,
        event: &TransitionEvent,
        subject: FanoutSubject<'_>,
    ) -> Vec<Notification> {
        let rules = plan(event);
        if rules.is_empty() {
            return Vec::new();
        }

        let directory = self.directory_for(&rules).await;
        let mut created = Vec::new();

        for notification in derive(event, subject, &directory, Utc::now()) {
            match self.db_client.save_notification(&notification).await {
                Ok(saved) => {
                    self.push(&saved);
                    created.push(saved);
                }
                Err(StoreError::AlreadyExists { .. }) => {
                    tracing::debug!(
                        id = %notification.id,
                        "notification already delivered, skipping"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        "⚠️ Failed to store {} notification for {}: {}",
                        notification.notification_type,
                        notification.recipient_account_id,
                        e
                    );
                }
            }
        }

        if !created.is_empty() {
            tracing::info!(
                "📣 {} notification(s) for {} {} -> {}",
                created.len(),
                event.entity_type,
                event.entity_id,
                event.to_state
            );
        }
        created
    }

    fn push(&self, notification: &Notification) {
        let transport = self.push_transport.clone();
        let recipient = notification.recipient_account_id.clone();
        let message = PushMessage {
            title: notification.title.clone(),
            body: notification.body.clone(),
            data: serde_json::json!({
                "notificationId": notification.id,
                "type": notification.notification_type,
                "payload": notification.payload,
            }),
        };

        tokio::spawn(async move {
            if let Err(e) = transport.send(&recipient, &message).await {
                tracing::warn!("⚠️ Push delivery to {} failed: {}", recipient, e);
            }
        });
    }

    pub async fn list(
        &self,
        identity: &Identity,
        unread_only: bool,
    ) -> Result<Vec<Notification>, ServiceError> {
        Ok(self
            .db_client
            .get_notifications(&identity.account_id, unread_only)
            .await?)
    }

    pub async fn mark_read(&self, identity: &Identity, notification_id: &str) -> Result<(), ServiceError> {
        let notification = self
            .db_client
            .get_notification(notification_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(EntityType::Notification, notification_id))?;

        if !identity.is(&notification.recipient_account_id) {
            return Err(ServiceError::not_owner(
                EntityType::Notification,
                notification_id,
                &identity.account_id,
            ));
        }
        if notification.read {
            return Ok(());
        }
        Ok(self.db_client.mark_notification_read(notification_id).await?)
    }

    pub async fn mark_all_read(&self, identity: &Identity) -> Result<usize, ServiceError> {
        Ok(self
            .db_client
            .mark_all_notifications_read(&identity.account_id)
            .await?)
    }

    /// Live view of the caller's notifications, newest first.
    pub async fn subscribe(&self, identity: &Identity) -> Result<Subscription<Notification>, ServiceError> {
        Ok(self
            .db_client
            .subscribe_notifications(&identity.account_id)
            .await?)
    }
}
