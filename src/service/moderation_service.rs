// service/moderation_service.rs
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    db::{accountdb::AccountExt, biddb::BidExt, db::DBClient, messagedb::MessageExt},
    models::{
        bidmodel::BidStatus,
        messagemodel::{Message, MessageKind, ModerationStatus},
        quotemodel::{QuoteRequest, QuoteRequestStatus},
        EntityType,
    },
    service::{
        audit_service::AuditService,
        error::ServiceError,
        identity_service::Identity,
        lifecycle::{self, load, Modified},
        notification_service::{FanoutSubject, NotificationService, TransitionEvent},
        quote_service::QuoteService,
    },
    utils::content_filter::{ContentScanner, SensitiveCategory},
};

pub const MAX_MESSAGE_CHARS: usize = 5000;

#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub recipient_id: String,
    pub request_id: Option<String>,
    pub content: String,
    pub attachments: Vec<String>,
}

/// Content policy applied before anything is stored. Questions carrying
/// contact details are refused outright; replies are masked.
pub fn screen(
    scanner: &ContentScanner,
    kind: MessageKind,
    content: &str,
) -> Result<(String, Vec<SensitiveCategory>), ServiceError> {
    match kind {
        MessageKind::Question => {
            let categories = scanner.scan(content);
            if categories.is_empty() {
                Ok((content.to_string(), Vec::new()))
            } else {
                Err(ServiceError::SensitiveContent { categories })
            }
        }
        MessageKind::Reply => Ok(scanner.redact(content)),
    }
}

#[derive(Debug, Clone)]
pub struct ModerationService {
    db_client: Arc<DBClient>,
    quote_service: Arc<QuoteService>,
    notification_service: Arc<NotificationService>,
    audit_service: Arc<AuditService>,
    scanner: ContentScanner,
}

impl ModerationService {
    pub fn new(
        db_client: Arc<DBClient>,
        quote_service: Arc<QuoteService>,
        notification_service: Arc<NotificationService>,
        audit_service: Arc<AuditService>,
        scanner: ContentScanner,
    ) -> Self {
        Self {
            db_client,
            quote_service,
            notification_service,
            audit_service,
            scanner,
        }
    }

    pub async fn send_message(
        &self,
        identity: &Identity,
        new_message: NewMessage,
    ) -> Result<Message, ServiceError> {
        if identity.is(&new_message.recipient_id) {
            return Err(ServiceError::Validation(
                "cannot send a message to yourself".to_string(),
            ));
        }
        let content = new_message.content.trim();
        if content.is_empty() || content.chars().count() > MAX_MESSAGE_CHARS {
            return Err(ServiceError::Validation(format!(
                "content must be between 1 and {} characters",
                MAX_MESSAGE_CHARS
            )));
        }

        if self
            .db_client
            .get_account(&new_message.recipient_id)
            .await?
            .is_none()
        {
            return Err(ServiceError::not_found(
                EntityType::Account,
                &new_message.recipient_id,
            ));
        }

        let request = match &new_message.request_id {
            Some(request_id) => {
                let request: QuoteRequest = load(&self.db_client, request_id).await?;
                if !identity.is(&request.owner_account_id)
                    && request.owner_account_id != new_message.recipient_id
                {
                    return Err(ServiceError::Validation(format!(
                        "quote request {} is not shared by sender and recipient",
                        request_id
                    )));
                }
                Some(request)
            }
            None => None,
        };

        let kind = self
            .classify(identity, &new_message.recipient_id, request.as_ref())
            .await?;
        let (content, redactions) = match screen(&self.scanner, kind, content) {
            Ok(screened) => screened,
            Err(e) => {
                tracing::warn!(
                    "🚫 {} from {} rejected: {}",
                    kind.to_str(),
                    identity.account_id,
                    e
                );
                return Err(e);
            }
        };
        if !redactions.is_empty() {
            tracing::info!(
                "🙈 Masked {:?} in reply from {}",
                redactions,
                identity.account_id
            );
        }

        let message = Message {
            id: Uuid::new_v4().to_string(),
            sender_id: identity.account_id.clone(),
            recipient_id: new_message.recipient_id,
            request_id: new_message.request_id,
            kind,
            content,
            attachments: new_message.attachments,
            moderation_status: ModerationStatus::Pending,
            redactions,
            moderated_by: None,
            moderated_at: None,
            read_at: None,
            created_at: Utc::now(),
            version: 0,
        };
        let message = self.db_client.save_message(&message).await?;
        tracing::info!(
            "✉️ {} {} from {} queued for moderation",
            message.kind.to_str(),
            message.id,
            message.sender_id
        );

        let event = TransitionEvent::created(&message.id, message.moderation_status, &identity.account_id);
        self.audit_service.record(&event, None).await;
        self.notification_service
            .dispatch(&event, FanoutSubject::Message(&message))
            .await;

        if let Some(request) = request {
            if message.kind == MessageKind::Question && identity.is(&request.owner_account_id) {
                self.quote_service
                    .advance_from(
                        &request.id,
                        &[QuoteRequestStatus::Validated, QuoteRequestStatus::InDiscussion],
                        QuoteRequestStatus::AwaitingResponse,
                        &identity.account_id,
                    )
                    .await?;
            }
        }

        Ok(message)
    }

    pub async fn approve(&self, identity: &Identity, message_id: &str) -> Result<Message, ServiceError> {
        identity.require_admin("approve messages")?;
        let outcome = self
            .moderate(identity, message_id, ModerationStatus::Approved)
            .await?;

        let message = outcome.entity();
        if outcome.is_applied() && message.kind == MessageKind::Reply {
            if let Some(request) = self.request_of(message).await? {
                if message.sender_id != request.owner_account_id {
                    self.resume_discussion(&request, &identity.account_id).await?;
                }
            }
        }
        Ok(outcome.into_entity())
    }

    pub async fn reject(&self, identity: &Identity, message_id: &str) -> Result<Message, ServiceError> {
        identity.require_admin("reject messages")?;
        let outcome = self
            .moderate(identity, message_id, ModerationStatus::Rejected)
            .await?;

        // A rejected owner question never reaches the professional, so the
        // request stops waiting on an answer.
        let message = outcome.entity();
        if outcome.is_applied() && message.kind == MessageKind::Question {
            if let Some(request) = self.request_of(message).await? {
                if message.sender_id == request.owner_account_id {
                    self.resume_discussion(&request, &identity.account_id).await?;
                }
            }
        }
        Ok(outcome.into_entity())
    }

    /// Messages exchanged with `other_id`, oldest first, as the caller may see them.
    pub async fn conversation(
        &self,
        identity: &Identity,
        other_id: &str,
    ) -> Result<Vec<Message>, ServiceError> {
        let messages = self
            .db_client
            .get_messages_between(&identity.account_id, other_id)
            .await?;
        if identity.is_admin() {
            return Ok(messages);
        }
        Ok(messages
            .into_iter()
            .filter(|message| message.visible_to(&identity.account_id))
            .collect())
    }

    pub async fn pending_queue(&self, identity: &Identity) -> Result<Vec<Message>, ServiceError> {
        identity.require_admin("review pending messages")?;
        Ok(self
            .db_client
            .get_messages_by_status(ModerationStatus::Pending)
            .await?)
    }

    pub async fn mark_read(&self, identity: &Identity, message_id: &str) -> Result<Message, ServiceError> {
        let outcome = lifecycle::modify(&self.db_client, message_id, |message: &mut Message| {
            // Unapproved messages do not exist as far as the recipient knows.
            if !identity.is(&message.recipient_id)
                || message.moderation_status != ModerationStatus::Approved
            {
                return Err(ServiceError::not_found(EntityType::Message, message_id));
            }
            if message.read_at.is_some() {
                return Ok(false);
            }
            message.read_at = Some(Utc::now());
            Ok(true)
        })
        .await?;
        Ok(outcome.into_entity())
    }

    async fn moderate(
        &self,
        identity: &Identity,
        message_id: &str,
        to: ModerationStatus,
    ) -> Result<Modified<Message>, ServiceError> {
        let outcome = lifecycle::transition::<Message, _, _>(
            &self.db_client,
            message_id,
            to,
            |_| Ok(()),
            |message| message.moderated_by = Some(identity.account_id.clone()),
        )
        .await?;

        if let Some(event) = TransitionEvent::from_modified(&outcome, &identity.account_id) {
            self.audit_service.record(&event, None).await;
            self.notification_service
                .dispatch(&event, FanoutSubject::Message(outcome.entity()))
                .await;
        }
        Ok(outcome)
    }

    /// An owner writing about their own request is always asking. Anyone
    /// else is replying only when the recipient has an approved message on
    /// the same thread waiting for them; a first contact is a question.
    async fn classify(
        &self,
        identity: &Identity,
        recipient_id: &str,
        request: Option<&QuoteRequest>,
    ) -> Result<MessageKind, ServiceError> {
        if request.is_some_and(|request| identity.is(&request.owner_account_id)) {
            return Ok(MessageKind::Question);
        }
        let request_id = request.map(|request| request.id.as_str());
        let answers = self
            .db_client
            .get_messages_between(&identity.account_id, recipient_id)
            .await?
            .iter()
            .any(|message| {
                message.sender_id == recipient_id
                    && message.moderation_status == ModerationStatus::Approved
                    && message.request_id.as_deref() == request_id
            });
        Ok(if answers {
            MessageKind::Reply
        } else {
            MessageKind::Question
        })
    }

    async fn request_of(&self, message: &Message) -> Result<Option<QuoteRequest>, ServiceError> {
        let Some(request_id) = &message.request_id else {
            return Ok(None);
        };
        match load(&self.db_client, request_id).await {
            Ok(request) => Ok(Some(request)),
            Err(ServiceError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Leave `attente_reponse`: back to discussion while submitted bids are
    /// waiting, otherwise back to plain `valide`.
    async fn resume_discussion(&self, request: &QuoteRequest, actor_id: &str) -> Result<(), ServiceError> {
        let bids = self.db_client.get_bids_for_request(&request.id).await?;
        let to = if bids
            .iter()
            .any(|bid| bid.status == BidStatus::AwaitingValidation)
        {
            QuoteRequestStatus::InDiscussion
        } else {
            QuoteRequestStatus::Validated
        };
        self.quote_service
            .advance_from(&request.id, &[QuoteRequestStatus::AwaitingResponse], to, actor_id)
            .await?;
        Ok(())
    }
}
