pub mod config;
pub mod db;
pub mod dtos;
pub mod error;
pub mod handler;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod service;
pub mod utils;

#[cfg(test)]
mod test_utils;

use std::sync::Arc;

use config::Config;
use db::{db::DBClient, store::DocumentStore};
use service::{
    account_service::AccountService,
    audit_service::AuditService,
    bid_service::BidService,
    blob_store::{BlobStore, LocalBlobStore},
    identity_service::IdentityService,
    moderation_service::ModerationService,
    notification_service::NotificationService,
    push_transport::{LogPushTransport, PushTransport, WebhookPushTransport},
    quote_service::QuoteService,
    signature_provider::{AutoSignatureProvider, SignatureProvider},
};
use utils::content_filter::ContentScanner;

/// External systems the services talk to.
#[derive(Debug, Clone)]
pub struct Collaborators {
    pub push_transport: Arc<dyn PushTransport>,
    pub blob_store: Arc<dyn BlobStore>,
    pub signature_provider: Arc<dyn SignatureProvider>,
}

impl Collaborators {
    pub fn from_config(config: &Config) -> Self {
        let push_transport: Arc<dyn PushTransport> = match &config.push_webhook_url {
            Some(url) => Arc::new(WebhookPushTransport::new(url.clone())),
            None => Arc::new(LogPushTransport),
        };

        Collaborators {
            push_transport,
            blob_store: Arc::new(LocalBlobStore::new(&config.blob_dir, &config.blob_base_url)),
            signature_provider: Arc::new(AutoSignatureProvider),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub env: Config,
    pub db_client: Arc<DBClient>,
    pub identity_service: Arc<IdentityService>,
    pub account_service: Arc<AccountService>,
    pub quote_service: Arc<QuoteService>,
    pub bid_service: Arc<BidService>,
    pub moderation_service: Arc<ModerationService>,
    pub notification_service: Arc<NotificationService>,
    pub audit_service: Arc<AuditService>,
}

impl AppState {
    pub fn new(
        env: Config,
        store: Arc<dyn DocumentStore>,
        collaborators: Collaborators,
    ) -> Result<Self, regex::Error> {
        let db_client = Arc::new(DBClient::new(store, env.query_timeout()));

        let audit_service = Arc::new(AuditService::new(db_client.clone()));
        let notification_service = Arc::new(NotificationService::new(
            db_client.clone(),
            collaborators.push_transport,
        ));
        let quote_service = Arc::new(QuoteService::new(
            db_client.clone(),
            notification_service.clone(),
            audit_service.clone(),
            collaborators.blob_store,
        ));
        let bid_service = Arc::new(BidService::new(
            db_client.clone(),
            quote_service.clone(),
            notification_service.clone(),
            audit_service.clone(),
            collaborators.signature_provider,
        ));
        let moderation_service = Arc::new(ModerationService::new(
            db_client.clone(),
            quote_service.clone(),
            notification_service.clone(),
            audit_service.clone(),
            ContentScanner::new()?,
        ));
        let account_service = Arc::new(AccountService::new(
            db_client.clone(),
            quote_service.clone(),
            bid_service.clone(),
            audit_service.clone(),
        ));

        Ok(AppState {
            env,
            identity_service: Arc::new(IdentityService::new(db_client.clone())),
            db_client,
            account_service,
            quote_service,
            bid_service,
            moderation_service,
            notification_service,
            audit_service,
        })
    }
}
