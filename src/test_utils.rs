// test_utils.rs
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::BoxStream;
use serde_json::Value;

use crate::{
    config::Config,
    db::{
        accountdb::AccountExt,
        memory::MemoryStore,
        notificationdb::NotificationExt,
        store::{Collection, Document, DocumentStore, Filter, OrderBy, StoreError, StoreResult},
    },
    models::{
        accountmodel::{Account, ApprovalStatus, BankingDetails, ProfessionalDocuments, ProfessionalProfile, Role},
        bidmodel::{BidOrigin, LineItem, ProfessionalBid},
        notificationmodel::{Notification, NotificationType},
        quotemodel::{Address, QuoteRequest},
    },
    service::{
        bid_service::{BidLines, NewBid},
        blob_store::LocalBlobStore,
        error::CollaboratorError,
        identity_service::Identity,
        push_transport::{PushMessage, PushTransport},
        quote_service::NewQuoteRequest,
        signature_provider::{AutoSignatureProvider, SignatureOutcome, SignatureProvider},
    },
    utils::{pricing::Money, token},
    AppState, Collaborators,
};

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const WEBHOOK_SECRET: &str = "test-webhook-secret";

#[derive(Debug, Default)]
pub struct RecordingPush {
    pub sent: Mutex<Vec<(String, PushMessage)>>,
}

#[async_trait]
impl PushTransport for RecordingPush {
    async fn send(&self, account_id: &str, message: &PushMessage) -> Result<(), CollaboratorError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((account_id.to_string(), message.clone()));
        }
        Ok(())
    }
}

/// Declines the first `declines` calls, then signs.
#[derive(Debug)]
pub struct FlakySignatureProvider {
    declines: AtomicUsize,
}

impl FlakySignatureProvider {
    pub fn new(declines: usize) -> Self {
        Self {
            declines: AtomicUsize::new(declines),
        }
    }
}

#[async_trait]
impl SignatureProvider for FlakySignatureProvider {
    async fn request_signature(
        &self,
        bid: &ProfessionalBid,
        _signer: &Account,
    ) -> Result<SignatureOutcome, CollaboratorError> {
        let left = self.declines.load(Ordering::SeqCst);
        if left > 0 {
            self.declines.store(left - 1, Ordering::SeqCst);
            return Ok(SignatureOutcome::Declined {
                reason: "signer unavailable".into(),
            });
        }
        Ok(SignatureOutcome::Signed {
            reference: format!("sig-{}", bid.id),
        })
    }
}

/// Commits the next update to a chosen collection, then reports a timeout as
/// if the reply had been lost on the way back.
pub struct LostAckStore {
    inner: Arc<MemoryStore>,
    lose_next: Mutex<Option<Collection>>,
}

impl LostAckStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            lose_next: Mutex::new(None),
        }
    }

    pub fn lose_next_update(&self, collection: Collection) {
        if let Ok(mut next) = self.lose_next.lock() {
            *next = Some(collection);
        }
    }

    fn take_armed(&self, collection: Collection) -> bool {
        match self.lose_next.lock() {
            Ok(mut next) if *next == Some(collection) => {
                *next = None;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl DocumentStore for LostAckStore {
    async fn create(&self, collection: Collection, id: &str, body: Value) -> StoreResult<Document> {
        self.inner.create(collection, id, body).await
    }

    async fn get(&self, collection: Collection, id: &str) -> StoreResult<Option<Document>> {
        self.inner.get(collection, id).await
    }

    async fn query(
        &self,
        collection: Collection,
        filter: &Filter,
        order: Option<&OrderBy>,
    ) -> StoreResult<Vec<Document>> {
        self.inner.query(collection, filter, order).await
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: Value,
        expected_version: Option<i64>,
    ) -> StoreResult<Document> {
        let document = self.inner.update(collection, id, patch, expected_version).await?;
        if self.take_armed(collection) {
            return Err(StoreError::Timeout(Duration::from_millis(5)));
        }
        Ok(document)
    }

    async fn delete(&self, collection: Collection, id: &str) -> StoreResult<()> {
        self.inner.delete(collection, id).await
    }

    async fn watch(&self, collection: Collection) -> StoreResult<BoxStream<'static, ()>> {
        self.inner.watch(collection).await
    }
}

pub fn test_config() -> Config {
    let blob_dir = std::env::temp_dir()
        .join(format!("etancheconnect-test-{}", uuid::Uuid::new_v4()))
        .to_string_lossy()
        .into_owned();
    Config::from_lookup(|name| match name {
        "JWT_SECRET_KEY" => Some(JWT_SECRET.to_string()),
        "PAYMENT_WEBHOOK_SECRET" => Some(WEBHOOK_SECRET.to_string()),
        "STORE_BACKOFF_MS" => Some("1".to_string()),
        "BLOB_DIR" => Some(blob_dir.clone()),
        _ => None,
    })
    .unwrap()
}

pub struct TestApp {
    pub state: Arc<AppState>,
    pub store: Arc<MemoryStore>,
    pub push: Arc<RecordingPush>,
    pub lost_acks: Arc<LostAckStore>,
}

pub fn test_app() -> TestApp {
    test_app_with_signature(Arc::new(AutoSignatureProvider))
}

pub fn test_app_with_signature(signature_provider: Arc<dyn SignatureProvider>) -> TestApp {
    let config = test_config();
    let store = Arc::new(MemoryStore::new());
    let lost_acks = Arc::new(LostAckStore::new(store.clone()));
    let push = Arc::new(RecordingPush::default());
    let collaborators = Collaborators {
        push_transport: push.clone(),
        blob_store: Arc::new(LocalBlobStore::new(&config.blob_dir, &config.blob_base_url)),
        signature_provider,
    };
    let state = AppState::new(config, lost_acks.clone(), collaborators).unwrap();
    TestApp {
        state: Arc::new(state),
        store,
        push,
        lost_acks,
    }
}

impl TestApp {
    pub async fn account(&self, id: &str, role: Role, approval: Option<ApprovalStatus>) -> Identity {
        let now = Utc::now();
        let account = Account {
            id: id.to_string(),
            email: format!("{}@example.fr", id),
            role,
            display_name: id.to_string(),
            professional: approval.map(|approval_status| ProfessionalProfile {
                company_name: format!("{} SARL", id),
                siret: "73282932000074".into(),
                banking_details: BankingDetails::default(),
                documents: ProfessionalDocuments::default(),
                approval_status,
            }),
            created_at: now,
            updated_at: now,
            version: 0,
        };
        self.state.db_client.save_account(&account).await.unwrap();
        self.state
            .identity_service
            .resolve(Some(id))
            .await
            .unwrap()
    }

    pub async fn individual(&self, id: &str) -> Identity {
        self.account(id, Role::Individual, None).await
    }

    pub async fn admin(&self, id: &str) -> Identity {
        self.account(id, Role::Admin, None).await
    }

    pub async fn professional(&self, id: &str) -> Identity {
        self.account(id, Role::Professional, Some(ApprovalStatus::Approved))
            .await
    }

    /// Submitted by `owner` and validated by `admin`.
    pub async fn validated_request(&self, owner: &Identity, admin: &Identity) -> QuoteRequest {
        let request = self
            .state
            .quote_service
            .submit(owner, new_request())
            .await
            .unwrap();
        self.state
            .quote_service
            .validate(admin, &request.id)
            .await
            .unwrap()
    }

    pub async fn notifications(&self, account_id: &str) -> Vec<Notification> {
        self.state
            .db_client
            .get_notifications(account_id, false)
            .await
            .unwrap()
    }

    pub async fn count_notifications(&self, account_id: &str, kind: NotificationType) -> usize {
        self.notifications(account_id)
            .await
            .iter()
            .filter(|n| n.notification_type == kind)
            .count()
    }
}

pub fn bearer(account_id: &str) -> String {
    format!(
        "Bearer {}",
        token::create_token(account_id, JWT_SECRET.as_bytes(), 60).unwrap()
    )
}

pub fn new_request() -> NewQuoteRequest {
    NewQuoteRequest {
        project_type: "etancheite_terrasse".into(),
        surface_area: 40.0,
        description: "Terrasse de 40 m² avec infiltrations".into(),
        address: Address {
            street: "12 rue Paradis".into(),
            city: "Marseille".into(),
            postal_code: "13001".into(),
        },
        photos: vec![],
    }
}

pub fn line(description: &str, quantity: f64, unit_euros: f64) -> LineItem {
    LineItem {
        description: description.into(),
        quantity,
        unit_price: Money::from_euros(unit_euros),
    }
}

/// Labor 40 m² × 15 € = 600 € HT.
pub fn marseille_lines() -> BidLines {
    BidLines {
        labor: line("Pose membrane EPDM", 40.0, 15.0),
        consumables: vec![],
        non_consumables: vec![],
    }
}

pub fn marseille_bid() -> NewBid {
    NewBid {
        lines: marseille_lines(),
        client_totals: None,
        origin: BidOrigin::Marketplace,
    }
}
