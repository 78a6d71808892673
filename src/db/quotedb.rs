// db/quotedb.rs
use async_trait::async_trait;

use super::db::DBClient;
use super::store::{Collection, Filter, OrderBy, StoreResult};
use crate::models::{quotemodel::*, LifecycleStatus};

#[async_trait]
pub trait QuoteRequestExt {
    async fn get_quote_request(&self, request_id: &str) -> StoreResult<Option<QuoteRequest>>;

    async fn save_quote_request(&self, request: &QuoteRequest) -> StoreResult<QuoteRequest>;

    async fn update_quote_request(&self, request: &QuoteRequest) -> StoreResult<QuoteRequest>;

    async fn get_quote_requests_by_owner(&self, owner_id: &str) -> StoreResult<Vec<QuoteRequest>>;

    async fn get_quote_requests_by_status(
        &self,
        statuses: &[QuoteRequestStatus],
    ) -> StoreResult<Vec<QuoteRequest>>;
}

#[async_trait]
impl QuoteRequestExt for DBClient {
    async fn get_quote_request(&self, request_id: &str) -> StoreResult<Option<QuoteRequest>> {
        self.fetch(Collection::QuoteRequests, request_id).await
    }

    async fn save_quote_request(&self, request: &QuoteRequest) -> StoreResult<QuoteRequest> {
        self.insert(Collection::QuoteRequests, request).await
    }

    async fn update_quote_request(&self, request: &QuoteRequest) -> StoreResult<QuoteRequest> {
        self.replace(Collection::QuoteRequests, request).await
    }

    async fn get_quote_requests_by_owner(&self, owner_id: &str) -> StoreResult<Vec<QuoteRequest>> {
        self.find(
            Collection::QuoteRequests,
            &Filter::all().eq("ownerAccountId", owner_id),
            Some(&OrderBy::desc("createdAt")),
        )
        .await
    }

    async fn get_quote_requests_by_status(
        &self,
        statuses: &[QuoteRequestStatus],
    ) -> StoreResult<Vec<QuoteRequest>> {
        self.find(
            Collection::QuoteRequests,
            &Filter::all().any_of("status", statuses.iter().map(|s| s.to_str())),
            Some(&OrderBy::desc("createdAt")),
        )
        .await
    }
}
