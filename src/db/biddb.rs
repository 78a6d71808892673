// db/biddb.rs
use async_trait::async_trait;

use super::db::DBClient;
use super::store::{Collection, Filter, OrderBy, StoreResult};
use crate::models::bidmodel::*;

#[async_trait]
pub trait BidExt {
    async fn get_bid(&self, bid_id: &str) -> StoreResult<Option<ProfessionalBid>>;

    async fn save_bid(&self, bid: &ProfessionalBid) -> StoreResult<ProfessionalBid>;

    async fn update_bid(&self, bid: &ProfessionalBid) -> StoreResult<ProfessionalBid>;

    async fn get_bids_for_request(&self, request_id: &str) -> StoreResult<Vec<ProfessionalBid>>;

    async fn get_bids_by_professional(
        &self,
        professional_id: &str,
    ) -> StoreResult<Vec<ProfessionalBid>>;
}

#[async_trait]
impl BidExt for DBClient {
    async fn get_bid(&self, bid_id: &str) -> StoreResult<Option<ProfessionalBid>> {
        self.fetch(Collection::ProfessionalBids, bid_id).await
    }

    async fn save_bid(&self, bid: &ProfessionalBid) -> StoreResult<ProfessionalBid> {
        self.insert(Collection::ProfessionalBids, bid).await
    }

    async fn update_bid(&self, bid: &ProfessionalBid) -> StoreResult<ProfessionalBid> {
        self.replace(Collection::ProfessionalBids, bid).await
    }

    async fn get_bids_for_request(&self, request_id: &str) -> StoreResult<Vec<ProfessionalBid>> {
        self.find(
            Collection::ProfessionalBids,
            &Filter::all().eq("requestId", request_id),
            Some(&OrderBy::asc("createdAt")),
        )
        .await
    }

    async fn get_bids_by_professional(
        &self,
        professional_id: &str,
    ) -> StoreResult<Vec<ProfessionalBid>> {
        self.find(
            Collection::ProfessionalBids,
            &Filter::all().eq("professionalAccountId", professional_id),
            Some(&OrderBy::desc("createdAt")),
        )
        .await
    }
}
