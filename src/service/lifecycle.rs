// service/lifecycle.rs
//! Compare-and-swap writes and status transitions shared by every entity
//! manager.
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{
    db::{
        db::{DBClient, Versioned},
        store::{Collection, StoreError},
    },
    models::{
        accountmodel::Account,
        bidmodel::{BidStatus, ProfessionalBid},
        messagemodel::{Message, ModerationStatus},
        quotemodel::{QuoteRequest, QuoteRequestStatus},
        EntityType, LifecycleStatus,
    },
    service::error::ServiceError,
};

/// Attempts before a contended write gives up with the last conflict.
pub const MAX_CAS_ATTEMPTS: u32 = 5;

pub trait Stored: Serialize + DeserializeOwned + Versioned + Clone + Send + Sync {
    const COLLECTION: Collection;
    const ENTITY: EntityType;
}

pub trait Lifecycle: Stored {
    type Status: LifecycleStatus + Send + Sync;

    fn status(&self) -> Self::Status;

    fn set_status(&mut self, to: Self::Status, at: DateTime<Utc>);
}

#[derive(Debug, Clone)]
pub enum Modified<T> {
    Applied { before: T, after: T },
    Unchanged(T),
}

impl<T> Modified<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, Modified::Applied { .. })
    }

    pub fn entity(&self) -> &T {
        match self {
            Modified::Applied { after, .. } => after,
            Modified::Unchanged(entity) => entity,
        }
    }

    pub fn into_entity(self) -> T {
        match self {
            Modified::Applied { after, .. } => after,
            Modified::Unchanged(entity) => entity,
        }
    }
}

pub async fn load<T: Stored>(db: &DBClient, id: &str) -> Result<T, ServiceError> {
    db.fetch(T::COLLECTION, id)
        .await?
        .ok_or_else(|| ServiceError::not_found(T::ENTITY, id))
}

/// Read-modify-write under compare-and-swap. `change` returns `false` when the
/// current document already holds the desired state; nothing is written then.
/// A lost race re-reads and calls `change` again on the fresh copy.
pub async fn modify<T, F>(db: &DBClient, id: &str, mut change: F) -> Result<Modified<T>, ServiceError>
where
    T: Stored,
    F: FnMut(&mut T) -> Result<bool, ServiceError> + Send,
{
    let mut last_conflict = None;

    for attempt in 1..=MAX_CAS_ATTEMPTS {
        let current: T = load(db, id).await?;
        let mut next = current.clone();
        if !change(&mut next)? {
            return Ok(Modified::Unchanged(current));
        }

        match db.replace(T::COLLECTION, &next).await {
            Ok(after) => {
                return Ok(Modified::Applied {
                    before: current,
                    after,
                })
            }
            Err(conflict @ StoreError::VersionConflict { .. }) => {
                tracing::debug!(
                    entity = %T::ENTITY,
                    id,
                    attempt,
                    "version conflict, re-reading"
                );
                last_conflict = Some(conflict);
            }
            Err(error) => return Err(error.into()),
        }
    }

    Err(last_conflict
        .map(ServiceError::Store)
        .unwrap_or_else(|| ServiceError::not_found(T::ENTITY, id)))
}

/// Move `id` to `to` through the transition table. `check` runs against the
/// freshest copy before anything else (ownership, preconditions); `update`
/// stamps extra fields on the transitioned copy. Re-applying the current
/// status is a no-op.
pub async fn transition<T, C, U>(
    db: &DBClient,
    id: &str,
    to: T::Status,
    mut check: C,
    mut update: U,
) -> Result<Modified<T>, ServiceError>
where
    T: Lifecycle,
    C: FnMut(&T) -> Result<(), ServiceError> + Send,
    U: FnMut(&mut T) + Send,
{
    let outcome = modify(db, id, |entity: &mut T| {
        check(entity)?;
        let from = entity.status();
        if from == to {
            return Ok(false);
        }
        if !from.can_transition(to) {
            return Err(invalid_transition(from, to));
        }
        entity.set_status(to, Utc::now());
        update(entity);
        Ok(true)
    })
    .await?;

    if let Modified::Applied { before, .. } = &outcome {
        tracing::info!(
            "🔄 {} {} moved {} -> {}",
            T::ENTITY,
            id,
            before.status().to_str(),
            to.to_str()
        );
    }
    Ok(outcome)
}

pub fn invalid_transition<S: LifecycleStatus>(from: S, to: S) -> ServiceError {
    ServiceError::InvalidTransition {
        entity: S::ENTITY,
        from: from.to_str().to_string(),
        to: to.to_str().to_string(),
    }
}

impl Stored for Account {
    const COLLECTION: Collection = Collection::Accounts;
    const ENTITY: EntityType = EntityType::Account;
}

impl Stored for QuoteRequest {
    const COLLECTION: Collection = Collection::QuoteRequests;
    const ENTITY: EntityType = EntityType::QuoteRequest;
}

impl Lifecycle for QuoteRequest {
    type Status = QuoteRequestStatus;

    fn status(&self) -> QuoteRequestStatus {
        self.status
    }

    fn set_status(&mut self, to: QuoteRequestStatus, at: DateTime<Utc>) {
        self.apply_status(to, at);
    }
}

impl Stored for ProfessionalBid {
    const COLLECTION: Collection = Collection::ProfessionalBids;
    const ENTITY: EntityType = EntityType::ProfessionalBid;
}

impl Lifecycle for ProfessionalBid {
    type Status = BidStatus;

    fn status(&self) -> BidStatus {
        self.status
    }

    fn set_status(&mut self, to: BidStatus, at: DateTime<Utc>) {
        self.apply_status(to, at);
    }
}

impl Stored for Message {
    const COLLECTION: Collection = Collection::Messages;
    const ENTITY: EntityType = EntityType::Message;
}

impl Lifecycle for Message {
    type Status = ModerationStatus;

    fn status(&self) -> ModerationStatus {
        self.moderation_status
    }

    fn set_status(&mut self, to: ModerationStatus, at: DateTime<Utc>) {
        self.moderation_status = to;
        self.moderated_at = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{memory::MemoryStore, query_timeout::QueryTimeout, quotedb::QuoteRequestExt};
    use crate::models::quotemodel::Address;
    use std::sync::Arc;

    fn request(id: &str) -> QuoteRequest {
        let now = Utc::now();
        QuoteRequest {
            id: id.to_string(),
            owner_account_id: "owner".into(),
            project_type: "etancheite_toiture".into(),
            surface_area: 40.0,
            description: "Toit terrasse".into(),
            address: Address {
                street: "1 rue de la Paix".into(),
                city: "Marseille".into(),
                postal_code: "13001".into(),
            },
            photos: vec![],
            status: QuoteRequestStatus::PendingValidation,
            created_at: now,
            updated_at: now,
            validated_at: None,
            refused_at: None,
            cancelled_at: None,
            signed_at: None,
            accepted_bid_id: None,
            version: 0,
        }
    }

    async fn seeded() -> DBClient {
        let db = DBClient::new(Arc::new(MemoryStore::new()), QueryTimeout::default());
        db.save_quote_request(&request("r1")).await.unwrap();
        db
    }

    #[tokio::test]
    async fn reapplying_current_status_is_a_no_op() {
        let db = seeded().await;
        let first = transition::<QuoteRequest, _, _>(
            &db,
            "r1",
            QuoteRequestStatus::Validated,
            |_| Ok(()),
            |_| {},
        )
        .await
        .unwrap();
        assert!(first.is_applied());
        assert!(first.entity().validated_at.is_some());

        let second = transition::<QuoteRequest, _, _>(
            &db,
            "r1",
            QuoteRequestStatus::Validated,
            |_| Ok(()),
            |_| {},
        )
        .await
        .unwrap();
        assert!(!second.is_applied());
        assert_eq!(second.entity().version, first.entity().version);
    }

    #[tokio::test]
    async fn transition_outside_table_is_rejected() {
        let db = seeded().await;
        let result = transition::<QuoteRequest, _, _>(
            &db,
            "r1",
            QuoteRequestStatus::Signed,
            |_| Ok(()),
            |_| {},
        )
        .await;
        assert_eq!(
            result.unwrap_err(),
            ServiceError::InvalidTransition {
                entity: EntityType::QuoteRequest,
                from: "en_attente".into(),
                to: "signe".into(),
            }
        );
    }

    #[tokio::test]
    async fn concurrent_transitions_apply_once() {
        let db = seeded().await;
        let (a, b) = tokio::join!(
            transition::<QuoteRequest, _, _>(&db, "r1", QuoteRequestStatus::Validated, |_| Ok(()), |_| {}),
            transition::<QuoteRequest, _, _>(&db, "r1", QuoteRequestStatus::Validated, |_| Ok(()), |_| {}),
        );
        let applied = [a.unwrap(), b.unwrap()]
            .iter()
            .filter(|outcome| outcome.is_applied())
            .count();
        assert_eq!(applied, 1);
    }

    #[tokio::test]
    async fn missing_entity_is_not_found() {
        let db = seeded().await;
        let result = load::<QuoteRequest>(&db, "nope").await;
        assert!(matches!(result, Err(ServiceError::NotFound { .. })));
    }
}
