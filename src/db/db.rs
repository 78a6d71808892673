// db/db.rs
use std::marker::PhantomData;
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::query_timeout::QueryTimeout;
use super::store::{
    Collection, Document, DocumentStore, Filter, OrderBy, StoreError, StoreResult,
};

/// Body field stamped with a fresh token on every compare-and-swap write.
pub const WRITE_TOKEN_FIELD: &str = "writeToken";

/// Entities that carry the store-level version of the document they came from.
pub trait Versioned {
    fn id(&self) -> &str;
    fn version(&self) -> i64;
}

#[derive(Clone)]
pub struct DBClient {
    store: Arc<dyn DocumentStore>,
    pub query_timeout: QueryTimeout,
}

impl std::fmt::Debug for DBClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DBClient")
            .field("store", &"dyn DocumentStore")
            .field("query_timeout", &self.query_timeout)
            .finish()
    }
}

fn to_body<T: Serialize>(entity: &T) -> StoreResult<Value> {
    let mut body = serde_json::to_value(entity)?;
    // The version lives on the document, never inside the body.
    if let Some(fields) = body.as_object_mut() {
        fields.remove("version");
    }
    Ok(body)
}

fn from_document<T: DeserializeOwned>(document: Document) -> StoreResult<T> {
    let mut body = document.body;
    if let Some(fields) = body.as_object_mut() {
        fields.insert("version".to_string(), Value::from(document.version));
    }
    Ok(serde_json::from_value(body)?)
}

fn carries_token(document: &Document, token: &str) -> bool {
    document.body.get(WRITE_TOKEN_FIELD).and_then(Value::as_str) == Some(token)
}

impl DBClient {
    pub fn new(store: Arc<dyn DocumentStore>, query_timeout: QueryTimeout) -> Self {
        DBClient { store, query_timeout }
    }

    pub async fn insert<T>(&self, collection: Collection, entity: &T) -> StoreResult<T>
    where
        T: Serialize + DeserializeOwned + Versioned,
    {
        let body = to_body(entity)?;
        let id = entity.id().to_string();
        let document = self
            .query_timeout
            .execute("create", || self.store.create(collection, &id, body.clone()))
            .await?;
        from_document(document)
    }

    pub async fn fetch<T: DeserializeOwned>(
        &self,
        collection: Collection,
        id: &str,
    ) -> StoreResult<Option<T>> {
        let document = self
            .query_timeout
            .execute("get", || self.store.get(collection, id))
            .await?;
        document.map(from_document).transpose()
    }

    pub async fn find<T: DeserializeOwned>(
        &self,
        collection: Collection,
        filter: &Filter,
        order: Option<&OrderBy>,
    ) -> StoreResult<Vec<T>> {
        let documents = self
            .query_timeout
            .execute("query", || self.store.query(collection, filter, order))
            .await?;
        documents.into_iter().map(from_document).collect()
    }

    /// Write the whole entity back, only if nobody else wrote since it was read.
    ///
    /// A retried attempt can hit a version conflict caused by an earlier
    /// attempt of the same call that committed but whose reply was lost. The
    /// write token tells that case apart from a write by someone else.
    pub async fn replace<T>(&self, collection: Collection, entity: &T) -> StoreResult<T>
    where
        T: Serialize + DeserializeOwned + Versioned,
    {
        let token = Uuid::new_v4().to_string();
        let mut body = to_body(entity)?;
        if let Some(fields) = body.as_object_mut() {
            fields.insert(WRITE_TOKEN_FIELD.to_string(), Value::from(token.clone()));
        }
        let id = entity.id().to_string();
        let expected = Some(entity.version());

        match self
            .query_timeout
            .execute("update", || self.store.update(collection, &id, body.clone(), expected))
            .await
        {
            Ok(document) => from_document(document),
            Err(conflict @ StoreError::VersionConflict { .. }) => {
                let current = self
                    .query_timeout
                    .execute("get", || self.store.get(collection, &id))
                    .await?;
                match current {
                    Some(document) if carries_token(&document, &token) => {
                        tracing::warn!(%collection, id = %id, "update had committed before its reply was lost");
                        from_document(document)
                    }
                    _ => Err(conflict),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Merge a partial set of fields without a version check.
    pub async fn patch(&self, collection: Collection, id: &str, fields: Value) -> StoreResult<()> {
        self.query_timeout
            .execute("update", || self.store.update(collection, id, fields.clone(), None))
            .await
            .map(|_| ())
    }

    pub async fn remove(&self, collection: Collection, id: &str) -> StoreResult<()> {
        self.query_timeout
            .execute("delete", || self.store.delete(collection, id))
            .await
    }

    /// Live query: the first `next_snapshot` returns the current result set,
    /// every later one waits for a write to the collection.
    pub async fn subscribe<T: DeserializeOwned>(
        &self,
        collection: Collection,
        filter: Filter,
        order: Option<OrderBy>,
    ) -> StoreResult<Subscription<T>> {
        let changes = self
            .query_timeout
            .execute("watch", || self.store.watch(collection))
            .await?;
        tracing::debug!(%collection, "subscription opened");
        Ok(Subscription {
            db: self.clone(),
            collection,
            filter,
            order,
            changes,
            primed: false,
            _entity: PhantomData,
        })
    }
}

/// Owner of a live query. Dropping it drops the change feed, which releases
/// the listener in the backing store.
pub struct Subscription<T> {
    db: DBClient,
    collection: Collection,
    filter: Filter,
    order: Option<OrderBy>,
    changes: BoxStream<'static, ()>,
    primed: bool,
    _entity: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Subscription<T> {
    pub async fn next_snapshot(&mut self) -> Option<StoreResult<Vec<T>>> {
        if self.primed {
            self.changes.next().await?;
        }
        self.primed = true;
        Some(
            self.db
                .find(self.collection, &self.filter, self.order.as_ref())
                .await,
        )
    }
}

impl<T: DeserializeOwned + Send + 'static> Subscription<T> {
    pub fn into_stream(self) -> BoxStream<'static, StoreResult<Vec<T>>> {
        stream::unfold(self, |mut subscription| async move {
            let snapshot = subscription.next_snapshot().await?;
            Some((snapshot, subscription))
        })
        .boxed()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        tracing::debug!(collection = %self.collection, "subscription cancelled");
    }
}
