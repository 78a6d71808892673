// db/memory.rs
//! In-memory document store.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use tokio::sync::broadcast;

use super::store::{
    merge_patch, Collection, Document, DocumentStore, Filter, OrderBy, StoreError, StoreResult,
};

type Collections = HashMap<Collection, BTreeMap<String, Document>>;

pub struct MemoryStore {
    collections: RwLock<Collections>,
    changes: broadcast::Sender<Collection>,
    injected_failures: Mutex<VecDeque<StoreError>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            collections: RwLock::new(HashMap::new()),
            changes,
            injected_failures: Mutex::new(VecDeque::new()),
        }
    }

    /// Queue an error returned by the next store call instead of executing it.
    pub fn inject_failure(&self, error: StoreError) {
        if let Ok(mut queue) = self.injected_failures.lock() {
            queue.push_back(error);
        }
    }

    /// Live change feeds handed out by `watch` and not yet dropped.
    pub fn watcher_count(&self) -> usize {
        self.changes.receiver_count()
    }

    fn take_injected(&self) -> StoreResult<()> {
        let mut queue = self
            .injected_failures
            .lock()
            .map_err(|_| StoreError::Unavailable("failure queue poisoned".to_string()))?;
        match queue.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn read(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, Collections>> {
        self.collections
            .read()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<std::sync::RwLockWriteGuard<'_, Collections>> {
        self.collections
            .write()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    fn notify(&self, collection: Collection) {
        // No receivers simply means nobody is watching.
        let _ = self.changes.send(collection);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create(&self, collection: Collection, id: &str, body: Value) -> StoreResult<Document> {
        self.take_injected()?;
        let document = {
            let mut collections = self.write()?;
            let docs = collections.entry(collection).or_default();
            if docs.contains_key(id) {
                return Err(StoreError::AlreadyExists {
                    collection: collection.to_str(),
                    id: id.to_string(),
                });
            }
            let document = Document { id: id.to_string(), version: 1, body };
            docs.insert(id.to_string(), document.clone());
            document
        };
        self.notify(collection);
        Ok(document)
    }

    async fn get(&self, collection: Collection, id: &str) -> StoreResult<Option<Document>> {
        self.take_injected()?;
        let collections = self.read()?;
        Ok(collections.get(&collection).and_then(|docs| docs.get(id)).cloned())
    }

    async fn query(
        &self,
        collection: Collection,
        filter: &Filter,
        order: Option<&OrderBy>,
    ) -> StoreResult<Vec<Document>> {
        self.take_injected()?;
        let collections = self.read()?;
        let mut docs: Vec<Document> = collections
            .get(&collection)
            .map(|docs| {
                docs.values()
                    .filter(|doc| filter.matches(&doc.body))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if let Some(order) = order {
            docs.sort_by(|a, b| order.compare(&a.body, &b.body));
        }
        Ok(docs)
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: Value,
        expected_version: Option<i64>,
    ) -> StoreResult<Document> {
        self.take_injected()?;
        let document = {
            let mut collections = self.write()?;
            let current = collections
                .get_mut(&collection)
                .and_then(|docs| docs.get_mut(id))
                .ok_or_else(|| StoreError::NotFound {
                    collection: collection.to_str(),
                    id: id.to_string(),
                })?;
            if let Some(expected) = expected_version {
                if current.version != expected {
                    return Err(StoreError::VersionConflict {
                        collection: collection.to_str(),
                        id: id.to_string(),
                        expected,
                        found: current.version,
                    });
                }
            }
            merge_patch(&mut current.body, patch);
            current.version += 1;
            current.clone()
        };
        self.notify(collection);
        Ok(document)
    }

    async fn delete(&self, collection: Collection, id: &str) -> StoreResult<()> {
        self.take_injected()?;
        {
            let mut collections = self.write()?;
            let removed = collections
                .get_mut(&collection)
                .and_then(|docs| docs.remove(id));
            if removed.is_none() {
                return Err(StoreError::NotFound {
                    collection: collection.to_str(),
                    id: id.to_string(),
                });
            }
        }
        self.notify(collection);
        Ok(())
    }

    async fn watch(&self, collection: Collection) -> StoreResult<BoxStream<'static, ()>> {
        let receiver = self.changes.subscribe();
        let ticks = stream::unfold(receiver, move |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(changed) if changed == collection => return Some(((), receiver)),
                    Ok(_) => continue,
                    // Missed events still mean something changed.
                    Err(broadcast::error::RecvError::Lagged(_)) => return Some(((), receiver)),
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(ticks.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn create_get_and_duplicate() {
        let store = MemoryStore::new();
        let doc = store
            .create(Collection::Accounts, "a1", json!({"email": "a@b.fr"}))
            .await
            .unwrap();
        assert_eq!(doc.version, 1);

        let fetched = store.get(Collection::Accounts, "a1").await.unwrap().unwrap();
        assert_eq!(fetched.body["email"], "a@b.fr");

        let duplicate = store.create(Collection::Accounts, "a1", json!({})).await;
        assert!(matches!(duplicate, Err(StoreError::AlreadyExists { .. })));
    }

    #[tokio::test]
    async fn update_enforces_expected_version() {
        let store = MemoryStore::new();
        store
            .create(Collection::QuoteRequests, "q1", json!({"status": "en_attente"}))
            .await
            .unwrap();

        let updated = store
            .update(Collection::QuoteRequests, "q1", json!({"status": "valide"}), Some(1))
            .await
            .unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.body["status"], "valide");

        let stale = store
            .update(Collection::QuoteRequests, "q1", json!({"status": "refuse"}), Some(1))
            .await;
        assert!(matches!(
            stale,
            Err(StoreError::VersionConflict { expected: 1, found: 2, .. })
        ));
    }

    #[tokio::test]
    async fn query_filters_and_orders() {
        let store = MemoryStore::new();
        for (id, owner, at) in [("q1", "u1", "2024-03"), ("q2", "u2", "2024-01"), ("q3", "u1", "2024-02")] {
            store
                .create(Collection::QuoteRequests, id, json!({"ownerAccountId": owner, "createdAt": at}))
                .await
                .unwrap();
        }

        let docs = store
            .query(
                Collection::QuoteRequests,
                &Filter::all().eq("ownerAccountId", "u1"),
                Some(&OrderBy::asc("createdAt")),
            )
            .await
            .unwrap();
        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["q3", "q1"]);
    }

    #[tokio::test]
    async fn injected_failure_is_returned_once() {
        let store = MemoryStore::new();
        store.inject_failure(StoreError::Unavailable("flaky".into()));

        assert!(store.get(Collection::Accounts, "x").await.is_err());
        assert!(store.get(Collection::Accounts, "x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn watch_ticks_only_for_its_collection() {
        let store = MemoryStore::new();
        let mut ticks = store.watch(Collection::Notifications).await.unwrap();

        store.create(Collection::Accounts, "a1", json!({})).await.unwrap();
        store.create(Collection::Notifications, "n1", json!({})).await.unwrap();

        let tick = tokio::time::timeout(std::time::Duration::from_secs(1), ticks.next()).await;
        assert_eq!(tick.unwrap(), Some(()));
    }
}
