// db/store.rs
//! Document store boundary.
//!
//! Every entity lives as a JSON document inside a named collection. The store
//! is the only persistence seam: the in-memory backend serves tests and local
//! development, the Postgres backend stores documents as JSONB rows.

use std::cmp::Ordering;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Accounts,
    QuoteRequests,
    ProfessionalBids,
    Messages,
    Notifications,
    AuditLogs,
}

impl Collection {
    pub fn to_str(&self) -> &'static str {
        match self {
            Collection::Accounts => "accounts",
            Collection::QuoteRequests => "quote_requests",
            Collection::ProfessionalBids => "professional_bids",
            Collection::Messages => "messages",
            Collection::Notifications => "notifications",
            Collection::AuditLogs => "audit_logs",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_str())
    }
}

/// A stored document. `version` starts at 1 and increases by one on every
/// successful update.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub version: i64,
    pub body: Value,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("document {collection}/{id} not found")]
    NotFound { collection: &'static str, id: String },

    #[error("document {collection}/{id} already exists")]
    AlreadyExists { collection: &'static str, id: String },

    #[error("version conflict on {collection}/{id}: expected {expected}, found {found}")]
    VersionConflict {
        collection: &'static str,
        id: String,
        expected: i64,
        found: i64,
    },

    #[error("store call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store permission denied: {0}")]
    PermissionDenied(String),

    #[error("document serialization failed: {0}")]
    Serialization(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Timeouts and unavailability may succeed on retry; everything else is
    /// permanent and propagates immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Timeout(_) | StoreError::Unavailable(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(String, Value),
    AnyOf(String, Vec<Value>),
}

/// Conjunction of field conditions evaluated against top-level document fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq(field.to_string(), value.into()));
        self
    }

    pub fn any_of<I, V>(mut self, field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.conditions.push(Condition::AnyOf(
            field.to_string(),
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn matches(&self, body: &Value) -> bool {
        self.conditions.iter().all(|condition| match condition {
            Condition::Eq(field, expected) => body.get(field) == Some(expected),
            Condition::AnyOf(field, allowed) => body
                .get(field)
                .map(|value| allowed.contains(value))
                .unwrap_or(false),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

impl OrderBy {
    pub fn asc(field: &str) -> Self {
        Self { field: field.to_string(), descending: false }
    }

    pub fn desc(field: &str) -> Self {
        Self { field: field.to_string(), descending: true }
    }

    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        let ordering = compare_values(a.get(&self.field), b.get(&self.field));
        if self.descending {
            ordering.reverse()
        } else {
            ordering
        }
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (None, Some(_)) | (Some(Value::Null), Some(_)) => Ordering::Less,
        (Some(_), None) | (Some(_), Some(Value::Null)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

/// Shallow merge: top-level keys of `patch` replace the ones in `body`.
pub fn merge_patch(body: &mut Value, patch: Value) {
    match (body.as_object_mut(), patch) {
        (Some(target), Value::Object(fields)) => {
            for (key, value) in fields {
                target.insert(key, value);
            }
        }
        (_, replacement) => *body = replacement,
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a new document under a caller-chosen id.
    async fn create(&self, collection: Collection, id: &str, body: Value) -> StoreResult<Document>;

    async fn get(&self, collection: Collection, id: &str) -> StoreResult<Option<Document>>;

    async fn query(
        &self,
        collection: Collection,
        filter: &Filter,
        order: Option<&OrderBy>,
    ) -> StoreResult<Vec<Document>>;

    /// Merge `patch` into the document. With `expected_version` set the write
    /// only happens when the stored version still matches (compare-and-swap).
    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: Value,
        expected_version: Option<i64>,
    ) -> StoreResult<Document>;

    async fn delete(&self, collection: Collection, id: &str) -> StoreResult<()>;

    /// Stream that ticks after every write to `collection`. Dropping the
    /// stream releases the underlying listener.
    async fn watch(&self, collection: Collection) -> StoreResult<BoxStream<'static, ()>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filter_matches_eq_and_any_of() {
        let doc = json!({"status": "valide", "ownerAccountId": "u1"});

        assert!(Filter::all().matches(&doc));
        assert!(Filter::all().eq("ownerAccountId", "u1").matches(&doc));
        assert!(!Filter::all().eq("ownerAccountId", "u2").matches(&doc));
        assert!(Filter::all()
            .any_of("status", ["valide", "en_discussion"])
            .matches(&doc));
        assert!(!Filter::all().any_of("status", ["signe"]).matches(&doc));
        assert!(!Filter::all().eq("missing", "x").matches(&doc));
    }

    #[test]
    fn order_by_handles_strings_numbers_and_missing() {
        let a = json!({"createdAt": "2024-01-01T00:00:00Z", "n": 2});
        let b = json!({"createdAt": "2024-02-01T00:00:00Z", "n": 10});
        let c = json!({});

        assert_eq!(OrderBy::asc("createdAt").compare(&a, &b), Ordering::Less);
        assert_eq!(OrderBy::desc("createdAt").compare(&a, &b), Ordering::Greater);
        assert_eq!(OrderBy::asc("n").compare(&a, &b), Ordering::Less);
        assert_eq!(OrderBy::asc("n").compare(&c, &a), Ordering::Less);
    }

    #[test]
    fn merge_patch_is_shallow() {
        let mut body = json!({"a": 1, "nested": {"x": 1, "y": 2}});
        merge_patch(&mut body, json!({"b": 2, "nested": {"x": 3}}));
        assert_eq!(body, json!({"a": 1, "b": 2, "nested": {"x": 3}}));
    }

    #[test]
    fn transient_classification() {
        assert!(StoreError::Timeout(std::time::Duration::from_secs(1)).is_transient());
        assert!(StoreError::Unavailable("down".into()).is_transient());
        assert!(!StoreError::NotFound { collection: "accounts", id: "x".into() }.is_transient());
        assert!(!StoreError::PermissionDenied("no".into()).is_transient());
    }
}
