// db/pgstore.rs
//! PostgreSQL backend: one `documents` table keyed by (collection, id) with a
//! JSONB body. Writes publish the collection name on the `document_changes`
//! channel so `watch` can follow them with LISTEN.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde_json::Value;
use sqlx::postgres::{PgListener, PgPool};
use sqlx::{Postgres, QueryBuilder};

use super::store::{
    Collection, Condition, Document, DocumentStore, Filter, OrderBy, StoreError, StoreResult,
};

const CHANGE_CHANNEL: &str = "document_changes";

#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl std::fmt::Debug for PgDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgDocumentStore")
            .field("pool", &"Pool<Postgres>")
            .finish()
    }
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the documents table when it does not exist yet.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                version BIGINT NOT NULL,
                body JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (collection, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS documents_body_idx ON documents USING GIN (body)")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        tracing::info!("✅ documents table ready");
        Ok(())
    }

    async fn publish_change(&self, collection: Collection) {
        if let Err(e) = sqlx::query("SELECT pg_notify($1, $2)")
            .bind(CHANGE_CHANNEL)
            .bind(collection.to_str())
            .execute(&self.pool)
            .await
        {
            tracing::warn!("Failed to publish change for {}: {}", collection, e);
        }
    }

    async fn current_version(&self, collection: Collection, id: &str) -> StoreResult<Option<i64>> {
        sqlx::query_scalar::<_, i64>(
            "SELECT version FROM documents WHERE collection = $1 AND id = $2",
        )
        .bind(collection.to_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)
    }
}

fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut => StoreError::Timeout(std::time::Duration::ZERO),
        sqlx::Error::Io(e) => StoreError::Unavailable(e.to_string()),
        sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => {
            StoreError::Unavailable(err.to_string())
        }
        sqlx::Error::Database(ref db) if db.code().as_deref() == Some("42501") => {
            StoreError::PermissionDenied(db.message().to_string())
        }
        other => StoreError::Backend(other.to_string()),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn create(&self, collection: Collection, id: &str, body: Value) -> StoreResult<Document> {
        let inserted = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO documents (collection, id, version, body)
            VALUES ($1, $2, 1, $3)
            ON CONFLICT (collection, id) DO NOTHING
            RETURNING version
            "#,
        )
        .bind(collection.to_str())
        .bind(id)
        .bind(&body)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        match inserted {
            Some(version) => {
                self.publish_change(collection).await;
                Ok(Document { id: id.to_string(), version, body })
            }
            None => Err(StoreError::AlreadyExists {
                collection: collection.to_str(),
                id: id.to_string(),
            }),
        }
    }

    async fn get(&self, collection: Collection, id: &str) -> StoreResult<Option<Document>> {
        let row = sqlx::query_as::<_, (String, i64, Value)>(
            "SELECT id, version, body FROM documents WHERE collection = $1 AND id = $2",
        )
        .bind(collection.to_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(|(id, version, body)| Document { id, version, body }))
    }

    async fn query(
        &self,
        collection: Collection,
        filter: &Filter,
        order: Option<&OrderBy>,
    ) -> StoreResult<Vec<Document>> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT id, version, body FROM documents WHERE collection = ");
        builder.push_bind(collection.to_str());

        for condition in filter.conditions() {
            match condition {
                Condition::Eq(field, value) => {
                    let mut containment = serde_json::Map::new();
                    containment.insert(field.clone(), value.clone());
                    builder.push(" AND body @> ");
                    builder.push_bind(Value::Object(containment));
                }
                Condition::AnyOf(field, values) => {
                    let texts: Vec<String> = values.iter().map(scalar_text).collect();
                    builder.push(" AND body ->> ");
                    builder.push_bind(field.clone());
                    builder.push(" = ANY(");
                    builder.push_bind(texts);
                    builder.push(")");
                }
            }
        }

        if let Some(order) = order {
            builder.push(" ORDER BY body -> ");
            builder.push_bind(order.field.clone());
            builder.push(if order.descending { " DESC" } else { " ASC" });
        }

        let rows = builder
            .build_query_as::<(String, i64, Value)>()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|(id, version, body)| Document { id, version, body })
            .collect())
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: Value,
        expected_version: Option<i64>,
    ) -> StoreResult<Document> {
        let updated = sqlx::query_as::<_, (String, i64, Value)>(
            r#"
            UPDATE documents
            SET body = body || $3, version = version + 1, updated_at = NOW()
            WHERE collection = $1 AND id = $2 AND ($4::BIGINT IS NULL OR version = $4)
            RETURNING id, version, body
            "#,
        )
        .bind(collection.to_str())
        .bind(id)
        .bind(&patch)
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        match updated {
            Some((id, version, body)) => {
                self.publish_change(collection).await;
                Ok(Document { id, version, body })
            }
            None => match (self.current_version(collection, id).await?, expected_version) {
                (Some(found), Some(expected)) => Err(StoreError::VersionConflict {
                    collection: collection.to_str(),
                    id: id.to_string(),
                    expected,
                    found,
                }),
                _ => Err(StoreError::NotFound {
                    collection: collection.to_str(),
                    id: id.to_string(),
                }),
            },
        }
    }

    async fn delete(&self, collection: Collection, id: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection.to_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                collection: collection.to_str(),
                id: id.to_string(),
            });
        }
        self.publish_change(collection).await;
        Ok(())
    }

    async fn watch(&self, collection: Collection) -> StoreResult<BoxStream<'static, ()>> {
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        listener
            .listen(CHANGE_CHANNEL)
            .await
            .map_err(map_sqlx_error)?;

        let name = collection.to_str();
        let ticks = listener.into_stream().filter_map(move |notification| async move {
            match notification {
                Ok(n) if n.payload() == name => Some(()),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!("document change listener error: {}", e);
                    None
                }
            }
        });
        Ok(ticks.boxed())
    }
}
