// db/auditdb.rs
use async_trait::async_trait;

use super::db::DBClient;
use super::store::{Collection, Filter, OrderBy, StoreResult};
use crate::models::{auditmodel::AuditEntry, EntityType};

#[async_trait]
pub trait AuditExt {
    async fn save_audit_entry(&self, entry: &AuditEntry) -> StoreResult<AuditEntry>;

    async fn get_audit_trail(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> StoreResult<Vec<AuditEntry>>;
}

#[async_trait]
impl AuditExt for DBClient {
    async fn save_audit_entry(&self, entry: &AuditEntry) -> StoreResult<AuditEntry> {
        self.insert(Collection::AuditLogs, entry).await
    }

    async fn get_audit_trail(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> StoreResult<Vec<AuditEntry>> {
        self.find(
            Collection::AuditLogs,
            &Filter::all()
                .eq("entityType", entity_type.to_str())
                .eq("entityId", entity_id),
            Some(&OrderBy::asc("createdAt")),
        )
        .await
    }
}
