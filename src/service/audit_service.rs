// service/audit_service.rs
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    db::{auditdb::AuditExt, db::DBClient},
    models::{auditmodel::AuditEntry, EntityType},
    service::{
        error::ServiceError, identity_service::Identity, notification_service::TransitionEvent,
    },
};

#[derive(Debug, Clone)]
pub struct AuditService {
    db_client: Arc<DBClient>,
}

impl AuditService {
    pub fn new(db_client: Arc<DBClient>) -> Self {
        Self { db_client }
    }

    /// Append a transition to the trail. A failed write is logged and
    /// swallowed; the transition it describes has already happened.
    pub async fn record(&self, event: &TransitionEvent, reason: Option<&str>) {
        let entry = AuditEntry {
            id: Uuid::new_v4().to_string(),
            entity_type: event.entity_type,
            entity_id: event.entity_id.clone(),
            from_state: event.from_state.clone(),
            to_state: event.to_state.clone(),
            actor_id: event.actor_id.clone(),
            reason: reason.map(str::to_string),
            created_at: Utc::now(),
            version: 0,
        };

        if let Err(e) = self.db_client.save_audit_entry(&entry).await {
            tracing::warn!(
                "⚠️ Failed to write audit entry for {} {}: {}",
                event.entity_type,
                event.entity_id,
                e
            );
        }
    }

    pub async fn trail(
        &self,
        identity: &Identity,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<Vec<AuditEntry>, ServiceError> {
        identity.require_admin("read the audit trail")?;
        Ok(self.db_client.get_audit_trail(entity_type, entity_id).await?)
    }
}
