use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EntityType;
use crate::db::db::Versioned;

/// One row per accepted transition.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub from_state: Option<String>,
    pub to_state: String,
    pub actor_id: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub version: i64,
}

impl Versioned for AuditEntry {
    fn id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> i64 {
        self.version
    }
}
