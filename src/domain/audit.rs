use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub actor_id: Uuid,
    pub entity_name: String,
    pub entity_id: Uuid,
    pub action: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub affected_fields: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub entity_name: Option<String>,
    pub cursor: Option<(OffsetDateTime, Uuid)>,
    pub limit: i64,
}
