//! Activity log models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Permit activity entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ActivityEntry {
    pub id: Uuid,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub action: String,
    /// None 表示系统操作（例如到期清扫）
    pub performed_by: Option<Uuid>,
    pub details: String,
    pub occurred_at: DateTime<Utc>,
}
