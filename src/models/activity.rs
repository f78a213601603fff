use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ActivityEntry {
    pub id: Uuid,
    pub event: String,
    pub detail: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
