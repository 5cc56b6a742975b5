use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Marks a refresh token as burned. Keyed by the SHA-256 of the raw token string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct InvalidationRecord {
    pub token_hash: String,
    pub user_id: Uuid,
    pub invalidated_at: DateTime<Utc>,
    /// When the burned token would have expired anyway.
    pub expires_at: DateTime<Utc>,
}
