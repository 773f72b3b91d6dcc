//! Deduplicated watermark logo storage (§4.4, C2).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A content-addressed logo file. `content_hash` is the hex SHA-256 digest
/// of the uploaded bytes and is the sole deduplication key: two uploads with
/// identical bytes resolve to the same row and the same `path`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LogoAsset {
    pub asset_id: Uuid,
    pub content_hash: String,
    pub path: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub last_referenced_at: DateTime<Utc>,
}

impl LogoAsset {
    pub fn filename(&self) -> String {
        format!("custom_logo_{}", &self.content_hash[..8])
    }
}
