//! Download Token (§3, C9): a single-use, short-lived grant to fetch one
//! artifact without exposing the raw task id as a capability.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DownloadToken {
    pub token_id: Uuid,
    pub artifact_id: Uuid,
    /// HMAC-SHA256 digest of `token_id`, hex-encoded. The bearer string handed
    /// to clients is `token_id` plus this tag, base64url-joined; only the
    /// digest is stored so a stolen database dump can't mint new tokens.
    pub signature: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub redeemed_at: Option<DateTime<Utc>>,
}

impl DownloadToken {
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.redeemed_at.is_none() && self.expires_at > now
    }
}
