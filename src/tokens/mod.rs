//! Token Service (C9, §4.5): short-lived, single-use, HMAC-signed download
//! grants. The bearer string handed to clients never appears verbatim in
//! storage; only its HMAC tag is persisted, so a stolen database dump can't
//! mint new tokens without the server's signing key.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use crate::database::tokens::TokenRepository;
use crate::errors::{AppError, PipelineError};
use crate::models::DownloadToken;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct TokenService {
    repo: TokenRepository,
    signing_key: Vec<u8>,
    ttl: Duration,
}

impl TokenService {
    pub fn new(repo: TokenRepository, signing_key: Vec<u8>, ttl_seconds: u64) -> Self {
        Self {
            repo,
            signing_key,
            ttl: Duration::seconds(ttl_seconds as i64),
        }
    }

    fn mac_for(&self, token_id: Uuid) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(&self.signing_key)
            .expect("HMAC accepts keys of any length");
        mac.update(token_id.as_bytes());
        mac
    }

    fn tag_for(&self, token_id: Uuid) -> Vec<u8> {
        self.mac_for(token_id).finalize().into_bytes().to_vec()
    }

    /// `issue(artifact_key, ttl) -> token` (§4.5). Returns the opaque bearer
    /// string the client presents to `/download-with-token/{token}`.
    pub async fn issue(&self, artifact_id: Uuid) -> Result<String, AppError> {
        let token_id = Uuid::new_v4();
        let tag = self.tag_for(token_id);
        let now = Utc::now();

        let token = DownloadToken {
            token_id,
            artifact_id,
            signature: hex_encode(&tag),
            created_at: now,
            expires_at: now + self.ttl,
            redeemed_at: None,
        };

        self.repo.insert(&token).await?;

        Ok(format!(
            "{}.{}",
            token_id.as_simple(),
            URL_SAFE_NO_PAD.encode(&tag)
        ))
    }

    /// `redeem(token) -> artifact_key | error` (§4.5). Cheap: one keyed
    /// lookup plus a constant-time tag comparison, no broker round-trip.
    /// A second redemption of the same bearer fails (§8 "tokens are
    /// single-use").
    pub async fn redeem(&self, bearer: &str) -> Result<Uuid, AppError> {
        let (token_id_part, tag_part) = bearer.split_once('.').ok_or_else(|| invalid())?;

        let token_id = Uuid::parse_str(token_id_part).map_err(|_| invalid())?;
        let presented_tag = URL_SAFE_NO_PAD.decode(tag_part).map_err(|_| invalid())?;

        // `verify_slice` compares in constant time, avoiding a timing
        // side-channel on the tag bytes.
        self.mac_for(token_id)
            .verify_slice(&presented_tag)
            .map_err(|_| invalid())?;

        let token = self
            .repo
            .get(token_id)
            .await?
            .ok_or_else(invalid)?;

        let now = Utc::now();
        if !token.is_usable(now) {
            return Err(invalid());
        }

        let claimed = self.repo.redeem_if_unused(token_id, now).await?;
        if !claimed {
            return Err(invalid());
        }

        Ok(token.artifact_id)
    }
}

fn invalid() -> AppError {
    AppError::Pipeline(PipelineError::BadRequest {
        message: "invalid or expired download token".to_string(),
    })
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::database::Database;

    async fn test_service() -> TokenService {
        let db = Database::new(&DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: Some(1),
        })
        .await
        .unwrap();
        db.migrate().await.unwrap();
        TokenService::new(
            TokenRepository::new(db.pool().clone()),
            b"test-signing-key".to_vec(),
            60,
        )
    }

    #[tokio::test]
    async fn redeem_succeeds_once_then_fails() {
        let svc = test_service().await;
        let artifact_id = Uuid::new_v4();
        let bearer = svc.issue(artifact_id).await.unwrap();

        let redeemed = svc.redeem(&bearer).await.unwrap();
        assert_eq!(redeemed, artifact_id);

        assert!(svc.redeem(&bearer).await.is_err());
    }

    #[tokio::test]
    async fn tampered_token_is_rejected() {
        let svc = test_service().await;
        let bearer = svc.issue(Uuid::new_v4()).await.unwrap();
        let mut tampered = bearer.clone();
        tampered.push('x');
        assert!(svc.redeem(&tampered).await.is_err());
    }
}
