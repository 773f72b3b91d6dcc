//! Token Service (C9) persistence: tracks the HMAC tag and redemption state
//! for each issued download token.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, Pool, Sqlite};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::DownloadToken;

#[derive(FromRow)]
struct TokenRow {
    token_id: String,
    artifact_id: String,
    signature: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    redeemed_at: Option<DateTime<Utc>>,
}

impl TokenRow {
    fn into_token(self) -> Result<DownloadToken, AppError> {
        Ok(DownloadToken {
            token_id: Uuid::parse_str(&self.token_id)
                .map_err(|e| AppError::internal(format!("corrupt token_id: {e}")))?,
            artifact_id: Uuid::parse_str(&self.artifact_id)
                .map_err(|e| AppError::internal(format!("corrupt artifact_id: {e}")))?,
            signature: self.signature,
            created_at: self.created_at,
            expires_at: self.expires_at,
            redeemed_at: self.redeemed_at,
        })
    }
}

#[derive(Clone)]
pub struct TokenRepository {
    pool: Pool<Sqlite>,
}

impl TokenRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, token: &DownloadToken) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO download_tokens (
                token_id, artifact_id, signature, created_at, expires_at, redeemed_at
            ) VALUES (?, ?, ?, ?, ?, NULL)
            "#,
        )
        .bind(token.token_id.to_string())
        .bind(token.artifact_id.to_string())
        .bind(&token.signature)
        .bind(token.created_at)
        .bind(token.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, token_id: Uuid) -> Result<Option<DownloadToken>, AppError> {
        let row = sqlx::query_as::<_, TokenRow>("SELECT * FROM download_tokens WHERE token_id = ?")
            .bind(token_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TokenRow::into_token).transpose()
    }

    /// Marks the token redeemed only if it is still unredeemed, in a single
    /// statement so two concurrent redemptions can't both succeed (§4.9,
    /// single-use enforcement).
    pub async fn redeem_if_unused(
        &self,
        token_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE download_tokens SET redeemed_at = ? WHERE token_id = ? AND redeemed_at IS NULL",
        )
        .bind(now)
        .bind(token_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<DownloadToken>, AppError> {
        let rows =
            sqlx::query_as::<_, TokenRow>("SELECT * FROM download_tokens WHERE expires_at <= ?")
                .bind(now)
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(TokenRow::into_token).collect()
    }

    pub async fn delete(&self, token_id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM download_tokens WHERE token_id = ?")
            .bind(token_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
