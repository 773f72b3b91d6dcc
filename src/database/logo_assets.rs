//! Asset Deduplicator (C2) persistence: one row per distinct content hash.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, Pool, Sqlite};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::LogoAsset;

#[derive(FromRow)]
struct LogoAssetRow {
    asset_id: String,
    content_hash: String,
    path: String,
    content_type: String,
    size_bytes: i64,
    width: Option<i64>,
    height: Option<i64>,
    created_at: DateTime<Utc>,
    last_referenced_at: DateTime<Utc>,
}

impl LogoAssetRow {
    fn into_asset(self) -> Result<LogoAsset, AppError> {
        Ok(LogoAsset {
            asset_id: Uuid::parse_str(&self.asset_id)
                .map_err(|e| AppError::internal(format!("corrupt asset_id: {e}")))?,
            content_hash: self.content_hash,
            path: self.path,
            content_type: self.content_type,
            size_bytes: self.size_bytes,
            width: self.width.map(|w| w as u32),
            height: self.height.map(|h| h as u32),
            created_at: self.created_at,
            last_referenced_at: self.last_referenced_at,
        })
    }
}

#[derive(Clone)]
pub struct LogoAssetRepository {
    pool: Pool<Sqlite>,
}

impl LogoAssetRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Looks up an existing asset by its content hash; this is the
    /// deduplication read path called before any bytes are written to disk.
    pub async fn find_by_hash(&self, content_hash: &str) -> Result<Option<LogoAsset>, AppError> {
        let row =
            sqlx::query_as::<_, LogoAssetRow>("SELECT * FROM logo_assets WHERE content_hash = ?")
                .bind(content_hash)
                .fetch_optional(&self.pool)
                .await?;

        row.map(LogoAssetRow::into_asset).transpose()
    }

    pub async fn insert(&self, asset: &LogoAsset) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO logo_assets (
                asset_id, content_hash, path, content_type, size_bytes, width, height,
                created_at, last_referenced_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(asset.asset_id.to_string())
        .bind(&asset.content_hash)
        .bind(&asset.path)
        .bind(&asset.content_type)
        .bind(asset.size_bytes)
        .bind(asset.width.map(|w| w as i64))
        .bind(asset.height.map(|h| h as i64))
        .bind(asset.created_at)
        .bind(asset.last_referenced_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn touch(&self, asset_id: Uuid, now: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query("UPDATE logo_assets SET last_referenced_at = ? WHERE asset_id = ?")
            .bind(now)
            .bind(asset_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Assets not referenced since `cutoff`, candidates for the retention sweep.
    pub async fn list_unreferenced_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<LogoAsset>, AppError> {
        let rows = sqlx::query_as::<_, LogoAssetRow>(
            "SELECT * FROM logo_assets WHERE last_referenced_at <= ?",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(LogoAssetRow::into_asset).collect()
    }

    pub async fn delete(&self, asset_id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM logo_assets WHERE asset_id = ?")
            .bind(asset_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
