//! Asset Deduplicator (C2, §4.4): user-supplied watermark logos, stored
//! once per distinct content hash.

use chrono::Utc;
use sandboxed_file_manager::{CleanupPolicy, SandboxedManager};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use uuid::Uuid;

use crate::database::logo_assets::LogoAssetRepository;
use crate::errors::AppError;
use crate::models::LogoAsset;

#[derive(Clone)]
pub struct LogoAssetService {
    manager: SandboxedManager,
    repo: LogoAssetRepository,
}

impl LogoAssetService {
    pub async fn new(root: PathBuf, repo: LogoAssetRepository) -> Result<Self, AppError> {
        let manager = SandboxedManager::builder()
            .base_directory(root)
            .cleanup_policy(CleanupPolicy::disabled())
            .build()
            .await?;
        Ok(Self { manager, repo })
    }

    /// `save_logo(bytes, ext) -> (asset, is_new)` (§4.4). Hashes the bytes
    /// with SHA-256; an existing row with the same hash is reused (and its
    /// `last_referenced_at` touched) rather than writing a duplicate file.
    pub async fn save_logo(
        &self,
        bytes: &[u8],
        ext: &str,
        content_type: &str,
    ) -> Result<(LogoAsset, bool), AppError> {
        let content_hash = hex_sha256(bytes);

        if let Some(existing) = self.repo.find_by_hash(&content_hash).await? {
            let now = Utc::now();
            self.repo.touch(existing.asset_id, now).await?;
            return Ok((
                LogoAsset {
                    last_referenced_at: now,
                    ..existing
                },
                false,
            ));
        }

        let ext = ext.trim_start_matches('.');
        let filename = format!("custom_logo_{}.{ext}", &content_hash[..8]);
        self.manager.write(&filename, bytes).await?;

        let (width, height) = probe_dimensions(bytes);
        let now = Utc::now();
        let asset = LogoAsset {
            asset_id: Uuid::new_v4(),
            content_hash,
            path: filename,
            content_type: content_type.to_string(),
            size_bytes: bytes.len() as i64,
            width,
            height,
            created_at: now,
            last_referenced_at: now,
        };

        self.repo.insert(&asset).await?;
        Ok((asset, true))
    }

    pub fn full_path(&self, asset: &LogoAsset) -> Result<PathBuf, AppError> {
        Ok(self.manager.get_full_path(&asset.path)?)
    }

    /// Resolves a stored relative path directly, for callers (the render
    /// stage) that only have `watermark.logo_ref` and not a full row.
    pub fn full_path_for_ref(&self, rel_path: &str) -> Result<PathBuf, AppError> {
        Ok(self.manager.get_full_path(rel_path)?)
    }

    /// `cleanup(older_than)` (§4.4): removes logo files not referenced
    /// within the configured window. Called by the Scheduler (§4.8b).
    pub async fn cleanup_unreferenced(&self, older_than_days: u64) -> Result<usize, AppError> {
        let cutoff = Utc::now() - chrono::Duration::days(older_than_days as i64);
        let stale = self.repo.list_unreferenced_since(cutoff).await?;
        let count = stale.len();

        for asset in stale {
            if self.manager.exists(&asset.path).await? {
                self.manager.remove_file(&asset.path).await?;
            }
            self.repo.delete(asset.asset_id).await?;
        }

        Ok(count)
    }
}

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Best-effort image dimension probe; a decode failure (not actually an
/// image, or an unsupported format) degrades to `(None, None)` rather than
/// rejecting the upload; the watermark stage re-validates before use.
fn probe_dimensions(bytes: &[u8]) -> (Option<u32>, Option<u32>) {
    match image::load_from_memory(bytes) {
        Ok(img) => {
            use image::GenericImageView;
            let (w, h) = img.dimensions();
            (Some(w), Some(h))
        }
        Err(_) => (None, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::config::DatabaseConfig;

    async fn test_service() -> (LogoAssetService, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(&DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: Some(1),
        })
        .await
        .unwrap();
        db.migrate().await.unwrap();
        let repo = LogoAssetRepository::new(db.pool().clone());
        let svc = LogoAssetService::new(dir.path().to_path_buf(), repo)
            .await
            .unwrap();
        (svc, dir)
    }

    #[tokio::test]
    async fn duplicate_bytes_deduplicate_to_one_file() {
        let (svc, _dir) = test_service().await;
        let bytes = b"not actually a png but bytes are bytes";

        let (first, is_new_1) = svc.save_logo(bytes, "png", "image/png").await.unwrap();
        let (second, is_new_2) = svc.save_logo(bytes, "png", "image/png").await.unwrap();

        assert!(is_new_1);
        assert!(!is_new_2);
        assert_eq!(first.asset_id, second.asset_id);
        assert_eq!(first.path, second.path);
    }

    #[tokio::test]
    async fn distinct_bytes_create_distinct_assets() {
        let (svc, _dir) = test_service().await;
        let (a, _) = svc.save_logo(b"logo-a", "png", "image/png").await.unwrap();
        let (b, _) = svc.save_logo(b"logo-b", "png", "image/png").await.unwrap();
        assert_ne!(a.asset_id, b.asset_id);
        assert_ne!(a.path, b.path);
    }
}
