//! `intake/` (§6 disk layout): uploaded files, writable only by the Intake
//! API; workers only read from it, to move the file into their own
//! workspace (§5 "Shared-resource policy").

use std::path::PathBuf;

use sandboxed_file_manager::{CleanupPolicy, SandboxedManager};

use crate::errors::AppError;
use crate::utils::sanitize::sanitize;

#[derive(Clone)]
pub struct IntakeStore {
    manager: SandboxedManager,
}

impl IntakeStore {
    pub async fn new(root: PathBuf) -> Result<Self, AppError> {
        let manager = SandboxedManager::builder()
            .base_directory(root)
            .cleanup_policy(CleanupPolicy::disabled())
            .build()
            .await?;
        Ok(Self { manager })
    }

    /// Writes an uploaded file under a sanitized filename prefixed with a
    /// task id so two concurrent uploads with the same original name never
    /// collide (§4.1 "the effective path is always `intake_root/sanitized`").
    pub async fn store_upload(
        &self,
        task_id: uuid::Uuid,
        original_filename: &str,
        bytes: &[u8],
    ) -> Result<String, AppError> {
        let safe_name = sanitize(original_filename);
        let rel_path = format!("{task_id}_{safe_name}");
        self.manager.write(&rel_path, bytes).await?;
        Ok(rel_path)
    }

    pub fn full_path(&self, rel_path: &str) -> Result<PathBuf, AppError> {
        Ok(self.manager.get_full_path(rel_path)?)
    }

    pub async fn remove(&self, rel_path: &str) -> Result<(), AppError> {
        if self.manager.exists(rel_path).await? {
            self.manager.remove_file(rel_path).await?;
        }
        Ok(())
    }
}
