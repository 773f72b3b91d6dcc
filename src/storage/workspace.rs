//! Per-task scratch workspace (§4.6.9 "temporary files are scoped to a
//! per-task workspace"). One [`SandboxedManager`] rooted at `workspace_path`
//! is shared process-wide; every path a caller uses is prefixed with the
//! task id so tasks can never read or clobber one another's files.

use std::path::PathBuf;

use sandboxed_file_manager::{CleanupPolicy, SandboxedManager};
use uuid::Uuid;

use crate::errors::AppError;

#[derive(Clone)]
pub struct WorkspaceStore {
    manager: SandboxedManager,
}

impl WorkspaceStore {
    /// Retention here is disabled: the Scheduler (C8) reaps orphaned
    /// workspace directories explicitly by age, and a successfully completed
    /// task removes its own directory at S9 (publish + cleanup).
    pub async fn new(root: PathBuf) -> Result<Self, AppError> {
        let manager = SandboxedManager::builder()
            .base_directory(root)
            .cleanup_policy(CleanupPolicy::disabled())
            .build()
            .await?;
        Ok(Self { manager })
    }

    fn task_prefix(task_id: Uuid) -> String {
        task_id.to_string()
    }

    pub async fn create_task_dir(&self, task_id: Uuid) -> Result<(), AppError> {
        self.manager
            .create_dir_all(Self::task_prefix(task_id))
            .await?;
        Ok(())
    }

    /// `rel_path` is relative to the task's own directory, e.g. `"audio.wav"`.
    pub async fn write(
        &self,
        task_id: Uuid,
        rel_path: &str,
        contents: &[u8],
    ) -> Result<(), AppError> {
        let path = format!("{}/{rel_path}", Self::task_prefix(task_id));
        self.manager.write(path, contents).await?;
        Ok(())
    }

    pub async fn read(&self, task_id: Uuid, rel_path: &str) -> Result<Vec<u8>, AppError> {
        let path = format!("{}/{rel_path}", Self::task_prefix(task_id));
        Ok(self.manager.read(path).await?)
    }

    /// Absolute path on disk, for handing to an external-tool subprocess
    /// (download/extract/render) that needs a real filesystem path.
    pub fn full_path(&self, task_id: Uuid, rel_path: &str) -> Result<PathBuf, AppError> {
        let path = format!("{}/{rel_path}", Self::task_prefix(task_id));
        Ok(self.manager.get_full_path(path)?)
    }

    pub async fn exists(&self, task_id: Uuid, rel_path: &str) -> Result<bool, AppError> {
        let path = format!("{}/{rel_path}", Self::task_prefix(task_id));
        Ok(self.manager.exists(path).await?)
    }

    /// Removes the entire per-task directory. Called on success (after
    /// publish) and on terminal failure, so a worker never leaks scratch
    /// files (§4.6.9, §4.6.8 "stages MUST clean up their own partial outputs").
    pub async fn remove_task_dir(&self, task_id: Uuid) -> Result<(), AppError> {
        let prefix = Self::task_prefix(task_id);
        if self.manager.exists(&prefix).await? {
            self.manager.remove_dir_all(prefix).await?;
        }
        Ok(())
    }

    /// Directories under the workspace root not matching any known task,
    /// used by the Scheduler to reap orphans left behind by a hard-killed
    /// worker (§4.8d).
    pub async fn list_task_dirs(&self) -> Result<Vec<String>, AppError> {
        Ok(self.manager.list_files("").await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_and_reads_are_scoped_per_task() {
        let dir = tempfile::tempdir().unwrap();
        let store = WorkspaceStore::new(dir.path().to_path_buf()).await.unwrap();
        let task_id = Uuid::new_v4();

        store.create_task_dir(task_id).await.unwrap();
        store.write(task_id, "segments.json", b"[]").await.unwrap();

        assert!(store.exists(task_id, "segments.json").await.unwrap());
        assert_eq!(store.read(task_id, "segments.json").await.unwrap(), b"[]");

        store.remove_task_dir(task_id).await.unwrap();
        assert!(!store.exists(task_id, "segments.json").await.unwrap());
    }
}
