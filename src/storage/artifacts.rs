//! Published artifact directory. Files land here only via [`ArtifactStore::publish`],
//! an atomic move out of a task's workspace (§3 "An artifact is never
//! mutated after publish").

use std::path::PathBuf;

use chrono::{Duration, Utc};
use sandboxed_file_manager::{CleanupPolicy, SandboxedManager};
use uuid::Uuid;

use crate::database::artifacts::ArtifactRepository;
use crate::errors::AppError;
use crate::models::{Artifact, ArtifactKind};
use crate::storage::workspace::WorkspaceStore;
use crate::utils::sanitize::sanitize;

#[derive(Clone)]
pub struct ArtifactStore {
    manager: SandboxedManager,
    repo: ArtifactRepository,
    retention: chrono::Duration,
}

impl ArtifactStore {
    pub async fn new(
        root: PathBuf,
        repo: ArtifactRepository,
        retention_hours: u64,
    ) -> Result<Self, AppError> {
        let manager = SandboxedManager::builder()
            .base_directory(root)
            .cleanup_policy(CleanupPolicy::disabled())
            .build()
            .await?;
        Ok(Self {
            manager,
            repo,
            retention: Duration::hours(retention_hours as i64),
        })
    }

    fn task_prefix(task_id: Uuid) -> String {
        task_id.to_string()
    }

    /// Moves `rel_in_workspace` out of the task's scratch directory into the
    /// published directory under `<task_id>/<sanitized-filename>`, records
    /// the artifact row, and returns it. The move is attempted as a
    /// same-filesystem rename first (true atomicity); if the workspace and
    /// artifact roots live on different filesystems it falls back to
    /// copy-then-delete, which is not atomic but leaves no dangling
    /// half-written file visible under the published path because the copy
    /// target is written before the source is removed and before the
    /// caller observes success.
    pub async fn publish(
        &self,
        workspace: &WorkspaceStore,
        task_id: Uuid,
        rel_in_workspace: &str,
        kind: ArtifactKind,
        content_type: &str,
    ) -> Result<Artifact, AppError> {
        let filename = sanitize(
            std::path::Path::new(rel_in_workspace)
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("artifact"),
        );
        let rel_in_artifacts = format!("{}/{filename}", Self::task_prefix(task_id));

        self.manager
            .create_dir_all(Self::task_prefix(task_id))
            .await?;

        let src = workspace.full_path(task_id, rel_in_workspace)?;
        let dst = self.manager.get_full_path(&rel_in_artifacts)?;

        match tokio::fs::rename(&src, &dst).await {
            Ok(()) => {}
            Err(_) => {
                let bytes = workspace.read(task_id, rel_in_workspace).await?;
                self.manager.write(&rel_in_artifacts, &bytes).await?;
                tokio::fs::remove_file(&src).await.ok();
            }
        }

        let size_bytes = tokio::fs::metadata(&dst).await.map(|m| m.len()).unwrap_or(0) as i64;
        let now = Utc::now();
        let artifact = Artifact {
            artifact_id: Uuid::new_v4(),
            task_id,
            kind,
            path: rel_in_artifacts,
            size_bytes,
            content_type: content_type.to_string(),
            created_at: now,
            expires_at: now + self.retention,
        };

        self.repo.insert(&artifact).await?;
        Ok(artifact)
    }

    pub async fn get(&self, artifact_id: Uuid) -> Result<Option<Artifact>, AppError> {
        self.repo.get(artifact_id).await
    }

    pub async fn list_for_task(&self, task_id: Uuid) -> Result<Vec<Artifact>, AppError> {
        self.repo.list_for_task(task_id).await
    }

    /// Resolves a `{task_id}/{filename}`-shaped path straight from the
    /// `/download/{filename}` route, where the client has no token.
    pub async fn get_by_path(&self, path: &str) -> Result<Option<Artifact>, AppError> {
        self.repo.find_by_path(path).await
    }

    /// Absolute path of a published artifact, for the front-proxy delegated
    /// file-serve header (§9 "Large-file downloads").
    pub fn full_path(&self, artifact: &Artifact) -> Result<PathBuf, AppError> {
        Ok(self.manager.get_full_path(&artifact.path)?)
    }

    /// Deletes the on-disk file and its row. Used by the Scheduler's
    /// retention sweep (§4.8a).
    pub async fn delete(&self, artifact: &Artifact) -> Result<(), AppError> {
        if self.manager.exists(&artifact.path).await? {
            self.manager.remove_file(&artifact.path).await?;
        }
        self.repo.delete(artifact.artifact_id).await
    }

    pub async fn list_expired(&self) -> Result<Vec<Artifact>, AppError> {
        self.repo.list_expired(Utc::now()).await
    }
}
