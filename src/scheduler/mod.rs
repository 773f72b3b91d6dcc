//! Retention Scheduler (C8, §4.8): a single background task that wakes on
//! `retention_sweep_cron` and reaps everything past its expiry: published
//! artifacts, unreferenced logo assets, Task Records, and orphaned workspace
//! directories left behind by a hard-killed worker.

use std::str::FromStr;

use chrono::Utc;
use cron::Schedule;
use uuid::Uuid;

use crate::database::tasks::TaskRepository;
use crate::errors::AppError;
use crate::logo_assets::LogoAssetService;
use crate::storage::{ArtifactStore, WorkspaceStore};

#[derive(Clone)]
pub struct Scheduler {
    cron_expr: String,
    artifact_retention_hours: u64,
    logo_unreferenced_retention_days: u64,
    task_repo: TaskRepository,
    artifacts: ArtifactStore,
    logo_assets: LogoAssetService,
    workspace: WorkspaceStore,
}

impl Scheduler {
    pub fn new(
        cron_expr: String,
        artifact_retention_hours: u64,
        logo_unreferenced_retention_days: u64,
        task_repo: TaskRepository,
        artifacts: ArtifactStore,
        logo_assets: LogoAssetService,
        workspace: WorkspaceStore,
    ) -> Self {
        Self {
            cron_expr,
            artifact_retention_hours,
            logo_unreferenced_retention_days,
            task_repo,
            artifacts,
            logo_assets,
            workspace,
        }
    }

    /// Runs the sweep loop forever, sleeping until each cron-scheduled tick.
    /// A malformed cron expression is a configuration error callers should
    /// surface at startup rather than loop on.
    pub async fn run(&self) -> Result<(), AppError> {
        let schedule = Schedule::from_str(&self.cron_expr)
            .map_err(|e| AppError::configuration(format!("invalid retention_sweep_cron '{}': {e}", self.cron_expr)))?;

        loop {
            let Some(next) = schedule.upcoming(Utc).next() else {
                tracing::warn!("retention cron schedule has no future occurrences, stopping sweeps");
                return Ok(());
            };
            let delay = (next - Utc::now()).to_std().unwrap_or(std::time::Duration::from_secs(1));
            tokio::time::sleep(delay).await;

            if let Err(e) = self.sweep_once().await {
                tracing::error!(error = %e, "retention sweep failed");
            }
        }
    }

    /// One full pass of every retention policy (§4.8a-d). Individual failures
    /// are logged and do not abort the remaining sub-sweeps.
    pub async fn sweep_once(&self) -> Result<(), AppError> {
        let artifacts_deleted = self.sweep_expired_artifacts().await.unwrap_or_else(|e| {
            tracing::error!(error = %e, "artifact retention sweep failed");
            0
        });
        let logos_deleted = self.sweep_unreferenced_logos().await.unwrap_or_else(|e| {
            tracing::error!(error = %e, "logo retention sweep failed");
            0
        });
        let tasks_deleted = self.sweep_expired_tasks().await.unwrap_or_else(|e| {
            tracing::error!(error = %e, "task retention sweep failed");
            0
        });
        let orphans_removed = self.sweep_orphaned_workspaces().await.unwrap_or_else(|e| {
            tracing::error!(error = %e, "orphaned workspace sweep failed");
            0
        });

        tracing::info!(
            artifacts_deleted,
            logos_deleted,
            tasks_deleted,
            orphans_removed,
            "retention sweep complete"
        );
        Ok(())
    }

    /// §4.8a: artifacts past `artifact_expires_at`.
    async fn sweep_expired_artifacts(&self) -> Result<usize, AppError> {
        let expired = self.artifacts.list_expired().await?;
        let count = expired.len();
        for artifact in expired {
            self.artifacts.delete(&artifact).await?;
        }
        let _ = self.artifact_retention_hours; // retention window is enforced at publish time (§3)
        Ok(count)
    }

    /// §4.8b: logo assets unreferenced for longer than the configured window.
    async fn sweep_unreferenced_logos(&self) -> Result<usize, AppError> {
        self.logo_assets.cleanup_unreferenced(self.logo_unreferenced_retention_days).await
    }

    /// §4.8c: Task Records past `expires_at`.
    async fn sweep_expired_tasks(&self) -> Result<usize, AppError> {
        let expired = self.task_repo.list_expired(Utc::now()).await?;
        let count = expired.len();
        for task in expired {
            self.task_repo.delete(task.task_id).await?;
        }
        Ok(count)
    }

    /// §4.8d: workspace directories with no live, non-terminal task behind
    /// them, left over from a worker that was hard-killed before it could
    /// run its own S9 cleanup.
    async fn sweep_orphaned_workspaces(&self) -> Result<usize, AppError> {
        let mut removed = 0;
        for dir_name in self.workspace.list_task_dirs().await? {
            let Ok(task_id) = Uuid::parse_str(&dir_name) else {
                continue;
            };
            let still_running = matches!(
                self.task_repo.get(task_id).await?,
                Some(task) if !task.state.is_terminal()
            );
            if still_running {
                continue;
            }
            self.workspace.remove_task_dir(task_id).await?;
            removed += 1;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cron_expression_parses() {
        assert!(Schedule::from_str("0 0 */6 * * *").is_ok());
        assert!(Schedule::from_str("not a cron expression").is_err());
    }
}
