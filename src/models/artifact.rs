//! Published output of a task (§3 Artifact, §6 disk layout).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "artifact_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    OriginalSubs,
    TranslatedSubs,
    SubtitledVideo,
    DownloadedSource,
}

/// A single file placed under the published artifact directory for a task.
/// `path` is always relative to that task's artifact directory and must
/// never contain `..` or an absolute prefix.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Artifact {
    pub artifact_id: Uuid,
    pub task_id: Uuid,
    pub kind: ArtifactKind,
    pub path: String,
    pub size_bytes: i64,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Artifact {
    /// True when `path` is safe to join under a sandboxed artifact root:
    /// no traversal segments, no absolute prefix, no embedded null byte.
    pub fn has_safe_path(&self) -> bool {
        !self.path.contains('\0')
            && !std::path::Path::new(&self.path).is_absolute()
            && !self.path.split('/').any(|segment| segment == "..")
    }
}
