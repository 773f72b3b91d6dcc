//! The Task Record (§3): owned by the Task Registry, mutated only through
//! the Progress Reporter's monotonic update discipline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "task_state", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Progress,
    Success,
    Failure,
}

impl TaskState {
    /// `state` transitions follow `Pending -> Progress -> {Success, Failure}`; no backward
    /// transitions are ever valid.
    pub fn can_transition_to(self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (TaskState::Pending, TaskState::Progress)
                | (TaskState::Pending, TaskState::Success)
                | (TaskState::Pending, TaskState::Failure)
                | (TaskState::Progress, TaskState::Success)
                | (TaskState::Progress, TaskState::Failure)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Success | TaskState::Failure)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Upload,
    RemoteUrl,
    DownloadOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitialRequest {
    pub kind: RequestKind,
    pub url: Option<String>,
    pub filename: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum WatermarkPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Center,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WatermarkSize {
    Small,
    Medium,
    Large,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatermarkChoice {
    pub enabled: bool,
    pub position: WatermarkPosition,
    pub size: WatermarkSize,
    /// 0..100
    pub opacity: u8,
    pub logo_ref: Option<String>,
}

impl Default for WatermarkChoice {
    fn default() -> Self {
        Self {
            enabled: false,
            position: WatermarkPosition::BottomRight,
            size: WatermarkSize::Medium,
            opacity: 80,
            logo_ref: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TranscribeModel {
    Tiny,
    Base,
    Small,
    Medium,
    Large,
    RemoteApi,
}

impl TranscribeModel {
    /// Fallback order used by §4.6.2's best-effort model downgrade: large -> medium -> base -> tiny.
    pub fn downgrade(self) -> Option<TranscribeModel> {
        match self {
            TranscribeModel::Large => Some(TranscribeModel::Medium),
            TranscribeModel::Medium => Some(TranscribeModel::Base),
            TranscribeModel::Base => Some(TranscribeModel::Tiny),
            TranscribeModel::Tiny | TranscribeModel::RemoteApi => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TranslationService {
    Free,
    Paid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserChoices {
    pub source_lang: String,
    /// May be empty, meaning transcription-only (S5 is skipped).
    pub target_lang: String,
    pub transcribe_model: TranscribeModel,
    pub translation_service: TranslationService,
    pub burn_in: bool,
    pub watermark: WatermarkChoice,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SourceMetadata {
    pub duration_s: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
    pub codec_v: Option<String>,
    pub codec_a: Option<String>,
    pub bit_rate: Option<u64>,
    pub size_bytes: Option<u64>,
    pub mime: Option<String>,
    pub ext: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Waiting,
    InProgress,
    Completed,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub weight: f64,
    pub status: StepStatus,
    /// 0..100
    pub percent: f64,
    pub indeterminate: bool,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Progress {
    pub overall_percent: f64,
    pub steps: Vec<Step>,
    pub logs: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResultFiles {
    pub original_subs: Option<String>,
    pub translated_subs: Option<String>,
    pub subtitled_video: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub files: ResultFiles,
    pub timing_summary: serde_json::Value,
    pub chained_task_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    BadRequest,
    UnsupportedMedia,
    ProbeFailed,
    PayloadTooLarge,
    RateLimited,
    DownloadFailed,
    AudioExtractionError,
    TranscriptionError,
    TranslationError,
    SubtitleEmitError,
    RenderError,
    FormatError,
    TimeoutExceeded,
    Infrastructure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskError {
    pub code: ErrorCode,
    pub message: String,
    pub user_message: String,
    pub recoverable: bool,
}

/// The Task Record (§3). Created by the Intake API, mutated exclusively by
/// the owning worker through the Progress Reporter, read by the Intake API
/// and the Scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: Uuid,
    pub state: TaskState,
    pub initial_request: InitialRequest,
    pub user_choices: UserChoices,
    pub source_metadata: Option<SourceMetadata>,
    pub progress: Progress,
    pub result: Option<TaskResult>,
    pub error: Option<TaskError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub artifact_expires_at: Option<DateTime<Utc>>,
}

impl Task {
    /// `result` is present iff `state = Success`; `error` is present iff `state = Failure`.
    pub fn invariants_hold(&self) -> bool {
        match self.state {
            TaskState::Success => self.result.is_some() && self.error.is_none(),
            TaskState::Failure => self.error.is_some() && self.result.is_none(),
            TaskState::Pending | TaskState::Progress => {
                self.result.is_none() && self.error.is_none()
            }
        }
    }
}
