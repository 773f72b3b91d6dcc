pub mod artifact;
pub mod logo_asset;
pub mod queue;
pub mod task;
pub mod token;

pub use artifact::{Artifact, ArtifactKind};
pub use logo_asset::LogoAsset;
pub use queue::{QueueEntry, QueueKind};
pub use task::{
    ErrorCode, InitialRequest, Progress, RequestKind, SourceMetadata, Step, StepStatus, Task,
    TaskError, TaskResult, TaskState, TranscribeModel, TranslationService, UserChoices,
    WatermarkChoice, WatermarkPosition, WatermarkSize,
};
pub use token::DownloadToken;
