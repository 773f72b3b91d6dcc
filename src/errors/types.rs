//! Hierarchical application error types.
//!
//! This module defines all error types used throughout the service,
//! providing a hierarchical error system that makes debugging and error
//! handling more straightforward.

use thiserror::Error;

/// Top-level application error type
///
/// This enum represents all possible errors that can occur in the application.
/// It uses `thiserror` to provide automatic error trait implementations and
/// proper error chaining.
#[derive(Error, Debug)]
pub enum AppError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    
    /// Repository layer errors
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation { message: String },
    
    /// Resource not found errors
    #[error("Not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },
    
    /// Permission denied errors
    #[error("Permission denied: {action} on {resource}")]
    PermissionDenied { action: String, resource: String },
    
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },
    
    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
    
    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Media pipeline errors, carrying one of the stable error codes surfaced
    /// on the Task Record's `error.code` field.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Sandboxed storage errors (workspace/artifact/logo/intake directories).
    #[error("Storage error: {0}")]
    Storage(#[from] sandboxed_file_manager::SandboxedFileError),
}

/// Pipeline-stage errors, one variant per stable `error.code` the Intake API
/// and Task Record expose to clients.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("bad request: {message}")]
    BadRequest { message: String },

    #[error("unsupported media: {detail}")]
    UnsupportedMedia { detail: String },

    #[error("probe failed: {detail}")]
    ProbeFailed { detail: String },

    #[error("payload too large: {size} bytes (max {max_size})")]
    PayloadTooLarge { size: u64, max_size: u64 },

    #[error("rate limited: retry after {retry_after_s}s")]
    RateLimited { retry_after_s: u64 },

    #[error("queue depth ceiling exceeded: retry after {retry_after_s}s")]
    QueueSaturated { retry_after_s: u64 },

    #[error("download failed: {detail}")]
    DownloadFailed { detail: String },

    #[error("audio extraction failed: {detail}")]
    AudioExtractionError { detail: String },

    #[error("transcription failed: {detail}")]
    TranscriptionError { detail: String },

    #[error("translation failed: {detail}")]
    TranslationError { detail: String },

    #[error("subtitle emission failed: {detail}")]
    SubtitleEmitError { detail: String },

    #[error("render failed: {detail}")]
    RenderError { detail: String },

    #[error("format error: {detail}")]
    FormatError { detail: String },

    #[error("timeout exceeded at stage {stage}")]
    TimeoutExceeded { stage: String },

    #[error("infrastructure error: {detail}")]
    Infrastructure { detail: String },
}

impl PipelineError {
    /// Maps onto the Task Record's `error.code` enum (§3, §7).
    pub fn code(&self) -> crate::models::ErrorCode {
        use crate::models::ErrorCode;
        match self {
            PipelineError::BadRequest { .. } => ErrorCode::BadRequest,
            PipelineError::UnsupportedMedia { .. } => ErrorCode::UnsupportedMedia,
            PipelineError::ProbeFailed { .. } => ErrorCode::ProbeFailed,
            PipelineError::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
            PipelineError::RateLimited { .. } => ErrorCode::RateLimited,
            PipelineError::QueueSaturated { .. } => ErrorCode::Infrastructure,
            PipelineError::DownloadFailed { .. } => ErrorCode::DownloadFailed,
            PipelineError::AudioExtractionError { .. } => ErrorCode::AudioExtractionError,
            PipelineError::TranscriptionError { .. } => ErrorCode::TranscriptionError,
            PipelineError::TranslationError { .. } => ErrorCode::TranslationError,
            PipelineError::SubtitleEmitError { .. } => ErrorCode::SubtitleEmitError,
            PipelineError::RenderError { .. } => ErrorCode::RenderError,
            PipelineError::FormatError { .. } => ErrorCode::FormatError,
            PipelineError::TimeoutExceeded { .. } => ErrorCode::TimeoutExceeded,
            PipelineError::Infrastructure { .. } => ErrorCode::Infrastructure,
        }
    }

    /// Whether a retry of the same job is worth attempting (§7): everything
    /// except a client-caused `BadRequest`/`UnsupportedMedia`/`PayloadTooLarge`
    /// is considered recoverable on a fresh attempt.
    pub fn recoverable(&self) -> bool {
        !matches!(
            self,
            PipelineError::BadRequest { .. }
                | PipelineError::UnsupportedMedia { .. }
                | PipelineError::PayloadTooLarge { .. }
                | PipelineError::FormatError { .. }
        )
    }
}

/// Repository layer specific errors
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Database connection failures
    #[error("Database connection failed: {message}")]
    ConnectionFailed { message: String },
    
    /// SQL query execution failures
    #[error("Query failed: {query} - {message}")]
    QueryFailed { query: String, message: String },
    
    /// Data serialization/deserialization failures
    #[error("Serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
    
    /// Constraint violations (unique, foreign key, etc.)
    #[error("Constraint violation: {constraint} - {message}")]
    ConstraintViolation { constraint: String, message: String },
    
    /// Record not found
    #[error("Record not found: {table} with {field} = {value}")]
    RecordNotFound { table: String, field: String, value: String },
    
    /// Migration failures
    #[error("Migration failed: {version} - {message}")]
    MigrationFailed { version: String, message: String },
}

/// Convenience methods for creating common error types
impl AppError {
    /// Create a validation error with a custom message
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
    
    /// Create a not found error for a specific resource
    pub fn not_found<R: Into<String>, I: Into<String>>(resource: R, id: I) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }
    
    /// Create a permission denied error
    pub fn permission_denied<A: Into<String>, R: Into<String>>(action: A, resource: R) -> Self {
        Self::PermissionDenied {
            action: action.into(),
            resource: resource.into(),
        }
    }
    
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
    
    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl RepositoryError {
    /// Create a query failed error
    pub fn query_failed<Q: Into<String>, M: Into<String>>(query: Q, message: M) -> Self {
        Self::QueryFailed {
            query: query.into(),
            message: message.into(),
        }
    }
    
    /// Create a record not found error
    pub fn record_not_found<T: Into<String>, F: Into<String>, V: Into<String>>(
        table: T,
        field: F,
        value: V,
    ) -> Self {
        Self::RecordNotFound {
            table: table.into(),
            field: field.into(),
            value: value.into(),
        }
    }
    
    /// Create a constraint violation error
    pub fn constraint_violation<C: Into<String>, M: Into<String>>(
        constraint: C,
        message: M,
    ) -> Self {
        Self::ConstraintViolation {
            constraint: constraint.into(),
            message: message.into(),
        }
    }
}

