//! Hierarchical application error types.

pub mod types;

pub use types::{AppError, PipelineError, RepositoryError};

pub type Result<T> = std::result::Result<T, AppError>;
