//! Command error types
//!
//! Provides structured errors that serialize to `{"code": "...", "message": "..."}`.

use distill_core::GenerationError;
use serde::Serialize;

/// Errors returned by CLI commands
///
/// Each variant serializes with a snake_case `code` field for scripted callers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum CommandError {
    // Validation errors
    InvalidArgument { message: String },
    InvalidUtf8 { message: String },

    // Not found errors
    FileNotFound { message: String },

    // Operation errors
    GenerationFailed { message: String, reason: String },
    StorageError { message: String },
    ExternalError { message: String },
    InternalError { message: String },
}

impl CommandError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn file_not_found(path: &std::path::Path) -> Self {
        Self::FileNotFound {
            message: format!("File not found: {}", path.display()),
        }
    }

    /// A job ended with an error on its terminal event.
    pub fn generation_failed(message: impl Into<String>) -> Self {
        Self::GenerationFailed {
            message: message.into(),
            reason: "generation_failed".to_string(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::StorageError {
            message: message.into(),
        }
    }

    pub fn external(message: impl Into<String>) -> Self {
        Self::ExternalError {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument { message } => write!(f, "{}", message),
            Self::InvalidUtf8 { message } => write!(f, "{}", message),
            Self::FileNotFound { message } => write!(f, "{}", message),
            Self::GenerationFailed { message, .. } => write!(f, "{}", message),
            Self::StorageError { message } => write!(f, "{}", message),
            Self::ExternalError { message } => write!(f, "{}", message),
            Self::InternalError { message } => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for CommandError {}

// Conversion from anyhow::Error (used by collaborator traits)
impl From<anyhow::Error> for CommandError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(err.to_string())
    }
}

impl From<std::io::Error> for CommandError {
    fn from(err: std::io::Error) -> Self {
        Self::storage(err.to_string())
    }
}

// Keep the pipeline's own error code as the reason
impl From<GenerationError> for CommandError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::NoSourceText => Self::invalid_argument(err.to_string()),
            GenerationError::Persist(_) => Self::storage(err.to_string()),
            other => Self::GenerationFailed {
                message: other.to_string(),
                reason: other.code().to_string(),
            },
        }
    }
}

/// Result type alias for commands
pub type CommandResult<T> = Result<T, CommandError>;

/// Extension trait for converting Results to CommandResult
pub trait ResultExt<T> {
    fn storage_err(self) -> CommandResult<T>;
    fn external_err(self) -> CommandResult<T>;
    fn internal_err(self) -> CommandResult<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn storage_err(self) -> CommandResult<T> {
        self.map_err(|e| CommandError::storage(e.to_string()))
    }

    fn external_err(self) -> CommandResult<T> {
        self.map_err(|e| CommandError::external(e.to_string()))
    }

    fn internal_err(self) -> CommandResult<T> {
        self.map_err(|e| CommandError::internal(e.to_string()))
    }
}
