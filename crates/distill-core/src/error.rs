//! Error taxonomy for generation jobs.

use std::time::Duration;

use thiserror::Error;

/// Errors produced while running a generation job.
///
/// Transport failures are split into transient ones (retried by the client)
/// and fatal ones (surfaced immediately). Content failures are only retried by
/// the quiz validation loop.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GenerationError {
    /// Connection refused or another low-level network failure
    #[error("Network error: {0}")]
    Network(String),

    /// The server answered with a non-success status
    #[error("Model server returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The request exceeded its hard timeout and was aborted
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The response body broke off before the stream finished
    #[error("Stream interrupted, partial results discarded: {0}")]
    StreamInterrupted(String),

    /// The model answered but the output does not have the required shape
    #[error("Invalid model output: {0}")]
    InvalidContent(String),

    /// The validation retry budget ran out
    #[error("Retries exhausted after {attempts} attempts: {reason}")]
    RetriesExhausted { attempts: u32, reason: String },

    /// The document has no text to generate from
    #[error("No source text available for this document")]
    NoSourceText,

    /// The result could not be saved
    #[error("Failed to save result: {0}")]
    Persist(String),

    /// The job was cancelled before it finished
    #[error("Generation cancelled")]
    Cancelled,
}

impl GenerationError {
    /// Whether retrying the same request unchanged may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// Stable snake_case code for front-end matching.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Network(_) => "network_error",
            Self::Http { .. } => "http_error",
            Self::Timeout(_) => "timeout",
            Self::StreamInterrupted(_) => "stream_interrupted",
            Self::InvalidContent(_) => "invalid_content",
            Self::RetriesExhausted { .. } => "retries_exhausted",
            Self::NoSourceText => "no_source_text",
            Self::Persist(_) => "persist_failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::Http {
                status: status.as_u16(),
                message: err.to_string(),
            };
        }
        // Timeouts carry no duration here; the client maps them with its own value.
        if err.is_timeout() {
            return Self::Timeout(Duration::ZERO);
        }
        Self::Network(err.to_string())
    }
}

pub type GenerationResult<T> = Result<T, GenerationError>;
