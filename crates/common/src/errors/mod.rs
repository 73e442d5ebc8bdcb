//! Error types for Chainsight
//!
//! Provides a single error enum shared across the workspace with:
//! - Distinct variants for each remote-call failure mode
//! - Transience classification for retry decisions
//! - Conversions from the HTTP and serialization layers

use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Required setting missing: {name}")]
    MissingSetting { name: String },

    // Generation (chat completion) errors
    #[error("Generation error from {model}: {message}")]
    Generation { model: String, message: String },

    #[error("Empty completion from {model}")]
    EmptyCompletion { model: String },

    #[error("Generation call timed out after {timeout_ms}ms")]
    GenerationTimeout { timeout_ms: u64 },

    // Embedding errors
    #[error("Embedding service error: {message}")]
    Embedding { message: String },

    #[error("Embedding batch length mismatch: sent {sent}, received {received}")]
    EmbeddingCountMismatch { sent: usize, received: usize },

    // Vector index errors
    #[error("Vector index error: {message}")]
    Index { message: String },

    // Transport and serialization
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Whether a retry could plausibly succeed
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Generation { .. }
            | AppError::EmptyCompletion { .. }
            | AppError::GenerationTimeout { .. }
            | AppError::Embedding { .. }
            | AppError::Index { .. } => true,
            AppError::HttpClient(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transience_classification() {
        let err = AppError::EmptyCompletion {
            model: "gpt-5".into(),
        };
        assert!(err.is_transient());

        let err = AppError::MissingSetting {
            name: "index.api_key".into(),
        };
        assert!(!err.is_transient());

        // A length mismatch is a contract violation, retrying the
        // same batch cannot fix it
        let err = AppError::EmbeddingCountMismatch {
            sent: 4,
            received: 3,
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn test_display_distinguishes_models() {
        let err = AppError::Generation {
            model: "claude-sonnet".into(),
            message: "overloaded".into(),
        };
        let text = err.to_string();
        assert!(text.contains("claude-sonnet"));
        assert!(text.contains("overloaded"));
    }
}
