//! Error types for sitechat.
//!
//! Library crates use [`SitechatError`] via `thiserror`.
//! App crates (ingest/chat) wrap this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all sitechat operations.
#[derive(Debug, thiserror::Error)]
pub enum SitechatError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error during sitemap or page fetching.
    #[error("network error: {0}")]
    Network(String),

    /// XML/HTML parsing or content extraction error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Text splitting error (invalid splitter parameters).
    #[error("chunking error: {0}")]
    Chunking(String),

    /// Vector dataset / storage layer error.
    #[error("store error: {0}")]
    Store(String),

    /// OpenAI API error (embeddings or chat completions).
    #[error("api error: {0}")]
    Api(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (empty sitemap, dimension mismatch, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SitechatError>;

impl SitechatError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
