//! Error types for askpage.
//!
//! Library crates use [`AskPageError`] via `thiserror`.
//! The binary wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all askpage operations.
#[derive(Debug, thiserror::Error)]
pub enum AskPageError {
    /// Missing, oversized, or mistyped request input.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// The URL failed the domain allow-list or the path blocklist.
    #[error("url not permitted: {url}")]
    UrlNotPermitted { url: String },

    /// Content could not be retrieved, or what came back was too short.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Normalization left nothing to work with.
    #[error("processing error: {message}")]
    Processing { message: String },

    /// A fetch or completion call exceeded its time bound.
    #[error("upstream timeout: {0}")]
    UpstreamTimeout(String),

    /// The content-fetching subprocess failed to spawn, speak JSON-RPC, or answer.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A completion provider returned an error or an unusable body.
    #[error("llm error: {0}")]
    Llm(String),

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, AskPageError>;

impl AskPageError {
    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a url-not-permitted error for the given URL.
    pub fn url_not_permitted(url: impl Into<String>) -> Self {
        Self::UrlNotPermitted { url: url.into() }
    }

    /// Create a processing error from any displayable message.
    pub fn processing(msg: impl Into<String>) -> Self {
        Self::Processing {
            message: msg.into(),
        }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
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

    /// Stable snake_case name of the error kind, surfaced to HTTP callers.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::UrlNotPermitted { .. } => "url_not_permitted",
            Self::Fetch(_) => "fetch_error",
            Self::Processing { .. } => "processing_error",
            Self::UpstreamTimeout(_) => "upstream_timeout",
            Self::Protocol(_) | Self::Llm(_) | Self::Config { .. } | Self::Io { .. } => {
                "internal_error"
            }
        }
    }

    /// Whether a content-fetch strategy may fall through to its next source.
    ///
    /// Only transport-level failures qualify; everything else propagates.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Protocol(_) | Self::Fetch(_) | Self::UpstreamTimeout(_)
        )
    }

    /// True for the kinds whose message is safe to show to any caller.
    pub fn is_caller_facing(&self) -> bool {
        self.kind() != "internal_error" && !matches!(self, Self::Processing { .. })
    }
}
