//! Error types for quakeview.
//!
//! Uses `thiserror` for library-style error definitions.

use thiserror::Error;

/// Errors that can occur while fetching the earthquake feed.
#[derive(Error, Debug)]
pub enum FeedError {
    /// HTTP transport failed (DNS, connect, TLS, timeout, body read)
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Feed returned a non-success status
    #[error("feed returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// JSON decoding failed
    #[error("failed to decode feed JSON: {0}")]
    Decode(#[from] serde_json::Error),

    /// Payload decoded but does not match the event schema
    #[error("invalid feed: {0}")]
    InvalidResponse(String),
}

/// Coarse failure class kept for diagnostics.
///
/// Both classes surface to the user as the same generic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Network,
    Parse,
}

impl FailureKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Parse => "parse",
        }
    }
}

impl FeedError {
    /// Collapse the error into its failure class.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Transport(_) | Self::Status { .. } => FailureKind::Network,
            Self::Decode(_) | Self::InvalidResponse(_) => FailureKind::Parse,
        }
    }
}
