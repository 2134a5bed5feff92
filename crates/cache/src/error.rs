//! Error classification for remote provider calls
//!
//! The cache core branches on exactly one distinction: can this failure be
//! healed by waiting (serve from cache, queue the write, retry later), or is
//! the request itself wrong. Everything else uses `anyhow` with context.

use thiserror::Error;

/// Why a remote rejection is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    /// The request was malformed or semantically invalid
    Validation,
    /// The credential lacks access to the resource
    Permission,
    /// The resource no longer exists remotely
    NotFound,
}

/// A classified failure from the remote provider
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    /// The provider was unreachable or timed out. Retryable: reads fall back
    /// to cache, writes are queued for later replay.
    #[error("remote provider unreachable: {0}")]
    Connectivity(String),

    /// The provider rejected the request. Terminal: surfaced to the caller,
    /// never queued, never retried.
    #[error("remote provider rejected request ({kind:?}): {message}")]
    Rejected {
        kind: RejectionKind,
        message: String,
    },
}

impl RemoteError {
    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::Connectivity(message.into())
    }

    pub fn rejected(kind: RejectionKind, message: impl Into<String>) -> Self {
        Self::Rejected {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::rejected(RejectionKind::NotFound, message)
    }

    /// Whether a later identical call could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connectivity(_))
    }
}
