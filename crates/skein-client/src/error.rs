//! Client error types.

use skein_core::{BufferError, StoreError, TransportError};
use skein_proto::{ProtoError, SessionId};
use thiserror::Error;

/// Errors from session lifecycle and session operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Lifecycle operation on a session that is not registered.
    #[error("unknown session: {session_id}")]
    UnknownSession {
        /// The session id that was not found.
        session_id: SessionId,
    },

    /// Operation on a context that has already been torn down.
    #[error("session closed: {session_id}")]
    SessionClosed {
        /// The closed session.
        session_id: SessionId,
    },

    /// Local store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Ephemeral buffer failure.
    #[error("ephemeral buffer error: {0}")]
    Buffer(#[from] BufferError),

    /// Transport failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Credential encoding failure.
    #[error("codec error: {0}")]
    Codec(#[from] ProtoError),

    /// Credential store failure.
    #[error("credential store error: {reason}")]
    Credentials {
        /// Description of the failure.
        reason: String,
    },

    /// The backend could not open a session's collaborators.
    #[error("backend error: {reason}")]
    Backend {
        /// Description of the failure.
        reason: String,
    },

    /// A blocking task panicked or was cancelled.
    #[error("background task failed: {reason}")]
    Task {
        /// Description of the failure.
        reason: String,
    },
}

impl ClientError {
    /// Returns true if this error is fatal (unrecoverable).
    ///
    /// Fatal errors indicate misuse of the lifecycle API or a broken
    /// collaborator. Transient errors can be recovered by retrying.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::UnknownSession { .. }
            | Self::SessionClosed { .. }
            | Self::Codec(_)
            | Self::Task { .. } => true,

            Self::Transport(e) => !e.is_retryable(),
            Self::Store(e) => matches!(e, StoreError::Closed),

            Self::Buffer(_) | Self::Credentials { .. } | Self::Backend { .. } => false,
        }
    }
}

impl From<tokio::task::JoinError> for ClientError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task { reason: err.to_string() }
    }
}
