//! Transport abstraction.
//!
//! The HTTP layer lives outside the core. This trait is the seam the sync
//! loop and the outbox send worker talk through; the harness provides a
//! scripted implementation.

use std::time::Duration;

use async_trait::async_trait;
use skein_proto::{EventId, MediaAttachment, OutboundEvent, RoomId, SyncDelta, SyncToken};
use thiserror::Error;

/// Errors from the transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Request did not reach the server or the response was lost.
    #[error("network error: {reason}")]
    Network {
        /// Description of the failure.
        reason: String,
    },

    /// Server answered with an error status.
    #[error("server rejected request ({status}): {reason}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Server-provided error text.
        reason: String,
    },

    /// Transport was shut down.
    #[error("transport closed")]
    Closed,
}

impl TransportError {
    /// Whether repeating the same request may succeed.
    ///
    /// Network failures, rate limiting and server errors are retryable;
    /// other rejections and a closed transport are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Rejected { status, .. } => *status == 429 || *status >= 500,
            Self::Closed => false,
        }
    }
}

/// Client-server transport for one session.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Long-poll for changes since `since` (`None` = initial sync).
    async fn sync(
        &self,
        since: Option<&SyncToken>,
        timeout: Duration,
    ) -> Result<SyncDelta, TransportError>;

    /// Upload media and return its content URI.
    async fn upload_media(
        &self,
        room_id: &RoomId,
        attachment: &MediaAttachment,
    ) -> Result<String, TransportError>;

    /// Send an event, referencing previously uploaded media if any.
    async fn send_event(
        &self,
        event: &OutboundEvent,
        media_uri: Option<&str>,
    ) -> Result<EventId, TransportError>;
}
