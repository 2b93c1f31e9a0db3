//! Outbound events queued by the client.

use serde::{Deserialize, Serialize};

use crate::ids::{LocalEchoId, RoomId};

/// Media attached to an outbound event; uploaded before the event is sent.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAttachment {
    /// File name shown to recipients.
    pub name: String,
    /// MIME type.
    pub mime_type: String,
    /// Raw bytes.
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for MediaAttachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaAttachment")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("bytes", &format!("<{} bytes>", self.bytes.len()))
            .finish()
    }
}

/// A message the user asked to send, identified by its local echo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundEvent {
    /// Local echo shown in the timeline until the server confirms.
    pub local_echo_id: LocalEchoId,
    /// Destination room.
    pub room_id: RoomId,
    /// Message body.
    pub body: String,
    /// Optional media to upload first.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub attachment: Option<MediaAttachment>,
}
