//! Ephemeral per-room payloads (typing notifications, read receipts).

use serde::{Deserialize, Serialize};

use crate::ids::{EventId, UserId};

/// A read receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Reader.
    pub user_id: UserId,
    /// Last event read.
    pub event_id: EventId,
    /// Server timestamp in milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

/// Transient room signals delivered next to, but apart from, durable state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EphemeralPayload {
    /// Users currently typing, in server order.
    #[serde(default)]
    pub typing: Vec<UserId>,
    /// Receipts carried in this sync cycle.
    #[serde(default)]
    pub receipts: Vec<Receipt>,
}

impl EphemeralPayload {
    /// Whether the payload carries nothing worth staging.
    pub fn is_empty(&self) -> bool {
        self.typing.is_empty() && self.receipts.is_empty()
    }
}
