//! Sync cursor and delta types.

use serde::{Deserialize, Serialize};

use super::{ephemeral::EphemeralPayload, space::SpaceNode};
use crate::ids::RoomId;

/// Opaque cursor: everything up to here has been ingested.
///
/// Only the server can mint one. The client stores it next to the data it
/// gates and hands it back on the next request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncToken(String);

impl SyncToken {
    /// Wrap a server-issued token.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrow the raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SyncToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Changes to one room in a sync response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomDelta {
    /// Room the changes apply to.
    pub room_id: RoomId,
    /// New materialized node state, if the room's durable state changed.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub node: Option<SpaceNode>,
    /// Ephemeral section, if any.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ephemeral: Option<EphemeralPayload>,
}

impl RoomDelta {
    /// Delta carrying only a node update.
    pub fn node(node: SpaceNode) -> Self {
        Self { room_id: node.id.clone(), node: Some(node), ephemeral: None }
    }

    /// Delta carrying only an ephemeral section.
    pub fn ephemeral(room_id: impl Into<RoomId>, payload: EphemeralPayload) -> Self {
        Self { room_id: room_id.into(), node: None, ephemeral: Some(payload) }
    }
}

/// One incremental sync response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncDelta {
    /// Cursor to resume from once this delta is ingested.
    pub next_token: SyncToken,
    /// Per-room changes.
    #[serde(default)]
    pub rooms: Vec<RoomDelta>,
}

impl SyncDelta {
    /// Create a delta.
    pub fn new(next_token: SyncToken, rooms: Vec<RoomDelta>) -> Self {
        Self { next_token, rooms }
    }
}
