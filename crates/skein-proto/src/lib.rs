//! Skein Protocol Types
//!
//! Data model shared by every layer of the Skein client core: identifiers,
//! account parameters, sync deltas and the payloads they carry.
//!
//! # Design
//!
//! - Plain data: no I/O, no async, no interior mutability
//! - Serde everywhere: every payload round-trips through CBOR
//! - Explicit absence: optional fields are `Option`, never sentinel values

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod account;
pub mod codec;
pub mod ids;
pub mod payloads;

pub use account::AccountParams;
pub use codec::{ProtoError, decode_cbor, encode_cbor};
pub use ids::{EventId, LocalEchoId, RoomId, SessionId, UserId};
pub use payloads::{
    draft::UserDraft,
    ephemeral::{EphemeralPayload, Receipt},
    outbound::{MediaAttachment, OutboundEvent},
    space::{Membership, MembershipFilter, RoomKind, SpaceNode},
    sync::{RoomDelta, SyncDelta, SyncToken},
};
