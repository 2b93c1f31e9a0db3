//! Payload types carried by sync deltas and persisted by the client.

pub mod draft;
pub mod ephemeral;
pub mod outbound;
pub mod space;
pub mod sync;
