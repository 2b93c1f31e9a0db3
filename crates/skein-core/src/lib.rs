//! Skein Core
//!
//! Session-scoped building blocks of the Skein client: the reactive bridge,
//! the local store and transport seams, the ephemeral sync buffer, the space
//! hierarchy resolver and the small trackers the sync loop and outbox feed.
//!
//! # Architecture
//!
//! Nothing here owns a session. The client crate assembles one
//! [`LocalStore`], one [`Transport`] and one [`EphemeralBuffer`] per session
//! and wires them into its sync loop and outbox. Everything in this crate is
//! therefore usable on its own in tests with [`MemoryStore`] and a scripted
//! transport.
//!
//! # Threading
//!
//! - Store writes and live-source notifications happen on the ingestion
//!   thread
//! - The bridge moves every notification onto the subscriber's task
//! - Trackers are plain `Mutex`-guarded state safe to share across threads

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod bridge;
pub mod cancel;
pub mod env;
pub mod ephemeral;
pub mod live;
pub mod ordering;
pub mod space;
pub mod store;
pub mod transport;
pub mod typing;

pub use bridge::{BridgeError, DisposeHandle, Subscription, observe, observe_or};
pub use cancel::{CancellationTracker, PendingCancellation};
pub use env::Environment;
pub use ephemeral::{BufferError, EphemeralBuffer};
pub use live::{LiveCell, LiveSource, Observer, ObserverId, lock_unpoisoned};
pub use ordering::{compare_space_order, sort_spaces};
pub use space::{
    HierarchySnapshot, SpaceHierarchy, flatten_dependencies, flatten_rooms, flatten_spaces,
    top_level_spaces,
};
pub use store::{LocalStore, MemoryStore, StoreError};
pub use transport::{Transport, TransportError};
pub use typing::{TypingTracker, TypingUpdate};
