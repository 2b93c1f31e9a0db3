//! Skein client session layer.
//!
//! Assembles the building blocks from `skein-core` into per-account session
//! contexts and manages their lifecycle.
//!
//! ## Architecture
//!
//! ```text
//! skein-client
//!   ├─ SessionRegistry     (session id → context, serialized lifecycle)
//!   ├─ SessionContext      (everything scoped to one account)
//!   │   ├─ SyncLoop        (long-poll, stage, commit, drain)
//!   │   ├─ Outbox          (ordered sends with cancellation checkpoints)
//!   │   └─ DraftRepository (per-room draft stacks)
//!   ├─ CredentialStore     (stored account params)
//!   ├─ SessionBackend      (opens store + transport)
//!   └─ SystemEnv           (production Environment impl)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod config;
pub mod context;
pub mod credentials;
pub mod drafts;
pub mod error;
pub mod outbox;
pub mod registry;
pub mod sync;
mod system_env;

pub use backend::{SessionBackend, SessionParts};
pub use config::{RegistryConfig, SessionConfig};
pub use context::SessionContext;
pub use credentials::{CredentialStore, FileCredentials, MemoryCredentials};
pub use drafts::{DraftRepository, DraftService, DraftServiceFactory};
pub use error::ClientError;
pub use outbox::{Outbox, OutboxResult, SendOutcome, SendWorker};
pub use registry::SessionRegistry;
pub use sync::{IngestReport, SyncState, SyncStatus, ingest};
pub use system_env::SystemEnv;
