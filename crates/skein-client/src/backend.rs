//! Session backend seam.
//!
//! Applications plug their database and HTTP layer in here. The registry
//! calls [`SessionBackend::open`] once per context it creates.

use std::sync::Arc;

use async_trait::async_trait;
use skein_core::{LocalStore, Transport};
use skein_proto::AccountParams;

use crate::{config::SessionConfig, error::ClientError};

/// Collaborators owned by one session.
pub struct SessionParts {
    /// Materialized local state.
    pub store: Arc<dyn LocalStore>,
    /// Connection to the account's homeserver.
    pub transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for SessionParts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionParts").field("store_closed", &self.store.is_closed()).finish_non_exhaustive()
    }
}

/// Opens the store and transport for an account.
#[async_trait]
pub trait SessionBackend: Send + Sync + 'static {
    /// Open collaborators for `params`. `config.session_dir` is reserved for
    /// the session and may be used for on-disk state.
    async fn open(
        &self,
        params: &AccountParams,
        config: &SessionConfig,
    ) -> Result<SessionParts, ClientError>;
}
