//! Backend handing out in-memory stores and scripted transports.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use skein_client::{ClientError, SessionBackend, SessionConfig, SessionParts};
use skein_core::{MemoryStore, lock_unpoisoned};
use skein_proto::{AccountParams, SessionId};

/// [`SessionBackend`] for tests.
///
/// Each session id gets one [`MockTransport`](crate::MockTransport) for the
/// lifetime of the backend, so a test can script it before or after the
/// context exists. Every `open` creates a fresh [`MemoryStore`].
#[derive(Default)]
pub struct MockBackend {
    transports: Mutex<HashMap<SessionId, Arc<crate::MockTransport>>>,
    stores: Mutex<HashMap<SessionId, Vec<Arc<MemoryStore>>>>,
    opens: AtomicUsize,
    fail_opens: AtomicBool,
}

impl MockBackend {
    /// Create a backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport used by a session, created on first access.
    pub fn transport(&self, session_id: &SessionId) -> Arc<crate::MockTransport> {
        Arc::clone(lock_unpoisoned(&self.transports).entry(session_id.clone()).or_default())
    }

    /// Most recently opened store of a session.
    pub fn latest_store(&self, session_id: &SessionId) -> Option<Arc<MemoryStore>> {
        lock_unpoisoned(&self.stores).get(session_id).and_then(|s| s.last().cloned())
    }

    /// Every store ever opened for a session, oldest first.
    pub fn stores(&self, session_id: &SessionId) -> Vec<Arc<MemoryStore>> {
        lock_unpoisoned(&self.stores).get(session_id).cloned().unwrap_or_default()
    }

    /// Total `open` calls.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Make subsequent opens fail.
    pub fn fail_opens(&self, fail: bool) {
        self.fail_opens.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SessionBackend for MockBackend {
    async fn open(
        &self,
        params: &AccountParams,
        _config: &SessionConfig,
    ) -> Result<SessionParts, ClientError> {
        if self.fail_opens.load(Ordering::SeqCst) {
            return Err(ClientError::Backend { reason: "open refused".to_string() });
        }
        self.opens.fetch_add(1, Ordering::SeqCst);

        let session_id = params.session_id();
        let store = Arc::new(MemoryStore::new());
        lock_unpoisoned(&self.stores).entry(session_id.clone()).or_default().push(Arc::clone(&store));

        Ok(SessionParts { store, transport: self.transport(&session_id) })
    }
}

impl std::fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBackend").field("opens", &self.open_count()).finish_non_exhaustive()
    }
}
