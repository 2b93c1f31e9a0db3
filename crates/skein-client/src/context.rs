//! Per-session context.
//!
//! A [`SessionContext`] owns everything scoped to one signed-in account: the
//! store and transport from the backend, the ephemeral buffer, the sync loop,
//! the outbox, and the typing, cancellation and draft state. Contexts are
//! created and torn down only by the registry.
//!
//! # Teardown
//!
//! Closing cascades through every owned component in dependency order: the
//! sync loop is cancelled and joined, the outbox worker stopped, the store
//! closed, the buffer wiped and in-memory trackers cleared. Holders of a
//! stale `Arc<SessionContext>` keep a valid object whose operations fail with
//! [`ClientError::SessionClosed`] or [`skein_core::StoreError::Closed`].

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use skein_core::{
    CancellationTracker, EphemeralBuffer, Environment, LocalStore, SpaceHierarchy, Transport,
    TypingTracker, space,
};
use skein_proto::{AccountParams, MembershipFilter, RoomId, SessionId, SpaceNode, UserId};
use tokio::sync::{Mutex, watch};

use crate::{
    backend::{SessionBackend, SessionParts},
    config::SessionConfig,
    drafts::{DraftRepository, DraftServiceFactory},
    error::ClientError,
    outbox::Outbox,
    sync::{SyncHandle, SyncLoop, SyncStatus},
};

/// Everything owned by one session.
pub struct SessionContext<E: Environment> {
    session_id: SessionId,
    params: AccountParams,
    config: SessionConfig,
    env: E,
    store: Arc<dyn LocalStore>,
    transport: Arc<dyn Transport>,
    buffer: EphemeralBuffer,
    typing: Arc<TypingTracker>,
    cancellations: Arc<CancellationTracker>,
    drafts: Arc<DraftRepository>,
    outbox: Outbox<E>,
    sync: Mutex<Option<SyncHandle>>,
    status: watch::Sender<SyncStatus>,
    closed: AtomicBool,
}

impl<E: Environment> SessionContext<E> {
    pub(crate) async fn open(
        params: AccountParams,
        config: SessionConfig,
        env: E,
        backend: &dyn SessionBackend,
    ) -> Result<Self, ClientError> {
        let session_id = params.session_id();
        let SessionParts { store, transport } = backend.open(&params, &config).await?;

        let buffer = match open_buffer(&config, &session_id).await {
            Ok(buffer) => buffer,
            Err(e) => {
                store.close();
                return Err(e);
            },
        };

        let cancellations = Arc::new(CancellationTracker::new());
        let outbox = Outbox::spawn(
            session_id.clone(),
            env.clone(),
            Arc::clone(&transport),
            Arc::clone(&cancellations),
        );
        let (status, _) = watch::channel(SyncStatus::default());

        tracing::info!(session_id = %session_id, user_id = %params.user_id, "session context opened");

        Ok(Self {
            session_id,
            params,
            config,
            env,
            store,
            transport,
            buffer,
            typing: Arc::new(TypingTracker::new()),
            cancellations,
            drafts: Arc::new(DraftRepository::new()),
            outbox,
            sync: Mutex::new(None),
            status,
            closed: AtomicBool::new(false),
        })
    }

    /// Session id.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Account owner.
    pub fn user_id(&self) -> &UserId {
        &self.params.user_id
    }

    /// Params the context was created from.
    pub fn params(&self) -> &AccountParams {
        &self.params
    }

    /// Configuration the context was created with.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Local store.
    pub fn store(&self) -> &Arc<dyn LocalStore> {
        &self.store
    }

    /// Ephemeral staging buffer.
    pub fn ephemeral_buffer(&self) -> &EphemeralBuffer {
        &self.buffer
    }

    /// Typing state fed by the sync loop.
    pub fn typing(&self) -> &Arc<TypingTracker> {
        &self.typing
    }

    /// Pending send cancellations.
    pub fn cancellations(&self) -> &Arc<CancellationTracker> {
        &self.cancellations
    }

    /// Outbound send queue.
    pub fn outbox(&self) -> &Outbox<E> {
        &self.outbox
    }

    /// Factory for room-scoped draft services.
    pub fn draft_services(&self) -> DraftServiceFactory {
        DraftServiceFactory::new(Arc::clone(&self.drafts))
    }

    /// Start resolving the rooms below `root`.
    pub fn space_hierarchy(
        &self,
        root: RoomId,
        accepted: MembershipFilter,
    ) -> Result<SpaceHierarchy, ClientError> {
        self.ensure_open()?;
        Ok(SpaceHierarchy::spawn(Arc::clone(&self.store), root, accepted))
    }

    /// Joined spaces not nested in another joined space, in display order.
    pub fn top_level_spaces(&self) -> Result<Vec<SpaceNode>, ClientError> {
        Ok(space::top_level_spaces(self.store.as_ref())?)
    }

    /// Progress of the sync loop.
    pub fn sync_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Start the sync loop. Returns `false` if it was already running.
    pub async fn start_sync(&self) -> Result<bool, ClientError> {
        self.ensure_open()?;
        let mut sync = self.sync.lock().await;
        if sync.as_ref().is_some_and(|h| !h.task.is_finished()) {
            return Ok(false);
        }

        let sync_loop = SyncLoop {
            session_id: self.session_id.clone(),
            env: self.env.clone(),
            store: Arc::clone(&self.store),
            transport: Arc::clone(&self.transport),
            buffer: self.buffer.clone(),
            typing: Arc::clone(&self.typing),
            sync_timeout: self.config.sync_timeout,
            retry_delay: self.config.retry_delay,
            status: self.status.clone(),
        };
        *sync = Some(sync_loop.spawn());
        Ok(true)
    }

    /// Stop the sync loop and wait for it to exit. Returns `false` if it was
    /// not running.
    pub async fn stop_sync(&self) -> bool {
        let handle = self.sync.lock().await.take();
        match handle {
            Some(handle) => {
                let was_running = !handle.task.is_finished();
                handle.shutdown().await;
                tracing::debug!(session_id = %self.session_id, "sync stopped");
                was_running
            },
            None => false,
        }
    }

    /// Whether the sync loop task is alive.
    pub async fn is_syncing(&self) -> bool {
        self.sync.lock().await.as_ref().is_some_and(|h| !h.task.is_finished())
    }

    /// Whether the context has been torn down.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<(), ClientError> {
        if self.is_closed() {
            return Err(ClientError::SessionClosed { session_id: self.session_id.clone() });
        }
        Ok(())
    }

    /// Tear down every owned component. Idempotent.
    pub(crate) async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.stop_sync().await;
        self.outbox.shutdown().await;
        self.store.close();

        let buffer = self.buffer.clone();
        match tokio::task::spawn_blocking(move || buffer.reset()).await {
            Ok(Ok(())) => {},
            Ok(Err(e)) => tracing::warn!(session_id = %self.session_id, error = %e, "buffer wipe failed"),
            Err(e) => tracing::warn!(session_id = %self.session_id, error = %e, "buffer wipe task failed"),
        }

        self.typing.clear();
        self.drafts.clear();
        tracing::info!(session_id = %self.session_id, "session context closed");
    }
}

async fn open_buffer(config: &SessionConfig, session_id: &SessionId) -> Result<EphemeralBuffer, ClientError> {
    let dir = config.ephemeral_dir(session_id);
    let buffer = tokio::task::spawn_blocking(move || {
        let buffer = EphemeralBuffer::open(dir)?;
        // Leftovers belong to a cycle that never finished.
        buffer.reset()?;
        Ok::<_, ClientError>(buffer)
    })
    .await??;
    Ok(buffer)
}

impl<E: Environment> std::fmt::Debug for SessionContext<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("session_id", &self.session_id)
            .field("user_id", &self.params.user_id)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
