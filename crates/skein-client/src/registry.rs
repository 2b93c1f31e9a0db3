//! Session registry.
//!
//! Maps session ids to live contexts. All lifecycle operations serialize on
//! one async mutex over the map, so concurrent `get_or_create` calls for the
//! same account produce exactly one context, and a `release` completes its
//! teardown before anyone can create a replacement.
//!
//! # Invariants
//!
//! - At most one live context per session id
//! - A released session is gone: its context is closed and its stored
//!   credentials removed. It comes back only through `get_or_create`
//! - A stopped session keeps its context and credentials; only sync halts

use std::{collections::HashMap, sync::Arc};

use skein_core::Environment;
use skein_proto::{AccountParams, SessionId};
use tokio::sync::Mutex;

use crate::{
    backend::SessionBackend, config::RegistryConfig, context::SessionContext,
    credentials::CredentialStore, error::ClientError,
};

type Sessions<E> = HashMap<SessionId, Arc<SessionContext<E>>>;

/// Owner of every live session context.
pub struct SessionRegistry<E: Environment> {
    env: E,
    config: RegistryConfig,
    backend: Arc<dyn SessionBackend>,
    credentials: Arc<dyn CredentialStore>,
    sessions: Mutex<Sessions<E>>,
}

impl<E: Environment> SessionRegistry<E> {
    /// Create an empty registry.
    pub fn new(
        env: E,
        config: RegistryConfig,
        backend: Arc<dyn SessionBackend>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self { env, config, backend, credentials, sessions: Mutex::new(HashMap::new()) }
    }

    /// Return the context for `params`, creating it if none exists.
    ///
    /// Once a context exists the params are recorded in the credential store,
    /// so a refreshed access token is picked up by the next context created
    /// from storage. A failed open stores nothing.
    pub async fn get_or_create(
        &self,
        params: &AccountParams,
    ) -> Result<Arc<SessionContext<E>>, ClientError> {
        let mut sessions = self.sessions.lock().await;
        let session_id = params.session_id();
        let existed = sessions.contains_key(&session_id);
        let context = self.get_or_create_locked(&mut sessions, params.clone()).await?;

        if let Err(e) = self.credentials.save(params) {
            if !existed {
                sessions.remove(&session_id);
                context.close().await;
            }
            return Err(e);
        }
        Ok(context)
    }

    /// Return the context for a session with stored credentials.
    ///
    /// `Ok(None)` if nothing is stored for `session_id`.
    pub async fn get(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<Arc<SessionContext<E>>>, ClientError> {
        let mut sessions = self.sessions.lock().await;
        if let Some(context) = sessions.get(session_id) {
            return Ok(Some(Arc::clone(context)));
        }

        let Some(params) = self.credentials.load(session_id)? else {
            return Ok(None);
        };
        self.get_or_create_locked(&mut sessions, params).await.map(Some)
    }

    async fn get_or_create_locked(
        &self,
        sessions: &mut Sessions<E>,
        params: AccountParams,
    ) -> Result<Arc<SessionContext<E>>, ClientError> {
        let session_id = params.session_id();
        if let Some(context) = sessions.get(&session_id) {
            return Ok(Arc::clone(context));
        }

        let context = Arc::new(
            SessionContext::open(
                params,
                self.config.session.clone(),
                self.env.clone(),
                self.backend.as_ref(),
            )
            .await?,
        );
        if self.config.session.auto_start_sync {
            context.start_sync().await?;
        }

        sessions.insert(session_id.clone(), Arc::clone(&context));
        tracing::info!(session_id = %session_id, sessions = sessions.len(), "session created");
        Ok(context)
    }

    /// Tear down a session and forget its credentials.
    pub async fn release(&self, session_id: &SessionId) -> Result<(), ClientError> {
        let mut sessions = self.sessions.lock().await;
        let context = sessions
            .remove(session_id)
            .ok_or_else(|| ClientError::UnknownSession { session_id: session_id.clone() })?;

        context.close().await;
        self.credentials.remove(session_id)?;

        tracing::info!(session_id = %session_id, sessions = sessions.len(), "session released");
        Ok(())
    }

    /// Halt a session's sync loop, keeping the context.
    pub async fn stop(&self, session_id: &SessionId) -> Result<(), ClientError> {
        let sessions = self.sessions.lock().await;
        let context = registered(&sessions, session_id)?;
        context.stop_sync().await;
        Ok(())
    }

    /// Restart a session's sync loop. Returns `false` if it was running.
    pub async fn start(&self, session_id: &SessionId) -> Result<bool, ClientError> {
        let sessions = self.sessions.lock().await;
        registered(&sessions, session_id)?.start_sync().await
    }

    /// Ids of live sessions, sorted.
    pub async fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.sessions.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Close every context, keeping stored credentials. Used at shutdown.
    pub async fn close_all(&self) {
        let mut sessions = self.sessions.lock().await;
        for (_, context) in sessions.drain() {
            context.close().await;
        }
    }
}

fn registered<'a, E: Environment>(
    sessions: &'a Sessions<E>,
    session_id: &SessionId,
) -> Result<&'a Arc<SessionContext<E>>, ClientError> {
    sessions.get(session_id).ok_or_else(|| ClientError::UnknownSession { session_id: session_id.clone() })
}

impl<E: Environment> std::fmt::Debug for SessionRegistry<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry").field("config", &self.config).finish_non_exhaustive()
    }
}
