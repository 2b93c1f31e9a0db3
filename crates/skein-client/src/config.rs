//! Session and registry configuration.

use std::{path::PathBuf, time::Duration};

use skein_proto::SessionId;

/// Per-session configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Root directory for per-session data (`<data_dir>/<session_id>/`).
    pub data_dir: PathBuf,
    /// Long-poll timeout passed to the transport on each sync request.
    pub sync_timeout: Duration,
    /// Delay before retrying a failed sync cycle.
    pub retry_delay: Duration,
    /// Start the sync loop as soon as the context is created.
    pub auto_start_sync: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("skein-data"),
            sync_timeout: Duration::from_secs(30),
            retry_delay: Duration::from_secs(2),
            auto_start_sync: true,
        }
    }
}

impl SessionConfig {
    /// Set the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    /// Set the long-poll timeout.
    #[must_use]
    pub fn with_sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = timeout;
        self
    }

    /// Set the retry delay.
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Enable or disable starting sync on creation.
    #[must_use]
    pub fn with_auto_start_sync(mut self, enabled: bool) -> Self {
        self.auto_start_sync = enabled;
        self
    }

    /// Directory owned by one session.
    pub fn session_dir(&self, session_id: &SessionId) -> PathBuf {
        self.data_dir.join(session_id.as_str())
    }

    /// Ephemeral buffer directory of one session.
    pub fn ephemeral_dir(&self, session_id: &SessionId) -> PathBuf {
        self.session_dir(session_id).join("ephemeral")
    }
}

/// Registry configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Applied to every session the registry creates.
    pub session: SessionConfig,
}

impl RegistryConfig {
    /// Wrap a session configuration.
    pub fn new(session: SessionConfig) -> Self {
        Self { session }
    }
}
