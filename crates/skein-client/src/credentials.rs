//! Stored account credentials.
//!
//! The registry records the params of every session it creates so that a
//! later `get(session_id)` can recreate the context without the caller
//! supplying them again. Releasing a session removes its entry.
//!
//! # Security
//!
//! [`FileCredentials`] writes the access token to disk unencrypted. Platforms
//! with a keychain should provide their own [`CredentialStore`].

use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
    sync::Mutex,
};

use skein_core::lock_unpoisoned;
use skein_proto::{AccountParams, SessionId, decode_cbor, encode_cbor};

use crate::error::ClientError;

/// File name of the stored params inside a session directory.
const ACCOUNT_FILE: &str = "account.cbor";

/// Persistent map from session id to account params.
pub trait CredentialStore: Send + Sync + 'static {
    /// Store params under their derived session id, replacing any previous
    /// entry.
    fn save(&self, params: &AccountParams) -> Result<(), ClientError>;

    /// Params stored for a session, if any.
    fn load(&self, session_id: &SessionId) -> Result<Option<AccountParams>, ClientError>;

    /// Forget a session. Removing an absent entry succeeds.
    fn remove(&self, session_id: &SessionId) -> Result<(), ClientError>;

    /// Every session with stored params.
    fn session_ids(&self) -> Result<Vec<SessionId>, ClientError>;
}

/// In-memory credential store.
#[derive(Debug, Default)]
pub struct MemoryCredentials {
    entries: Mutex<HashMap<SessionId, AccountParams>>,
}

impl MemoryCredentials {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentials {
    fn save(&self, params: &AccountParams) -> Result<(), ClientError> {
        lock_unpoisoned(&self.entries).insert(params.session_id(), params.clone());
        Ok(())
    }

    fn load(&self, session_id: &SessionId) -> Result<Option<AccountParams>, ClientError> {
        Ok(lock_unpoisoned(&self.entries).get(session_id).cloned())
    }

    fn remove(&self, session_id: &SessionId) -> Result<(), ClientError> {
        lock_unpoisoned(&self.entries).remove(session_id);
        Ok(())
    }

    fn session_ids(&self) -> Result<Vec<SessionId>, ClientError> {
        let mut ids: Vec<_> = lock_unpoisoned(&self.entries).keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

/// Credential store keeping one CBOR file per session under the data
/// directory: `<data_dir>/<session_id>/account.cbor`.
#[derive(Debug, Clone)]
pub struct FileCredentials {
    data_dir: PathBuf,
}

impl FileCredentials {
    /// Store rooted at `data_dir`. Nothing is created until the first save.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into() }
    }

    fn path_for(&self, session_id: &SessionId) -> PathBuf {
        self.data_dir.join(session_id.as_str()).join(ACCOUNT_FILE)
    }
}

fn io_failure(path: &Path, err: &io::Error) -> ClientError {
    ClientError::Credentials { reason: format!("{}: {err}", path.display()) }
}

impl CredentialStore for FileCredentials {
    fn save(&self, params: &AccountParams) -> Result<(), ClientError> {
        let path = self.path_for(&params.session_id());
        let dir = path.parent().unwrap_or(&self.data_dir);
        fs::create_dir_all(dir).map_err(|e| io_failure(dir, &e))?;

        let bytes = encode_cbor(params)?;
        let partial = path.with_extension("cbor.partial");
        fs::write(&partial, bytes).map_err(|e| io_failure(&partial, &e))?;
        fs::rename(&partial, &path).map_err(|e| io_failure(&path, &e))?;
        Ok(())
    }

    fn load(&self, session_id: &SessionId) -> Result<Option<AccountParams>, ClientError> {
        let path = self.path_for(session_id);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(decode_cbor(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_failure(&path, &e)),
        }
    }

    fn remove(&self, session_id: &SessionId) -> Result<(), ClientError> {
        let path = self.path_for(session_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_failure(&path, &e)),
        }
    }

    fn session_ids(&self) -> Result<Vec<SessionId>, ClientError> {
        let entries = match fs::read_dir(&self.data_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_failure(&self.data_dir, &e)),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_failure(&self.data_dir, &e))?;
            if entry.path().join(ACCOUNT_FILE).is_file() {
                ids.push(SessionId::new(entry.file_name().to_string_lossy().into_owned()));
            }
        }
        ids.sort();
        Ok(ids)
    }
}
