//! Ephemeral sync buffer.
//!
//! An initial sync can carry thousands of typing and receipt events across
//! hundreds of rooms. Holding all of them in memory while the store ingests
//! the durable part of the response risks running out of memory, so the sync
//! loop stages each room's ephemeral section on disk first and streams them
//! back one room at a time after the store commit.
//!
//! # Layout
//!
//! One CBOR file per room, named by the lowercase hex SHA-256 of
//! `"{room_id}_"`. Hashing keeps names fixed-length and filesystem-safe
//! whatever characters the room id contains.
//!
//! # Failure model
//!
//! Ephemeral data is best effort. Reads of a missing, unreadable or corrupt
//! file return `None` and never an error. The whole directory may be wiped
//! between sessions; writes recreate it.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use sha2::{Digest, Sha256};
use skein_proto::{EphemeralPayload, ProtoError, RoomId, decode_cbor, encode_cbor};
use thiserror::Error;

/// Extension of a file still being written.
const PARTIAL_SUFFIX: &str = ".partial";

/// Errors from buffer writes and maintenance.
#[derive(Debug, Error)]
pub enum BufferError {
    /// Filesystem operation failed.
    #[error("buffer I/O error at {path}: {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// Payload could not be encoded.
    #[error("buffer encode error: {0}")]
    Encode(#[from] ProtoError),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> BufferError + '_ {
    move |source| BufferError::Io { path: path.to_path_buf(), source }
}

/// Disk-backed staging area for one session's ephemeral payloads.
#[derive(Debug, Clone)]
pub struct EphemeralBuffer {
    dir: PathBuf,
}

impl EphemeralBuffer {
    /// Open (creating if needed) a buffer rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, BufferError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(io_error(&dir))?;
        Ok(Self { dir })
    }

    /// Directory holding the staged files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name used for a room: 64 lowercase hex characters.
    pub fn file_name(room_id: &RoomId) -> String {
        let mut hasher = Sha256::new();
        hasher.update(room_id.as_str().as_bytes());
        hasher.update(b"_");
        hex::encode(hasher.finalize())
    }

    fn path_for(&self, room_id: &RoomId) -> PathBuf {
        self.dir.join(Self::file_name(room_id))
    }

    /// Stage a payload, replacing any previous one for the room.
    ///
    /// The payload is written to a sibling file and renamed into place, so a
    /// crash mid-write never leaves a truncated payload under the final name.
    pub fn write(&self, room_id: &RoomId, payload: &EphemeralPayload) -> Result<(), BufferError> {
        let bytes = encode_cbor(payload)?;
        fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;

        let path = self.path_for(room_id);
        let partial = self.dir.join(format!("{}{PARTIAL_SUFFIX}", Self::file_name(room_id)));
        fs::write(&partial, &bytes).map_err(io_error(&partial))?;
        fs::rename(&partial, &path).map_err(io_error(&path))?;

        tracing::trace!(room_id = %room_id, bytes = bytes.len(), "ephemeral payload staged");
        Ok(())
    }

    /// Read a staged payload.
    ///
    /// Returns `None` if nothing is staged or the file cannot be decoded.
    pub fn read(&self, room_id: &RoomId) -> Option<EphemeralPayload> {
        let path = self.path_for(room_id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(room_id = %room_id, error = %e, "unreadable ephemeral payload");
                return None;
            },
        };

        match decode_cbor(&bytes) {
            Ok(payload) => Some(payload),
            Err(e) => {
                tracing::warn!(room_id = %room_id, error = %e, "discarding corrupt ephemeral payload");
                None
            },
        }
    }

    /// Read a staged payload and remove it.
    ///
    /// This is how ingestion consumes the buffer: each payload is read at
    /// most once. A corrupt file is removed as well.
    pub fn take(&self, room_id: &RoomId) -> Option<EphemeralPayload> {
        let payload = self.read(room_id);
        if let Err(e) = self.delete(room_id) {
            tracing::warn!(room_id = %room_id, error = %e, "failed to remove consumed payload");
        }
        payload
    }

    /// Remove a room's payload. Removing an absent payload succeeds.
    pub fn delete(&self, room_id: &RoomId) -> Result<(), BufferError> {
        let path = self.path_for(room_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BufferError::Io { path, source: e }),
        }
    }

    /// Discard every staged payload and recreate an empty directory.
    pub fn reset(&self) -> Result<(), BufferError> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => {},
            Err(e) if e.kind() == io::ErrorKind::NotFound => {},
            Err(e) => return Err(BufferError::Io { path: self.dir.clone(), source: e }),
        }
        fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;

        tracing::debug!(dir = %self.dir.display(), "ephemeral buffer reset");
        Ok(())
    }

    /// Number of fully written payloads currently staged.
    pub fn pending_count(&self) -> Result<usize, BufferError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(BufferError::Io { path: self.dir.clone(), source: e }),
        };

        let mut count = 0;
        for entry in entries {
            let entry = entry.map_err(io_error(&self.dir))?;
            if !entry.file_name().to_string_lossy().ends_with(PARTIAL_SUFFIX) {
                count += 1;
            }
        }
        Ok(count)
    }
}
