//! Sync loop and delta ingestion.
//!
//! One loop per session long-polls the transport and ingests each delta:
//!
//! 1. Stage every room's ephemeral section in the [`EphemeralBuffer`] and
//!    drop it from memory
//! 2. Commit the durable part and the next token in one store transaction
//! 3. Read the staged sections back one room at a time and feed the
//!    [`TypingTracker`]
//!
//! Ingestion is blocking work and runs on the blocking pool. Stopping the
//! loop never interrupts an ingestion in progress; it only cancels the
//! pending long-poll or retry delay.
//!
//! # Invariants
//!
//! - The buffer holds nothing once a cycle ends, whether it succeeded or not
//! - The in-memory token only advances after the store committed it

use std::{sync::Arc, time::Duration};

use skein_core::{EphemeralBuffer, Environment, LocalStore, Transport, TypingTracker};
use skein_proto::{RoomId, SessionId, SyncDelta, SyncToken};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::ClientError;

/// Phase of a session's sync loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncState {
    /// Never started.
    #[default]
    Idle,
    /// Polling or ingesting.
    Syncing,
    /// Waiting out the retry delay after a failed cycle.
    Retrying {
        /// Consecutive failures so far.
        attempt: u32,
    },
    /// Stopped on request.
    Stopped,
    /// Stopped on an unrecoverable error.
    Failed,
}

/// Observable progress of a sync loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStatus {
    /// Current phase.
    pub state: SyncState,
    /// Cycles ingested since the context was created.
    pub cycles: u64,
    /// Last committed token.
    pub token: Option<SyncToken>,
    /// Most recent failure, cleared by the next successful cycle.
    pub last_error: Option<String>,
}

/// What one ingestion did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Room deltas in the response.
    pub rooms: usize,
    /// Ephemeral sections staged on disk.
    pub staged: usize,
    /// Rooms whose typing list changed.
    pub typing_changes: usize,
    /// Read receipts seen.
    pub receipts: usize,
}

/// Ingest one delta. Blocking.
pub fn ingest(
    store: &dyn LocalStore,
    buffer: &EphemeralBuffer,
    typing: &TypingTracker,
    mut delta: SyncDelta,
) -> Result<IngestReport, ClientError> {
    let mut staged: Vec<RoomId> = Vec::new();
    for room in &mut delta.rooms {
        if let Some(payload) = room.ephemeral.take() {
            if let Err(e) = buffer.write(&room.room_id, &payload) {
                discard_staged(buffer, &staged);
                return Err(e.into());
            }
            staged.push(room.room_id.clone());
        }
    }

    if let Err(e) = store.apply_delta(&delta) {
        discard_staged(buffer, &staged);
        return Err(e.into());
    }

    let mut report =
        IngestReport { rooms: delta.rooms.len(), staged: staged.len(), ..IngestReport::default() };
    for room_id in &staged {
        let Some(payload) = buffer.take(room_id) else { continue };
        report.receipts += payload.receipts.len();
        if typing.update(room_id, payload.typing) {
            report.typing_changes += 1;
        }
    }

    Ok(report)
}

fn discard_staged(buffer: &EphemeralBuffer, staged: &[RoomId]) {
    for room_id in staged {
        if let Err(e) = buffer.delete(room_id) {
            tracing::warn!(room_id = %room_id, error = %e, "failed to discard staged payload");
        }
    }
}

/// Handle to a running loop.
#[derive(Debug)]
pub(crate) struct SyncHandle {
    pub(crate) stop: CancellationToken,
    pub(crate) task: tokio::task::JoinHandle<()>,
}

impl SyncHandle {
    /// Cancel and wait for the loop to exit.
    pub(crate) async fn shutdown(self) {
        self.stop.cancel();
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "sync task ended abnormally");
        }
    }
}

pub(crate) struct SyncLoop<E: Environment> {
    pub(crate) session_id: SessionId,
    pub(crate) env: E,
    pub(crate) store: Arc<dyn LocalStore>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) buffer: EphemeralBuffer,
    pub(crate) typing: Arc<TypingTracker>,
    pub(crate) sync_timeout: Duration,
    pub(crate) retry_delay: Duration,
    pub(crate) status: watch::Sender<SyncStatus>,
}

impl<E: Environment> SyncLoop<E> {
    pub(crate) fn spawn(self) -> SyncHandle {
        let stop = CancellationToken::new();
        let task = tokio::spawn(self.run(stop.child_token()));
        SyncHandle { stop, task }
    }

    async fn run(self, stop: CancellationToken) {
        tracing::info!(session_id = %self.session_id, "sync loop started");
        self.set_state(SyncState::Syncing);

        let mut token = match self.store.sync_token() {
            Ok(token) => token,
            Err(e) => {
                tracing::error!(session_id = %self.session_id, error = %e, "cannot read sync token");
                self.fail(&e.into());
                return;
            },
        };
        let mut attempt: u32 = 0;

        let final_state = loop {
            let polled = tokio::select! {
                () = stop.cancelled() => break SyncState::Stopped,
                polled = self.transport.sync(token.as_ref(), self.sync_timeout) => polled,
            };

            let outcome = match polled {
                Ok(delta) => self.ingest(delta).await,
                Err(e) => Err(e.into()),
            };

            match outcome {
                Ok((next, report)) => {
                    attempt = 0;
                    tracing::debug!(
                        session_id = %self.session_id,
                        token = %next,
                        rooms = report.rooms,
                        staged = report.staged,
                        typing_changes = report.typing_changes,
                        "sync cycle ingested"
                    );
                    token = Some(next.clone());
                    self.status.send_modify(|s| {
                        s.state = SyncState::Syncing;
                        s.cycles += 1;
                        s.token = Some(next);
                        s.last_error = None;
                    });
                },
                Err(e) if e.is_fatal() => {
                    tracing::error!(session_id = %self.session_id, error = %e, "sync loop failed");
                    self.fail(&e);
                    return;
                },
                Err(e) => {
                    attempt = attempt.saturating_add(1);
                    tracing::warn!(
                        session_id = %self.session_id,
                        attempt,
                        delay_ms = u64::try_from(self.retry_delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "sync cycle failed, retrying"
                    );
                    self.status.send_modify(|s| {
                        s.state = SyncState::Retrying { attempt };
                        s.last_error = Some(e.to_string());
                    });

                    tokio::select! {
                        () = stop.cancelled() => break SyncState::Stopped,
                        () = self.env.sleep(self.retry_delay) => {},
                    }
                    self.set_state(SyncState::Syncing);
                },
            }
        };

        self.set_state(final_state);
        tracing::info!(session_id = %self.session_id, "sync loop stopped");
    }

    async fn ingest(&self, delta: SyncDelta) -> Result<(SyncToken, IngestReport), ClientError> {
        let next = delta.next_token.clone();
        let store = Arc::clone(&self.store);
        let buffer = self.buffer.clone();
        let typing = Arc::clone(&self.typing);

        let report =
            tokio::task::spawn_blocking(move || ingest(store.as_ref(), &buffer, &typing, delta))
                .await??;
        Ok((next, report))
    }

    fn set_state(&self, state: SyncState) {
        self.status.send_modify(|s| s.state = state);
    }

    fn fail(&self, error: &ClientError) {
        self.status.send_modify(|s| {
            s.state = SyncState::Failed;
            s.last_error = Some(error.to_string());
        });
    }
}
