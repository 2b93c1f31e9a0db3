//! Scripted transport.
//!
//! Tests push sync responses and configure send behaviour; the transport
//! records every request it receives.

use std::{collections::VecDeque, sync::Mutex, time::Duration};

use async_trait::async_trait;
use skein_core::{Transport, TransportError, lock_unpoisoned};
use skein_proto::{EventId, LocalEchoId, MediaAttachment, OutboundEvent, RoomId, SyncDelta, SyncToken};
use tokio::sync::{Notify, watch};

#[derive(Default)]
struct Script {
    responses: VecDeque<Result<SyncDelta, TransportError>>,
    sync_requests: Vec<Option<SyncToken>>,
    uploads: Vec<(RoomId, String)>,
    upload_attempts: usize,
    sent: Vec<LocalEchoId>,
    send_failure: Option<TransportError>,
}

/// In-memory [`Transport`] driven by a test script.
///
/// `sync` pops the next scripted response. With nothing scripted it waits
/// for one until the request timeout elapses, then answers with an empty
/// delta that keeps the current token, like a server with nothing new.
pub struct MockTransport {
    script: Mutex<Script>,
    pushed: Notify,
    uploads_blocked: watch::Sender<bool>,
}

impl MockTransport {
    /// Transport with an empty script.
    pub fn new() -> Self {
        let (uploads_blocked, _) = watch::channel(false);
        Self { script: Mutex::new(Script::default()), pushed: Notify::new(), uploads_blocked }
    }

    /// Script a successful sync response.
    pub fn push_delta(&self, delta: SyncDelta) {
        lock_unpoisoned(&self.script).responses.push_back(Ok(delta));
        self.pushed.notify_one();
    }

    /// Script a failed sync request.
    pub fn push_error(&self, error: TransportError) {
        lock_unpoisoned(&self.script).responses.push_back(Err(error));
        self.pushed.notify_one();
    }

    /// Scripted responses not yet consumed.
    pub fn pending_responses(&self) -> usize {
        lock_unpoisoned(&self.script).responses.len()
    }

    /// `since` token of every sync request so far.
    pub fn sync_requests(&self) -> Vec<Option<SyncToken>> {
        lock_unpoisoned(&self.script).sync_requests.clone()
    }

    /// `(room, file name)` of every media upload so far.
    pub fn uploads(&self) -> Vec<(RoomId, String)> {
        lock_unpoisoned(&self.script).uploads.clone()
    }

    /// Uploads started, including ones still held.
    pub fn upload_attempts(&self) -> usize {
        lock_unpoisoned(&self.script).upload_attempts
    }

    /// Local echo ids of every dispatched event, in order.
    pub fn sent(&self) -> Vec<LocalEchoId> {
        lock_unpoisoned(&self.script).sent.clone()
    }

    /// Make every `send_event` fail with `error` until cleared with `None`.
    pub fn fail_sends(&self, error: Option<TransportError>) {
        lock_unpoisoned(&self.script).send_failure = error;
    }

    /// Hold media uploads until [`Self::release_uploads`].
    pub fn block_uploads(&self) {
        self.uploads_blocked.send_replace(true);
    }

    /// Let held uploads proceed.
    pub fn release_uploads(&self) {
        self.uploads_blocked.send_replace(false);
    }

    fn next_response(&self) -> Option<Result<SyncDelta, TransportError>> {
        lock_unpoisoned(&self.script).responses.pop_front()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn sync(
        &self,
        since: Option<&SyncToken>,
        timeout: Duration,
    ) -> Result<SyncDelta, TransportError> {
        lock_unpoisoned(&self.script).sync_requests.push(since.cloned());

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let pushed = self.pushed.notified();
            if let Some(response) = self.next_response() {
                return response;
            }
            if tokio::time::timeout_at(deadline, pushed).await.is_err() {
                let token = since.cloned().unwrap_or_else(|| SyncToken::new("s0"));
                return Ok(SyncDelta::new(token, Vec::new()));
            }
        }
    }

    async fn upload_media(
        &self,
        room_id: &RoomId,
        attachment: &MediaAttachment,
    ) -> Result<String, TransportError> {
        lock_unpoisoned(&self.script).upload_attempts += 1;
        let mut blocked = self.uploads_blocked.subscribe();
        if blocked.wait_for(|held| !held).await.is_err() {
            return Err(TransportError::Closed);
        }

        let mut script = lock_unpoisoned(&self.script);
        script.uploads.push((room_id.clone(), attachment.name.clone()));
        Ok(format!("mxc://mock/{}", script.uploads.len()))
    }

    async fn send_event(
        &self,
        event: &OutboundEvent,
        _media_uri: Option<&str>,
    ) -> Result<EventId, TransportError> {
        let mut script = lock_unpoisoned(&self.script);
        if let Some(error) = &script.send_failure {
            return Err(error.clone());
        }
        script.sent.push(event.local_echo_id.clone());
        Ok(EventId::new(format!("$sent{}", script.sent.len())))
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let script = lock_unpoisoned(&self.script);
        f.debug_struct("MockTransport")
            .field("pending_responses", &script.responses.len())
            .field("sync_requests", &script.sync_requests.len())
            .field("sent", &script.sent.len())
            .finish()
    }
}
