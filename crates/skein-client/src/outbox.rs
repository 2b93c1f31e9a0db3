//! Outbound send queue with cooperative cancellation.
//!
//! Sends for a session run strictly in enqueue order on one worker task.
//! Removing an item from the middle of that queue is not possible, so a
//! user's cancel goes through the [`CancellationTracker`] instead and the
//! worker checks it at two points:
//!
//! 1. Before uploading media
//! 2. Before dispatching the event
//!
//! A cancellation seen at either point ends the send as
//! [`SendOutcome::Cancelled`]. That is a successful outcome: the send is not
//! retried and no error is reported. A cancel that arrives after dispatch
//! has no effect on the server.

use std::sync::Arc;

use skein_core::{CancellationTracker, Environment, Transport};
use skein_proto::{EventId, LocalEchoId, MediaAttachment, OutboundEvent, RoomId, SessionId};
use tokio::{
    sync::{Mutex, broadcast, mpsc},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::error::ClientError;

/// Capacity of the result channel.
const RESULT_CAPACITY: usize = 256;

/// How a send ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Server accepted the event.
    Sent {
        /// Server-assigned event id.
        event_id: EventId,
    },
    /// User cancelled before dispatch.
    Cancelled,
}

/// Executes one send with cancellation checkpoints.
#[derive(Clone)]
pub struct SendWorker {
    transport: Arc<dyn Transport>,
    cancellations: Arc<CancellationTracker>,
}

impl SendWorker {
    /// Worker over a transport and the session's tracker.
    pub fn new(transport: Arc<dyn Transport>, cancellations: Arc<CancellationTracker>) -> Self {
        Self { transport, cancellations }
    }

    /// Run a send to completion or cancellation.
    pub async fn execute(&self, event: &OutboundEvent) -> Result<SendOutcome, ClientError> {
        if self.honour_cancel(event) {
            return Ok(SendOutcome::Cancelled);
        }

        let media_uri = match &event.attachment {
            Some(attachment) => {
                Some(self.transport.upload_media(&event.room_id, attachment).await?)
            },
            None => None,
        };

        if self.honour_cancel(event) {
            return Ok(SendOutcome::Cancelled);
        }

        let event_id = self.transport.send_event(event, media_uri.as_deref()).await?;
        Ok(SendOutcome::Sent { event_id })
    }

    fn honour_cancel(&self, event: &OutboundEvent) -> bool {
        if !self.cancellations.is_cancel_requested(&event.local_echo_id, &event.room_id) {
            return false;
        }
        self.cancellations.mark_cancelled(&event.local_echo_id, &event.room_id);
        tracing::debug!(
            local_echo_id = %event.local_echo_id,
            room_id = %event.room_id,
            "send cancelled"
        );
        true
    }
}

impl std::fmt::Debug for SendWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendWorker")
            .field("pending_cancellations", &self.cancellations.pending_count())
            .finish_non_exhaustive()
    }
}

/// Result of one queued send, published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxResult {
    /// Local echo of the send.
    pub local_echo_id: LocalEchoId,
    /// Destination room.
    pub room_id: RoomId,
    /// Outcome, or the error text if the send failed.
    pub outcome: Result<SendOutcome, String>,
}

/// Per-session send queue.
///
/// Once [`Outbox::shutdown`] has been called, or the outbox dropped, new
/// sends are refused and sends still queued are abandoned.
pub struct Outbox<E: Environment> {
    session_id: SessionId,
    env: E,
    queue: mpsc::UnboundedSender<OutboundEvent>,
    results: broadcast::Sender<OutboxResult>,
    cancellations: Arc<CancellationTracker>,
    stop: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<E: Environment> Outbox<E> {
    /// Start the worker task. Must be called from within a Tokio runtime.
    pub fn spawn(
        session_id: SessionId,
        env: E,
        transport: Arc<dyn Transport>,
        cancellations: Arc<CancellationTracker>,
    ) -> Self {
        let (queue, rx) = mpsc::unbounded_channel();
        let (results, _) = broadcast::channel(RESULT_CAPACITY);
        let stop = CancellationToken::new();

        let worker = SendWorker::new(transport, Arc::clone(&cancellations));
        let task = tokio::spawn(run_worker(
            session_id.clone(),
            worker,
            rx,
            results.clone(),
            stop.child_token(),
        ));

        Self { session_id, env, queue, results, cancellations, stop, task: Mutex::new(Some(task)) }
    }

    /// Queue a text message. Returns its local echo id.
    pub fn enqueue(&self, room_id: &RoomId, body: impl Into<String>) -> Result<LocalEchoId, ClientError> {
        self.enqueue_event(room_id, body.into(), None)
    }

    /// Queue a message with media.
    pub fn enqueue_media(
        &self,
        room_id: &RoomId,
        body: impl Into<String>,
        attachment: MediaAttachment,
    ) -> Result<LocalEchoId, ClientError> {
        self.enqueue_event(room_id, body.into(), Some(attachment))
    }

    fn enqueue_event(
        &self,
        room_id: &RoomId,
        body: String,
        attachment: Option<MediaAttachment>,
    ) -> Result<LocalEchoId, ClientError> {
        if self.stop.is_cancelled() {
            return Err(ClientError::SessionClosed { session_id: self.session_id.clone() });
        }

        let local_echo_id = LocalEchoId::from_random(self.env.random_u128());
        let event = OutboundEvent {
            local_echo_id: local_echo_id.clone(),
            room_id: room_id.clone(),
            body,
            attachment,
        };

        self.queue
            .send(event)
            .map_err(|_| ClientError::SessionClosed { session_id: self.session_id.clone() })?;
        tracing::debug!(local_echo_id = %local_echo_id, room_id = %room_id, "send queued");
        Ok(local_echo_id)
    }

    /// Ask the worker to skip a queued send.
    pub fn cancel(&self, local_echo_id: &LocalEchoId, room_id: &RoomId) {
        self.cancellations.mark_for_cancel(local_echo_id, room_id);
    }

    /// Subscribe to send results.
    pub fn subscribe(&self) -> broadcast::Receiver<OutboxResult> {
        self.results.subscribe()
    }

    /// Refuse further sends, stop the worker and wait for it to exit.
    /// Idempotent.
    pub async fn shutdown(&self) {
        self.stop.cancel();
        let Some(task) = self.task.lock().await.take() else { return };
        if let Err(e) = task.await {
            tracing::error!(session_id = %self.session_id, error = %e, "outbox worker ended abnormally");
        }
    }
}

impl<E: Environment> Drop for Outbox<E> {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

impl<E: Environment> std::fmt::Debug for Outbox<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbox")
            .field("session_id", &self.session_id)
            .field("stopped", &self.stop.is_cancelled())
            .finish_non_exhaustive()
    }
}

async fn run_worker(
    session_id: SessionId,
    worker: SendWorker,
    mut queue: mpsc::UnboundedReceiver<OutboundEvent>,
    results: broadcast::Sender<OutboxResult>,
    stop: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            () = stop.cancelled() => break,
            next = queue.recv() => match next {
                Some(event) => event,
                None => break,
            },
        };

        let outcome = tokio::select! {
            () = stop.cancelled() => break,
            outcome = worker.execute(&event) => outcome,
        };

        if let Err(e) = &outcome {
            tracing::warn!(
                session_id = %session_id,
                local_echo_id = %event.local_echo_id,
                room_id = %event.room_id,
                error = %e,
                "send failed"
            );
        }

        // No subscribers is fine.
        let _ = results.send(OutboxResult {
            local_echo_id: event.local_echo_id,
            room_id: event.room_id,
            outcome: outcome.map_err(|e| e.to_string()),
        });
    }

    tracing::debug!(session_id = %session_id, "outbox worker stopped");
}
