//! Reactive bridge from live sources to disposable subscriptions.
//!
//! A [`LiveSource`] calls its observers inline, on whatever thread changed
//! the value (typically the ingestion thread, inside a store transaction).
//! Running subscriber code there would let it re-enter the store. The bridge
//! therefore registers an observer that only enqueues, and the subscriber
//! drains the queue on its own task.
//!
//! # Guarantees
//!
//! - Subscribing attaches exactly one observer to the source
//! - Disposal detaches it exactly once, whether triggered by
//!   [`Subscription::dispose`], a [`DisposeHandle`] on another thread, or
//!   `Drop`
//! - Once disposed, a subscription yields nothing more, not even items that
//!   were already queued
//! - A `None` from the source becomes the configured default, or
//!   [`BridgeError::NullValue`] on the stream

use std::{
    pin::Pin,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    task::{Context, Poll},
};

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::Stream;

use crate::live::{LiveSource, Observer, lock_unpoisoned};

/// Errors delivered through a subscription's failure channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// The source emitted "no value" and no default was configured.
    #[error("live source emitted no value and no default is configured")]
    NullValue,
}

type Detach = Box<dyn FnOnce() + Send>;

struct Attachment {
    disposed: Arc<AtomicBool>,
    detach: Mutex<Option<Detach>>,
}

impl Attachment {
    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let detach = lock_unpoisoned(&self.detach).take();
        if let Some(detach) = detach {
            detach();
        }
    }
}

/// Cloneable handle that can dispose a subscription from anywhere.
#[derive(Clone)]
pub struct DisposeHandle {
    attachment: Arc<Attachment>,
}

impl DisposeHandle {
    /// Detach the underlying observer. Idempotent.
    pub fn dispose(&self) {
        self.attachment.dispose();
    }

    /// Whether the subscription has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.attachment.disposed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for DisposeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisposeHandle").field("disposed", &self.is_disposed()).finish()
    }
}

/// Stream of values from a live source.
///
/// Yields `Ok(value)` per change, `Err(BridgeError::NullValue)` when the
/// source has no value and no default was given, and `None` once disposed.
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<Result<T, BridgeError>>,
    handle: DisposeHandle,
}

impl<T> Subscription<T> {
    /// Wait for the next item. Returns `None` once disposed.
    pub async fn recv(&mut self) -> Option<Result<T, BridgeError>> {
        if self.handle.is_disposed() {
            return None;
        }
        let item = self.rx.recv().await;
        if self.handle.is_disposed() { None } else { item }
    }

    /// Take the next already-queued item without waiting.
    pub fn try_recv(&mut self) -> Option<Result<T, BridgeError>> {
        if self.handle.is_disposed() {
            return None;
        }
        self.rx.try_recv().ok()
    }

    /// Detach from the source. Idempotent.
    pub fn dispose(&self) {
        self.handle.dispose();
    }

    /// Handle for disposing from another task or thread.
    pub fn dispose_handle(&self) -> DisposeHandle {
        self.handle.clone()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.handle.dispose();
    }
}

impl<T> Stream for Subscription<T> {
    type Item = Result<T, BridgeError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.handle.is_disposed() {
            return Poll::Ready(None);
        }
        match this.rx.poll_recv(cx) {
            Poll::Ready(_) if this.handle.is_disposed() => Poll::Ready(None),
            other => other,
        }
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("handle", &self.handle).finish_non_exhaustive()
    }
}

/// Subscribe to a live source; absent values are reported as
/// [`BridgeError::NullValue`].
pub fn observe<T>(source: Arc<dyn LiveSource<T>>) -> Subscription<T>
where
    T: Clone + Send + Sync + 'static,
{
    attach(source, None)
}

/// Subscribe to a live source; absent values are replaced by `default`.
pub fn observe_or<T>(source: Arc<dyn LiveSource<T>>, default: T) -> Subscription<T>
where
    T: Clone + Send + Sync + 'static,
{
    attach(source, Some(default))
}

fn attach<T>(source: Arc<dyn LiveSource<T>>, default: Option<T>) -> Subscription<T>
where
    T: Clone + Send + Sync + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let disposed = Arc::new(AtomicBool::new(false));

    let gate = Arc::clone(&disposed);
    let observer: Observer<T> = Arc::new(move |value: Option<T>| {
        if gate.load(Ordering::Acquire) {
            return;
        }
        let item = value.or_else(|| default.clone()).ok_or(BridgeError::NullValue);
        // Receiver gone means the subscription was dropped mid-notification.
        let _ = tx.send(item);
    });

    let id = source.observe_forever(observer);
    let detach: Detach = Box::new(move || source.remove_observer(id));

    let attachment = Arc::new(Attachment { disposed, detach: Mutex::new(Some(detach)) });
    Subscription { rx, handle: DisposeHandle { attachment } }
}
