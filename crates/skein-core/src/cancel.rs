//! Outbox cancellation tracker.
//!
//! The outbound work queue cannot revoke an already-enqueued send without
//! also dropping every send queued after it for the same room. Cancellation
//! is therefore a side channel: the user's cancel marks the local echo, and
//! the send path polls the mark at its checkpoints.
//!
//! Marks live in memory only. A send cancelled just before the process dies
//! may still go out after restart.

use std::sync::Mutex;

use skein_proto::{LocalEchoId, RoomId};

use crate::live::lock_unpoisoned;

/// A send the user asked to cancel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PendingCancellation {
    /// Local echo of the send.
    pub local_echo_id: LocalEchoId,
    /// Room the send targets.
    pub room_id: RoomId,
}

/// Set of pending cancellations shared by UI actions and send workers.
///
/// Every operation takes the same lock; the set is expected to stay tiny.
#[derive(Debug, Default)]
pub struct CancellationTracker {
    pending: Mutex<Vec<PendingCancellation>>,
}

impl CancellationTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the user cancelled a send. Marking twice is harmless.
    pub fn mark_for_cancel(&self, local_echo_id: &LocalEchoId, room_id: &RoomId) {
        let mut pending = lock_unpoisoned(&self.pending);
        if !pending.iter().any(|p| p.local_echo_id == *local_echo_id && p.room_id == *room_id) {
            pending.push(PendingCancellation {
                local_echo_id: local_echo_id.clone(),
                room_id: room_id.clone(),
            });
            tracing::debug!(local_echo_id = %local_echo_id, room_id = %room_id, "send marked for cancel");
        }
    }

    /// Whether a cancellation is pending. Does not consume the mark.
    pub fn is_cancel_requested(&self, local_echo_id: &LocalEchoId, room_id: &RoomId) -> bool {
        lock_unpoisoned(&self.pending)
            .iter()
            .any(|p| p.local_echo_id == *local_echo_id && p.room_id == *room_id)
    }

    /// Remove the mark once the send path has honoured it.
    pub fn mark_cancelled(&self, local_echo_id: &LocalEchoId, room_id: &RoomId) {
        lock_unpoisoned(&self.pending)
            .retain(|p| !(p.local_echo_id == *local_echo_id && p.room_id == *room_id));
    }

    /// Number of pending marks.
    pub fn pending_count(&self) -> usize {
        lock_unpoisoned(&self.pending).len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn echo(n: u128) -> LocalEchoId {
        LocalEchoId::from_random(n)
    }

    #[test]
    fn mark_check_clear() {
        let tracker = CancellationTracker::new();
        let room = RoomId::new("!a");

        tracker.mark_for_cancel(&echo(1), &room);
        assert!(tracker.is_cancel_requested(&echo(1), &room));
        assert!(tracker.is_cancel_requested(&echo(1), &room));

        tracker.mark_cancelled(&echo(1), &room);
        assert!(!tracker.is_cancel_requested(&echo(1), &room));
    }

    #[test]
    fn pair_must_match() {
        let tracker = CancellationTracker::new();
        tracker.mark_for_cancel(&echo(1), &RoomId::new("!a"));

        assert!(!tracker.is_cancel_requested(&echo(1), &RoomId::new("!b")));
        assert!(!tracker.is_cancel_requested(&echo(2), &RoomId::new("!a")));
    }

    #[test]
    fn duplicate_marks_collapse() {
        let tracker = CancellationTracker::new();
        let room = RoomId::new("!a");
        tracker.mark_for_cancel(&echo(1), &room);
        tracker.mark_for_cancel(&echo(1), &room);

        assert_eq!(tracker.pending_count(), 1);
    }

    #[test]
    fn mark_is_visible_across_threads() {
        let tracker = Arc::new(CancellationTracker::new());
        let room = RoomId::new("!a");

        let marker = Arc::clone(&tracker);
        let marker_room = room.clone();
        std::thread::spawn(move || marker.mark_for_cancel(&echo(7), &marker_room)).join().unwrap();

        let checker = Arc::clone(&tracker);
        let checker_room = room.clone();
        let seen = std::thread::spawn(move || checker.is_cancel_requested(&echo(7), &checker_room))
            .join()
            .unwrap();
        assert!(seen);

        tracker.mark_cancelled(&echo(7), &room);
        assert!(!tracker.is_cancel_requested(&echo(7), &room));
    }

    #[test]
    fn concurrent_marks_are_all_recorded() {
        let tracker = Arc::new(CancellationTracker::new());
        let threads: Vec<_> = (0..16u128)
            .map(|i| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || tracker.mark_for_cancel(&echo(i), &RoomId::new("!a")))
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(tracker.pending_count(), 16);
    }
}
