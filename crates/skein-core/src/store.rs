//! Local store abstraction.
//!
//! The real store (an on-disk database) lives outside this workspace. The
//! core only needs three things from it:
//!
//! - Transactional ingestion: a delta's node updates and its sync token are
//!   committed together or not at all
//! - Snapshot queries: the current committed state of a node
//! - Live queries: a [`LiveSource`] per node, notified after each commit
//!
//! [`MemoryStore`] implements the contract in memory for tests and the
//! harness.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use skein_proto::{RoomId, SpaceNode, SyncDelta, SyncToken};
use thiserror::Error;

use crate::live::{LiveCell, LiveSource, lock_unpoisoned};

/// Errors from local store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store was closed by session teardown.
    #[error("store is closed")]
    Closed,

    /// The backing database rejected a transaction.
    #[error("transaction failed: {reason}")]
    Transaction {
        /// Description of the failure.
        reason: String,
    },
}

/// Materialized client state for one session.
///
/// # Invariants
///
/// - `apply_delta` is atomic: readers observe either none or all of a delta,
///   including its `next_token`
/// - Live sources are notified only after the transaction commits, so an
///   observer that queries a snapshot sees the committed state
/// - After `close`, every operation returns `StoreError::Closed`
pub trait LocalStore: Send + Sync + 'static {
    /// Commit a sync delta and its token.
    fn apply_delta(&self, delta: &SyncDelta) -> Result<(), StoreError>;

    /// Token of the last committed delta.
    fn sync_token(&self) -> Result<Option<SyncToken>, StoreError>;

    /// Snapshot of one node.
    fn space_node(&self, room_id: &RoomId) -> Result<Option<SpaceNode>, StoreError>;

    /// Snapshot of every space node.
    fn spaces(&self) -> Result<Vec<SpaceNode>, StoreError>;

    /// Live view of one node. Emits `None` while the node is unknown.
    fn live_space_node(&self, room_id: &RoomId) -> Arc<dyn LiveSource<SpaceNode>>;

    /// Release the store's resources.
    fn close(&self);

    /// Whether `close` has been called.
    fn is_closed(&self) -> bool;
}

#[derive(Default)]
struct MemoryState {
    token: Option<SyncToken>,
    nodes: HashMap<RoomId, SpaceNode>,
    cells: HashMap<RoomId, Arc<LiveCell<SpaceNode>>>,
    closed: bool,
    commits: u64,
}

/// In-memory [`LocalStore`].
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    /// Serializes commit + notify so observers see commits in order.
    writer: Mutex<()>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed deltas.
    pub fn commit_count(&self) -> u64 {
        lock_unpoisoned(&self.state).commits
    }

    /// Number of nodes in the store.
    pub fn node_count(&self) -> usize {
        lock_unpoisoned(&self.state).nodes.len()
    }
}

impl LocalStore for MemoryStore {
    fn apply_delta(&self, delta: &SyncDelta) -> Result<(), StoreError> {
        let _writer = lock_unpoisoned(&self.writer);

        let changed = {
            let mut state = lock_unpoisoned(&self.state);
            if state.closed {
                return Err(StoreError::Closed);
            }

            let mut changed = Vec::new();
            for node in delta.rooms.iter().filter_map(|r| r.node.as_ref()) {
                let previous = state.nodes.insert(node.id.clone(), node.clone());
                if previous.as_ref() != Some(node) {
                    if let Some(cell) = state.cells.get(&node.id) {
                        changed.push((Arc::clone(cell), node.clone()));
                    }
                }
            }
            state.token = Some(delta.next_token.clone());
            state.commits += 1;
            changed
        };

        for (cell, node) in changed {
            cell.set(Some(node));
        }

        tracing::trace!(token = %delta.next_token, rooms = delta.rooms.len(), "delta committed");
        Ok(())
    }

    fn sync_token(&self) -> Result<Option<SyncToken>, StoreError> {
        let state = lock_unpoisoned(&self.state);
        if state.closed {
            return Err(StoreError::Closed);
        }
        Ok(state.token.clone())
    }

    fn space_node(&self, room_id: &RoomId) -> Result<Option<SpaceNode>, StoreError> {
        let state = lock_unpoisoned(&self.state);
        if state.closed {
            return Err(StoreError::Closed);
        }
        Ok(state.nodes.get(room_id).cloned())
    }

    fn spaces(&self) -> Result<Vec<SpaceNode>, StoreError> {
        let state = lock_unpoisoned(&self.state);
        if state.closed {
            return Err(StoreError::Closed);
        }
        Ok(state.nodes.values().filter(|n| n.is_space()).cloned().collect())
    }

    fn live_space_node(&self, room_id: &RoomId) -> Arc<dyn LiveSource<SpaceNode>> {
        let mut state = lock_unpoisoned(&self.state);
        let current = state.nodes.get(room_id).cloned();
        let cell = state
            .cells
            .entry(room_id.clone())
            .or_insert_with(|| Arc::new(LiveCell::new(current)));
        Arc::clone(cell) as Arc<dyn LiveSource<SpaceNode>>
    }

    fn close(&self) {
        let mut state = lock_unpoisoned(&self.state);
        state.closed = true;
        state.cells.clear();
    }

    fn is_closed(&self) -> bool {
        lock_unpoisoned(&self.state).closed
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock_unpoisoned(&self.state);
        f.debug_struct("MemoryStore")
            .field("token", &state.token)
            .field("nodes", &state.nodes.len())
            .field("closed", &state.closed)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use skein_proto::RoomDelta;

    use super::*;

    fn delta(token: &str, nodes: Vec<SpaceNode>) -> SyncDelta {
        SyncDelta::new(SyncToken::new(token), nodes.into_iter().map(RoomDelta::node).collect())
    }

    #[test]
    fn token_commits_with_nodes() {
        let store = MemoryStore::new();
        store.apply_delta(&delta("t1", vec![SpaceNode::room("!a")])).unwrap();

        assert_eq!(store.sync_token().unwrap(), Some(SyncToken::new("t1")));
        assert!(store.space_node(&RoomId::new("!a")).unwrap().is_some());
    }

    #[test]
    fn live_node_notified_after_commit() {
        let store = MemoryStore::new();
        let live = store.live_space_node(&RoomId::new("!s"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        live.observe_forever(Arc::new(move |n: Option<SpaceNode>| {
            lock_unpoisoned(&sink).push(n.map(|n| n.children.len()));
        }));

        store.apply_delta(&delta("t1", vec![SpaceNode::space("!s", [RoomId::new("!a")])])).unwrap();

        assert_eq!(*lock_unpoisoned(&seen), vec![None, Some(1)]);
    }

    #[test]
    fn unchanged_node_does_not_notify() {
        let store = MemoryStore::new();
        let node = SpaceNode::space("!s", Vec::<RoomId>::new());
        store.apply_delta(&delta("t1", vec![node.clone()])).unwrap();

        let live = store.live_space_node(&node.id);
        let calls = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&calls);
        live.observe_forever(Arc::new(move |_: Option<SpaceNode>| *lock_unpoisoned(&sink) += 1));

        store.apply_delta(&delta("t2", vec![node])).unwrap();
        assert_eq!(*lock_unpoisoned(&calls), 1);
    }

    #[test]
    fn closed_store_rejects_everything() {
        let store = MemoryStore::new();
        store.close();

        assert!(store.is_closed());
        assert!(matches!(store.apply_delta(&delta("t", vec![])), Err(StoreError::Closed)));
        assert!(matches!(store.sync_token(), Err(StoreError::Closed)));
    }
}
