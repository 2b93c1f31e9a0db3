//! Typing tracker.
//!
//! Keeps the last-known list of typing users per room. Each update replaces
//! the room's list wholesale; subscribers hear about it only if the list
//! actually changed.

use std::{collections::HashMap, sync::Mutex};

use skein_proto::{RoomId, UserId};
use tokio::sync::broadcast;

use crate::live::lock_unpoisoned;

/// Capacity of the update channel. Slow subscribers skip ahead.
const UPDATE_CAPACITY: usize = 256;

/// A room's typing list changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingUpdate {
    /// Room whose list changed.
    pub room_id: RoomId,
    /// New list, in server order. Empty means nobody is typing.
    pub users: Vec<UserId>,
}

/// Per-room typing state.
#[derive(Debug)]
pub struct TypingTracker {
    rooms: Mutex<HashMap<RoomId, Vec<UserId>>>,
    updates: broadcast::Sender<TypingUpdate>,
}

impl TypingTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CAPACITY);
        Self { rooms: Mutex::new(HashMap::new()), updates }
    }

    /// Replace a room's typing list.
    ///
    /// Returns `true` and notifies subscribers iff the list differs from the
    /// last-known one.
    pub fn update(&self, room_id: &RoomId, users: Vec<UserId>) -> bool {
        // Broadcast under the lock so subscribers see changes in commit order.
        let mut rooms = lock_unpoisoned(&self.rooms);
        let current = rooms.get(room_id).map_or(&[][..], Vec::as_slice);
        if current == users.as_slice() {
            return false;
        }
        if users.is_empty() {
            rooms.remove(room_id);
        } else {
            rooms.insert(room_id.clone(), users.clone());
        }

        tracing::trace!(room_id = %room_id, typing = users.len(), "typing changed");
        // No subscribers is fine.
        let _ = self.updates.send(TypingUpdate { room_id: room_id.clone(), users });
        true
    }

    /// Last-known typing users for a room.
    pub fn typing_users(&self, room_id: &RoomId) -> Vec<UserId> {
        lock_unpoisoned(&self.rooms).get(room_id).cloned().unwrap_or_default()
    }

    /// Subscribe to changes.
    pub fn subscribe(&self) -> broadcast::Receiver<TypingUpdate> {
        self.updates.subscribe()
    }

    /// Forget every room.
    pub fn clear(&self) {
        lock_unpoisoned(&self.rooms).clear();
    }
}

impl Default for TypingTracker {
    fn default() -> Self {
        Self::new()
    }
}
