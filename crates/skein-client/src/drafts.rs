//! Composer drafts, scoped per room.
//!
//! One [`DraftRepository`] per session holds every room's draft stack. Views
//! bind to a room through [`DraftServiceFactory::create`], which hands out a
//! [`DraftService`] that can only see that room. The factory is the only way
//! to obtain a service, so a view cannot accidentally write another room's
//! drafts.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use skein_core::{LiveCell, LiveSource, Subscription, lock_unpoisoned, observe_or};
use skein_proto::{RoomId, UserDraft};

type DraftCell = Arc<LiveCell<Vec<UserDraft>>>;

/// Draft stacks for every room of a session.
#[derive(Debug, Default)]
pub struct DraftRepository {
    rooms: Mutex<HashMap<RoomId, DraftCell>>,
}

impl DraftRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(rooms: &mut HashMap<RoomId, DraftCell>, room_id: &RoomId) -> DraftCell {
        Arc::clone(rooms.entry(room_id.clone()).or_insert_with(|| Arc::new(LiveCell::new(None))))
    }

    /// Push a draft. Saving the same draft that is already on top is a
    /// no-op; blank drafts are ignored.
    pub fn save(&self, room_id: &RoomId, draft: UserDraft) -> bool {
        if draft.is_blank() {
            return false;
        }
        let mut rooms = lock_unpoisoned(&self.rooms);
        let cell = Self::cell(&mut rooms, room_id);

        let mut stack = cell.get().unwrap_or_default();
        if stack.last() == Some(&draft) {
            return false;
        }
        stack.push(draft);
        cell.set(Some(stack));
        true
    }

    /// Pop the latest draft.
    pub fn pop(&self, room_id: &RoomId) -> Option<UserDraft> {
        let mut rooms = lock_unpoisoned(&self.rooms);
        let cell = Self::cell(&mut rooms, room_id);

        let mut stack = cell.get().unwrap_or_default();
        let popped = stack.pop()?;
        cell.set(Some(stack));
        Some(popped)
    }

    /// Latest draft of a room.
    pub fn latest(&self, room_id: &RoomId) -> Option<UserDraft> {
        self.stack(room_id).pop()
    }

    /// Whole stack of a room, oldest first.
    pub fn stack(&self, room_id: &RoomId) -> Vec<UserDraft> {
        lock_unpoisoned(&self.rooms)
            .get(room_id)
            .and_then(|cell| cell.get())
            .unwrap_or_default()
    }

    /// Live view of a room's stack.
    pub fn live(&self, room_id: &RoomId) -> Arc<dyn LiveSource<Vec<UserDraft>>> {
        let mut rooms = lock_unpoisoned(&self.rooms);
        Self::cell(&mut rooms, room_id)
    }

    /// Drop every room's drafts. Live views see an empty stack.
    pub fn clear(&self) {
        let rooms = std::mem::take(&mut *lock_unpoisoned(&self.rooms));
        for cell in rooms.into_values() {
            cell.set(Some(Vec::new()));
        }
    }
}

/// Draft access bound to one room.
#[derive(Debug, Clone)]
pub struct DraftService {
    room_id: RoomId,
    repository: Arc<DraftRepository>,
}

impl DraftService {
    /// Room this service is bound to.
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Push a draft. Returns whether the stack changed.
    pub fn save_draft(&self, draft: UserDraft) -> bool {
        self.repository.save(&self.room_id, draft)
    }

    /// Pop the latest draft.
    pub fn delete_draft(&self) -> Option<UserDraft> {
        self.repository.pop(&self.room_id)
    }

    /// Latest draft.
    pub fn draft(&self) -> Option<UserDraft> {
        self.repository.latest(&self.room_id)
    }

    /// Whole stack, oldest first.
    pub fn drafts(&self) -> Vec<UserDraft> {
        self.repository.stack(&self.room_id)
    }

    /// Stream of the room's stack, starting with its current value. A room
    /// without drafts yields an empty stack.
    pub fn subscribe(&self) -> Subscription<Vec<UserDraft>> {
        observe_or(self.repository.live(&self.room_id), Vec::new())
    }
}

/// Creates room-scoped [`DraftService`]s over a session's repository.
#[derive(Debug, Clone)]
pub struct DraftServiceFactory {
    repository: Arc<DraftRepository>,
}

impl DraftServiceFactory {
    /// Factory over a repository.
    pub fn new(repository: Arc<DraftRepository>) -> Self {
        Self { repository }
    }

    /// Service bound to `room_id`.
    pub fn create(&self, room_id: RoomId) -> DraftService {
        DraftService { room_id, repository: Arc::clone(&self.repository) }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use skein_proto::EventId;

    use super::*;

    fn regular(text: &str) -> UserDraft {
        UserDraft::Regular { text: text.to_string() }
    }

    fn factory() -> DraftServiceFactory {
        DraftServiceFactory::new(Arc::new(DraftRepository::new()))
    }

    #[test]
    fn drafts_stack_per_room() {
        let factory = factory();
        let a = factory.create(RoomId::new("!a"));
        let b = factory.create(RoomId::new("!b"));

        a.save_draft(regular("hello"));
        a.save_draft(UserDraft::Reply { event_id: EventId::new("$e"), text: "re".to_string() });
        b.save_draft(regular("other"));

        assert_eq!(a.drafts().len(), 2);
        assert_eq!(a.draft().unwrap().text(), "re");
        assert_eq!(b.drafts(), vec![regular("other")]);
    }

    #[test]
    fn delete_pops_latest() {
        let service = factory().create(RoomId::new("!a"));
        service.save_draft(regular("one"));
        service.save_draft(regular("two"));

        assert_eq!(service.delete_draft(), Some(regular("two")));
        assert_eq!(service.draft(), Some(regular("one")));
        assert_eq!(service.delete_draft(), Some(regular("one")));
        assert_eq!(service.delete_draft(), None);
    }

    #[test]
    fn identical_top_and_blank_are_ignored() {
        let service = factory().create(RoomId::new("!a"));

        assert!(service.save_draft(regular("same")));
        assert!(!service.save_draft(regular("same")));
        assert!(!service.save_draft(regular("   ")));
        assert_eq!(service.drafts().len(), 1);
    }

    #[test]
    fn services_share_the_repository() {
        let factory = factory();
        factory.create(RoomId::new("!a")).save_draft(regular("kept"));

        assert_eq!(factory.create(RoomId::new("!a")).draft(), Some(regular("kept")));
    }

    #[tokio::test]
    async fn subscribe_starts_empty_and_follows_changes() {
        let service = factory().create(RoomId::new("!a"));
        let mut sub = service.subscribe();

        assert_eq!(sub.recv().await.unwrap().unwrap(), Vec::<UserDraft>::new());

        service.save_draft(regular("typed"));
        assert_eq!(sub.recv().await.unwrap().unwrap(), vec![regular("typed")]);

        service.delete_draft();
        assert_eq!(sub.recv().await.unwrap().unwrap(), Vec::<UserDraft>::new());
    }

    #[tokio::test]
    async fn clear_empties_live_views() {
        let repository = Arc::new(DraftRepository::new());
        let service = DraftServiceFactory::new(Arc::clone(&repository)).create(RoomId::new("!a"));
        service.save_draft(regular("x"));
        let mut sub = service.subscribe();
        assert_eq!(sub.recv().await.unwrap().unwrap(), vec![regular("x")]);

        repository.clear();

        assert_eq!(sub.recv().await.unwrap().unwrap(), Vec::<UserDraft>::new());
        assert!(service.drafts().is_empty());
    }
}
