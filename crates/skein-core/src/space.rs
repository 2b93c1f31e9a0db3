//! Space hierarchy resolver.
//!
//! Flattens the graph below a root space into the ordered, duplicate-free list
//! of rooms it contains, and keeps that list current as the graph changes.
//!
//! ## Traversal
//!
//! Depth-first, children in listed order, restricted to nodes whose membership
//! passes the filter. The protocol allows cycles (a space may list one of its
//! ancestors), so every traversal tracks visited nodes and never enters one
//! twice. The root itself is always traversed regardless of its membership.
//!
//! - [`flatten_spaces`]: the root plus every reachable space.
//! - [`flatten_rooms`]: every reachable non-space room. This is the output.
//! - [`flatten_dependencies`]: the root plus every child listed by a reachable
//!   space, known or not, accepted or not. These are the nodes whose changes
//!   can alter the result: a child that is still unknown may arrive, a left
//!   space may be rejoined, a listed room may be left.
//!
//! ## Reactivity
//!
//! [`SpaceHierarchy`] runs a driver task owning one bridge subscription per
//! node returned by [`flatten_dependencies`], kept in a map keyed by node id.
//! Any emission triggers a recompute, after which the map is diffed against
//! the new dependency set: subscriptions are added for nodes that entered it
//! and dropped for nodes that left it. The number of live subscriptions is
//! always the size of the current dependency set.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use skein_proto::{Membership, MembershipFilter, RoomId, SpaceNode};
use tokio::{sync::watch, task::JoinHandle};
use tokio_stream::{StreamExt, StreamMap};

use crate::{
    bridge::{self, Subscription},
    ordering,
    store::{LocalStore, StoreError},
};

/// Root plus every reachable space, in depth-first order.
///
/// The root is always first, even if `lookup` does not know it.
pub fn flatten_spaces<F, E>(
    root: &RoomId,
    accepted: MembershipFilter,
    mut lookup: F,
) -> Result<Vec<RoomId>, E>
where
    F: FnMut(&RoomId) -> Result<Option<SpaceNode>, E>,
{
    let mut out = vec![root.clone()];
    let mut visited = HashSet::from([root.clone()]);

    let mut stack = match lookup(root)? {
        Some(node) => node.children.into_iter().rev().collect(),
        None => Vec::new(),
    };

    while let Some(id) = stack.pop() {
        if visited.contains(&id) {
            continue;
        }
        let Some(node) = lookup(&id)? else { continue };
        if !node.is_space() || !accepted.accepts(node.membership) {
            continue;
        }

        visited.insert(id.clone());
        out.push(id);
        stack.extend(node.children.into_iter().rev());
    }

    Ok(out)
}

/// Every reachable non-space room, in depth-first order, without duplicates.
pub fn flatten_rooms<F, E>(
    root: &RoomId,
    accepted: MembershipFilter,
    mut lookup: F,
) -> Result<Vec<RoomId>, E>
where
    F: FnMut(&RoomId) -> Result<Option<SpaceNode>, E>,
{
    let mut rooms = Vec::new();
    let mut emitted = HashSet::new();
    let mut visited = HashSet::from([root.clone()]);

    let mut stack: Vec<RoomId> = match lookup(root)? {
        Some(node) => node.children.into_iter().rev().collect(),
        None => Vec::new(),
    };

    while let Some(id) = stack.pop() {
        if visited.contains(&id) || emitted.contains(&id) {
            continue;
        }
        let Some(node) = lookup(&id)? else { continue };
        if !accepted.accepts(node.membership) {
            continue;
        }

        if node.is_space() {
            visited.insert(id);
            stack.extend(node.children.into_iter().rev());
        } else {
            emitted.insert(id.clone());
            rooms.push(id);
        }
    }

    Ok(rooms)
}

/// Root plus every child listed by a reachable space, deduplicated, in
/// depth-first order.
pub fn flatten_dependencies<F, E>(
    root: &RoomId,
    accepted: MembershipFilter,
    mut lookup: F,
) -> Result<Vec<RoomId>, E>
where
    F: FnMut(&RoomId) -> Result<Option<SpaceNode>, E>,
{
    let spaces = flatten_spaces(root, accepted, &mut lookup)?;
    let mut out = Vec::with_capacity(spaces.len());
    let mut seen = HashSet::new();

    for space in &spaces {
        if seen.insert(space.clone()) {
            out.push(space.clone());
        }
        let Some(node) = lookup(space)? else { continue };
        for child in node.children {
            if seen.insert(child.clone()) {
                out.push(child);
            }
        }
    }

    Ok(out)
}

/// Joined spaces that no other joined space lists as a child, in display
/// order.
pub fn top_level_spaces(store: &dyn LocalStore) -> Result<Vec<SpaceNode>, StoreError> {
    let joined: Vec<SpaceNode> =
        store.spaces()?.into_iter().filter(|s| s.membership == Membership::Joined).collect();

    let nested: HashSet<&RoomId> = joined.iter().flat_map(|s| s.children.iter()).collect();
    let mut top: Vec<SpaceNode> =
        joined.iter().filter(|s| !nested.contains(&s.id)).cloned().collect();

    ordering::sort_spaces(&mut top);
    Ok(top)
}

/// Current output of a resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HierarchySnapshot {
    /// Flattened descendant rooms.
    pub rooms: Vec<RoomId>,
    /// Root plus every reachable space.
    pub spaces: Vec<RoomId>,
    /// Nodes currently subscribed to, root first.
    pub watched: Vec<RoomId>,
}

/// Self-maintaining view of the rooms below a space.
///
/// Dropping the handle stops the driver task and releases every
/// subscription it held.
#[derive(Debug)]
pub struct SpaceHierarchy {
    root: RoomId,
    output: watch::Receiver<HierarchySnapshot>,
    task: JoinHandle<()>,
}

impl SpaceHierarchy {
    /// Start resolving the hierarchy below `root`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(store: Arc<dyn LocalStore>, root: RoomId, accepted: MembershipFilter) -> Self {
        let (tx, output) = watch::channel(HierarchySnapshot::default());
        let driver = HierarchyDriver {
            store,
            root: root.clone(),
            accepted,
            sources: StreamMap::new(),
            output: tx,
        };
        let task = tokio::spawn(driver.run());
        Self { root, output, task }
    }

    /// Root space.
    pub fn root(&self) -> &RoomId {
        &self.root
    }

    /// Latest flattened room list.
    pub fn rooms(&self) -> Vec<RoomId> {
        self.output.borrow().rooms.clone()
    }

    /// Latest full snapshot.
    pub fn snapshot(&self) -> HierarchySnapshot {
        self.output.borrow().clone()
    }

    /// Receiver for consumers that want to await changes.
    pub fn watch(&self) -> watch::Receiver<HierarchySnapshot> {
        self.output.clone()
    }
}

impl Drop for SpaceHierarchy {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct HierarchyDriver {
    store: Arc<dyn LocalStore>,
    root: RoomId,
    accepted: MembershipFilter,
    sources: StreamMap<RoomId, Subscription<SpaceNode>>,
    output: watch::Sender<HierarchySnapshot>,
}

impl HierarchyDriver {
    async fn run(mut self) {
        tracing::debug!(root = %self.root, "space hierarchy resolver started");

        loop {
            match self.recompute() {
                Ok(()) => {},
                Err(StoreError::Closed) => break,
                Err(e) => tracing::warn!(root = %self.root, error = %e, "hierarchy recompute failed"),
            }

            tokio::select! {
                () = self.output.closed() => break,
                next = self.sources.next() => {
                    if next.is_none() {
                        break;
                    }
                    self.drain_queued();
                },
            }
        }

        tracing::debug!(root = %self.root, "space hierarchy resolver stopped");
    }

    /// Discard emissions that queued up before the next recompute; the
    /// recompute reads fresh snapshots anyway.
    fn drain_queued(&mut self) {
        for (_, sub) in self.sources.iter_mut() {
            while sub.try_recv().is_some() {}
        }
    }

    fn recompute(&mut self) -> Result<(), StoreError> {
        let store = Arc::clone(&self.store);
        let mut cache: HashMap<RoomId, Option<SpaceNode>> = HashMap::new();
        let mut lookup = |id: &RoomId| -> Result<Option<SpaceNode>, StoreError> {
            if let Some(hit) = cache.get(id) {
                return Ok(hit.clone());
            }
            let node = store.space_node(id)?;
            cache.insert(id.clone(), node.clone());
            Ok(node)
        };

        let spaces = flatten_spaces(&self.root, self.accepted, &mut lookup)?;
        let rooms = flatten_rooms(&self.root, self.accepted, &mut lookup)?;
        let watched = flatten_dependencies(&self.root, self.accepted, &mut lookup)?;

        let wanted: HashSet<&RoomId> = watched.iter().collect();
        let stale: Vec<RoomId> =
            self.sources.keys().filter(|id| !wanted.contains(id)).cloned().collect();
        for id in &stale {
            self.sources.remove(id);
        }
        let mut added = 0usize;
        for id in &watched {
            if !self.sources.contains_key(id) {
                self.sources.insert(id.clone(), bridge::observe(self.store.live_space_node(id)));
                added += 1;
            }
        }

        if added > 0 || !stale.is_empty() {
            tracing::debug!(
                root = %self.root,
                added,
                dropped = stale.len(),
                watched = self.sources.len(),
                "hierarchy subscriptions updated"
            );
        }

        let snapshot = HierarchySnapshot { rooms, spaces, watched };
        self.output.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
        Ok(())
    }
}
