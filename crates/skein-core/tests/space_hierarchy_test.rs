//! Space hierarchy resolver tests

use std::{sync::Arc, time::Duration};

use skein_core::{
    HierarchySnapshot, LiveSource, LocalStore, MemoryStore, SpaceHierarchy, space::top_level_spaces,
};
use skein_proto::{Membership, MembershipFilter, RoomDelta, RoomId, SpaceNode, SyncDelta, SyncToken};

fn ids(raw: &[&str]) -> Vec<RoomId> {
    raw.iter().map(|r| RoomId::new(*r)).collect()
}

fn commit(store: &MemoryStore, token: &str, nodes: Vec<SpaceNode>) {
    let delta = SyncDelta::new(SyncToken::new(token), nodes.into_iter().map(RoomDelta::node).collect());
    store.apply_delta(&delta).unwrap();
}

async fn settle<F>(hierarchy: &SpaceHierarchy, mut pred: F) -> HierarchySnapshot
where
    F: FnMut(&HierarchySnapshot) -> bool,
{
    let mut rx = hierarchy.watch();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| pred(s)))
        .await
        .expect("hierarchy did not settle")
        .expect("resolver stopped")
        .clone()
}

fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    commit(&store, "t1", vec![
        SpaceNode::space("!root", ids(&["!a", "!sub"])),
        SpaceNode::space("!sub", ids(&["!c"])),
        SpaceNode::room("!a"),
        SpaceNode::room("!c"),
    ]);
    store
}

#[tokio::test]
async fn initial_snapshot_flattens_tree() {
    let store = seeded_store();
    let hierarchy = SpaceHierarchy::spawn(store, RoomId::new("!root"), MembershipFilter::default());

    let snapshot = settle(&hierarchy, |s| !s.rooms.is_empty()).await;

    assert_eq!(snapshot.rooms, ids(&["!a", "!c"]));
    assert_eq!(snapshot.spaces, ids(&["!root", "!sub"]));
    assert_eq!(snapshot.watched, ids(&["!root", "!a", "!sub", "!c"]));
}

#[tokio::test]
async fn nested_change_is_picked_up() {
    let store = seeded_store();
    let hierarchy =
        SpaceHierarchy::spawn(Arc::clone(&store) as Arc<dyn LocalStore>, RoomId::new("!root"), MembershipFilter::default());
    settle(&hierarchy, |s| s.rooms.len() == 2).await;

    commit(&store, "t2", vec![SpaceNode::space("!sub", ids(&["!c", "!d"])), SpaceNode::room("!d")]);

    let snapshot = settle(&hierarchy, |s| s.rooms.len() == 3).await;
    assert_eq!(snapshot.rooms, ids(&["!a", "!c", "!d"]));
}

#[tokio::test]
async fn newly_reachable_space_is_watched() {
    let store = seeded_store();
    let hierarchy =
        SpaceHierarchy::spawn(Arc::clone(&store) as Arc<dyn LocalStore>, RoomId::new("!root"), MembershipFilter::default());
    settle(&hierarchy, |s| s.rooms.len() == 2).await;

    commit(&store, "t2", vec![
        SpaceNode::space("!sub", ids(&["!c", "!deep"])),
        SpaceNode::space("!deep", ids(&["!e"])),
        SpaceNode::room("!e"),
    ]);
    settle(&hierarchy, |s| s.spaces.len() == 3).await;

    // A change two levels down only reaches us through the new subscription.
    commit(&store, "t3", vec![SpaceNode::space("!deep", ids(&["!e", "!f"])), SpaceNode::room("!f")]);

    let snapshot = settle(&hierarchy, |s| s.rooms.contains(&RoomId::new("!f"))).await;
    assert_eq!(snapshot.rooms, ids(&["!a", "!c", "!e", "!f"]));
    assert_eq!(snapshot.spaces, ids(&["!root", "!sub", "!deep"]));
    assert_eq!(snapshot.watched, ids(&["!root", "!a", "!sub", "!c", "!deep", "!e", "!f"]));
}

#[tokio::test]
async fn detached_subtree_releases_subscriptions() {
    let store = seeded_store();
    let hierarchy =
        SpaceHierarchy::spawn(Arc::clone(&store) as Arc<dyn LocalStore>, RoomId::new("!root"), MembershipFilter::default());
    settle(&hierarchy, |s| s.watched.len() == 4).await;
    let sub_source = store.live_space_node(&RoomId::new("!sub"));
    let nested_room = store.live_space_node(&RoomId::new("!c"));
    assert_eq!(sub_source.observer_count(), 1);
    assert_eq!(nested_room.observer_count(), 1);

    commit(&store, "t2", vec![SpaceNode::space("!root", ids(&["!a"]))]);

    let snapshot = settle(&hierarchy, |s| s.watched.len() == 2).await;
    assert_eq!(snapshot.rooms, ids(&["!a"]));
    assert_eq!(snapshot.spaces, ids(&["!root"]));
    assert_eq!(snapshot.watched, ids(&["!root", "!a"]));
    assert_eq!(sub_source.observer_count(), 0);
    assert_eq!(nested_room.observer_count(), 0);
}

#[tokio::test]
async fn cyclic_graph_resolves() {
    let store = Arc::new(MemoryStore::new());
    commit(&store, "t1", vec![
        SpaceNode::space("!root", ids(&["!x"])),
        SpaceNode::space("!x", ids(&["!root", "!r1"])),
        SpaceNode::room("!r1"),
    ]);
    let hierarchy =
        SpaceHierarchy::spawn(Arc::clone(&store) as Arc<dyn LocalStore>, RoomId::new("!root"), MembershipFilter::default());

    let snapshot = settle(&hierarchy, |s| !s.rooms.is_empty()).await;

    assert_eq!(snapshot.rooms, ids(&["!r1"]));
    assert_eq!(snapshot.spaces, ids(&["!root", "!x"]));
    assert_eq!(snapshot.watched, ids(&["!root", "!x", "!r1"]));
}

#[tokio::test]
async fn unknown_root_fills_in_later() {
    let store = Arc::new(MemoryStore::new());
    let hierarchy =
        SpaceHierarchy::spawn(Arc::clone(&store) as Arc<dyn LocalStore>, RoomId::new("!root"), MembershipFilter::default());
    settle(&hierarchy, |s| s.watched == ids(&["!root"])).await;

    commit(&store, "t1", vec![SpaceNode::space("!root", ids(&["!a"])), SpaceNode::room("!a")]);

    let snapshot = settle(&hierarchy, |s| !s.rooms.is_empty()).await;
    assert_eq!(snapshot.rooms, ids(&["!a"]));
}

#[tokio::test]
async fn child_arriving_after_its_parent_is_picked_up() {
    let store = Arc::new(MemoryStore::new());
    commit(&store, "t1", vec![
        SpaceNode::space("!root", ids(&["!sub"])),
        SpaceNode::space("!sub", ids(&["!a"])),
    ]);
    let hierarchy =
        SpaceHierarchy::spawn(Arc::clone(&store) as Arc<dyn LocalStore>, RoomId::new("!root"), MembershipFilter::default());
    settle(&hierarchy, |s| s.watched.contains(&RoomId::new("!a"))).await;

    // Only the room itself changes; nothing it hangs off is touched.
    commit(&store, "t2", vec![SpaceNode::room("!a")]);

    let snapshot = settle(&hierarchy, |s| !s.rooms.is_empty()).await;
    assert_eq!(snapshot.rooms, ids(&["!a"]));
}

#[tokio::test]
async fn rejoined_space_contributes_its_rooms() {
    let store = Arc::new(MemoryStore::new());
    commit(&store, "t1", vec![
        SpaceNode::space("!root", ids(&["!sub"])),
        SpaceNode::space("!sub", ids(&["!a"])).with_membership(Membership::Left),
        SpaceNode::room("!a"),
    ]);
    let hierarchy =
        SpaceHierarchy::spawn(Arc::clone(&store) as Arc<dyn LocalStore>, RoomId::new("!root"), MembershipFilter::default());
    let snapshot = settle(&hierarchy, |s| s.watched.contains(&RoomId::new("!sub"))).await;
    assert!(snapshot.rooms.is_empty());
    assert_eq!(snapshot.spaces, ids(&["!root"]));

    commit(&store, "t2", vec![SpaceNode::space("!sub", ids(&["!a"]))]);

    let snapshot = settle(&hierarchy, |s| !s.rooms.is_empty()).await;
    assert_eq!(snapshot.rooms, ids(&["!a"]));
    assert_eq!(snapshot.spaces, ids(&["!root", "!sub"]));
}

#[tokio::test]
async fn left_room_drops_out() {
    let store = Arc::new(MemoryStore::new());
    commit(&store, "t1", vec![SpaceNode::space("!root", ids(&["!a"])), SpaceNode::room("!a")]);
    let hierarchy =
        SpaceHierarchy::spawn(Arc::clone(&store) as Arc<dyn LocalStore>, RoomId::new("!root"), MembershipFilter::default());
    settle(&hierarchy, |s| s.rooms == ids(&["!a"])).await;

    commit(&store, "t2", vec![SpaceNode::room("!a").with_membership(Membership::Left)]);

    let snapshot = settle(&hierarchy, |s| s.rooms.is_empty()).await;
    // Still listed by the root, so still watched.
    assert_eq!(snapshot.watched, ids(&["!root", "!a"]));
}

#[tokio::test]
async fn dropping_the_handle_detaches_everything() {
    let store = seeded_store();
    let hierarchy =
        SpaceHierarchy::spawn(Arc::clone(&store) as Arc<dyn LocalStore>, RoomId::new("!root"), MembershipFilter::default());
    settle(&hierarchy, |s| s.watched.len() == 4).await;
    let root_source = store.live_space_node(&RoomId::new("!root"));

    drop(hierarchy);

    tokio::time::timeout(Duration::from_secs(5), async {
        while root_source.observer_count() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("subscriptions were not released");
}

#[test]
fn top_level_spaces_excludes_nested_and_unjoined() {
    let store = MemoryStore::new();
    commit(&store, "t1", vec![
        SpaceNode::space("!outer", ids(&["!inner"])),
        SpaceNode::space("!inner", Vec::<RoomId>::new()),
        SpaceNode::space("!keyed", Vec::<RoomId>::new()).with_order("a"),
        SpaceNode::space("!invited", Vec::<RoomId>::new()).with_membership(Membership::Invited),
        SpaceNode::room("!plain"),
    ]);

    let top = top_level_spaces(&store).unwrap();

    let top_ids: Vec<_> = top.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(top_ids, vec!["!keyed", "!outer"]);
}
