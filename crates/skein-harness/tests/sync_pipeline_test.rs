//! End-to-end sync pipeline tests.
//!
//! A scripted transport feeds deltas into a real session context; the tests
//! check what lands in the store, the typing tracker and the ephemeral
//! buffer, and how the loop reacts to transport failures.

use std::{sync::Arc, time::Duration};

use skein_client::{
    CredentialStore, MemoryCredentials, RegistryConfig, SessionBackend, SessionConfig,
    SessionContext, SessionRegistry, SyncState, SyncStatus,
};
use skein_core::{LocalStore, TransportError};
use skein_harness::{MockBackend, MockTransport, SimEnv};
use skein_proto::{
    AccountParams, EphemeralPayload, EventId, MembershipFilter, Receipt, RoomDelta, RoomId,
    SpaceNode, SyncDelta, SyncToken, UserId,
};
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    transport: Arc<MockTransport>,
    backend: Arc<MockBackend>,
    registry: SessionRegistry<SimEnv>,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = SessionConfig::default()
            .with_data_dir(dir.path())
            .with_sync_timeout(Duration::from_secs(60))
            .with_retry_delay(Duration::from_millis(10))
            .with_auto_start_sync(false);

        let backend = Arc::new(MockBackend::new());
        let transport = backend.transport(&params().session_id());
        let registry = SessionRegistry::new(
            SimEnv::with_seed(3),
            RegistryConfig::new(config),
            Arc::clone(&backend) as Arc<dyn SessionBackend>,
            Arc::new(MemoryCredentials::new()) as Arc<dyn CredentialStore>,
        );

        Self { _dir: dir, transport, backend, registry }
    }

    async fn context(&self) -> Arc<SessionContext<SimEnv>> {
        self.registry.get_or_create(&params()).await.unwrap()
    }
}

fn params() -> AccountParams {
    AccountParams::new("@alice:example.org", "PHONE", "https://example.org", "token")
}

fn typing(users: &[&str]) -> EphemeralPayload {
    EphemeralPayload { typing: users.iter().map(|u| UserId::new(*u)).collect(), receipts: Vec::new() }
}

async fn await_status<F>(context: &SessionContext<SimEnv>, mut pred: F) -> SyncStatus
where
    F: FnMut(&SyncStatus) -> bool,
{
    let mut rx = context.sync_status();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| pred(s)))
        .await
        .expect("sync status did not settle")
        .expect("status channel closed")
        .clone()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn delta_updates_store_typing_and_token() {
    let f = Fixture::new();
    let room = RoomId::new("!room:example.org");
    f.transport.push_delta(SyncDelta::new(
        SyncToken::new("s1"),
        vec![
            RoomDelta {
                room_id: room.clone(),
                node: Some(SpaceNode::room(room.clone())),
                ephemeral: Some(typing(&["@bob:example.org", "@carol:example.org"])),
            },
        ],
    ));

    let context = f.context().await;
    assert!(context.start_sync().await.unwrap());
    let status = await_status(&context, |s| s.cycles >= 1).await;

    assert_eq!(status.token, Some(SyncToken::new("s1")));
    assert_eq!(status.state, SyncState::Syncing);
    assert_eq!(context.store().sync_token().unwrap(), Some(SyncToken::new("s1")));
    assert!(context.store().space_node(&room).unwrap().is_some());
    assert_eq!(
        context.typing().typing_users(&room),
        vec![UserId::new("@bob:example.org"), UserId::new("@carol:example.org")]
    );
    assert_eq!(context.ephemeral_buffer().pending_count().unwrap(), 0);

    context.stop_sync().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn each_request_resumes_from_the_last_token() {
    let f = Fixture::new();
    f.transport.push_delta(SyncDelta::new(SyncToken::new("s1"), Vec::new()));
    f.transport.push_delta(SyncDelta::new(SyncToken::new("s2"), Vec::new()));

    let context = f.context().await;
    context.start_sync().await.unwrap();
    await_status(&context, |s| s.cycles >= 2).await;
    context.stop_sync().await;

    let requests = f.transport.sync_requests();
    assert_eq!(requests[0], None);
    assert_eq!(requests[1], Some(SyncToken::new("s1")));
    assert_eq!(requests[2], Some(SyncToken::new("s2")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn typing_subscribers_see_changes() {
    let f = Fixture::new();
    let room = RoomId::new("!room:example.org");
    let context = f.context().await;
    let mut updates = context.typing().subscribe();

    f.transport.push_delta(SyncDelta::new(
        SyncToken::new("s1"),
        vec![RoomDelta::ephemeral(room.clone(), typing(&["@bob:example.org"]))],
    ));
    f.transport.push_delta(SyncDelta::new(
        SyncToken::new("s2"),
        vec![RoomDelta::ephemeral(room.clone(), typing(&[]))],
    ));
    context.start_sync().await.unwrap();
    await_status(&context, |s| s.cycles >= 2).await;
    context.stop_sync().await;

    let first = updates.recv().await.unwrap();
    let second = updates.recv().await.unwrap();
    assert_eq!(first.room_id, room);
    assert_eq!(first.users, vec![UserId::new("@bob:example.org")]);
    assert!(second.users.is_empty());
    assert!(context.typing().typing_users(&room).is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn receipts_are_drained_from_the_buffer() {
    let f = Fixture::new();
    let room = RoomId::new("!room:example.org");
    let payload = EphemeralPayload {
        typing: Vec::new(),
        receipts: vec![Receipt {
            user_id: UserId::new("@bob:example.org"),
            event_id: EventId::new("$event"),
            timestamp_ms: 1_700_000_000_000,
        }],
    };
    f.transport
        .push_delta(SyncDelta::new(SyncToken::new("s1"), vec![RoomDelta::ephemeral(room.clone(), payload)]));

    let context = f.context().await;
    context.start_sync().await.unwrap();
    await_status(&context, |s| s.cycles >= 1).await;
    context.stop_sync().await;

    assert!(context.ephemeral_buffer().read(&room).is_none());
    assert_eq!(context.ephemeral_buffer().pending_count().unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn transient_errors_are_retried() {
    let f = Fixture::new();
    f.transport.push_error(TransportError::Network { reason: "connection reset".to_string() });
    f.transport.push_error(TransportError::Rejected { status: 503, reason: "busy".to_string() });
    f.transport.push_delta(SyncDelta::new(SyncToken::new("s1"), Vec::new()));

    let context = f.context().await;
    context.start_sync().await.unwrap();
    let status = await_status(&context, |s| s.cycles >= 1).await;
    context.stop_sync().await;

    assert_eq!(status.token, Some(SyncToken::new("s1")));
    assert!(status.last_error.is_none());
    assert_eq!(f.transport.pending_responses(), 0);

    // Retries repeat the same request.
    let requests = f.transport.sync_requests();
    assert_eq!(&requests[..3], &[None, None, None]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rejected_request_fails_the_loop() {
    let f = Fixture::new();
    f.transport.push_error(TransportError::Rejected { status: 401, reason: "unknown token".to_string() });

    let context = f.context().await;
    context.start_sync().await.unwrap();
    let status = await_status(&context, |s| s.state == SyncState::Failed).await;

    assert!(status.last_error.is_some());
    assert_eq!(status.cycles, 0);
    assert!(context.store().sync_token().unwrap().is_none());

    // A failed loop can be restarted once its task has exited.
    tokio::time::timeout(Duration::from_secs(5), async {
        while context.is_syncing().await {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
    f.transport.push_delta(SyncDelta::new(SyncToken::new("s1"), Vec::new()));
    assert!(context.start_sync().await.unwrap());
    await_status(&context, |s| s.cycles >= 1).await;
    context.stop_sync().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_interrupts_a_pending_poll() {
    let f = Fixture::new();
    let context = f.context().await;
    context.start_sync().await.unwrap();

    // Nothing is scripted, so the loop is parked in a 60s long poll.
    tokio::time::timeout(Duration::from_secs(5), async {
        while f.transport.sync_requests().is_empty() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    assert!(tokio::time::timeout(Duration::from_secs(5), context.stop_sync()).await.unwrap());
    assert_eq!(context.sync_status().borrow().state, SyncState::Stopped);
    assert!(!context.is_syncing().await);
    assert!(!context.stop_sync().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn synced_space_changes_reach_hierarchy() {
    let f = Fixture::new();
    let space = RoomId::new("!space:example.org");
    let a = RoomId::new("!a:example.org");
    let b = RoomId::new("!b:example.org");

    let context = f.context().await;
    let hierarchy = context.space_hierarchy(space.clone(), MembershipFilter::default()).unwrap();
    context.start_sync().await.unwrap();

    f.transport.push_delta(SyncDelta::new(
        SyncToken::new("s1"),
        vec![
            RoomDelta::node(SpaceNode::space(space.clone(), [a.clone()])),
            RoomDelta::node(SpaceNode::room(a.clone())),
        ],
    ));
    let mut rx = hierarchy.watch();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.rooms == vec![a.clone()]))
        .await
        .unwrap()
        .unwrap();

    f.transport.push_delta(SyncDelta::new(
        SyncToken::new("s2"),
        vec![
            RoomDelta::node(SpaceNode::space(space.clone(), [a.clone(), b.clone()])),
            RoomDelta::node(SpaceNode::room(b.clone())),
        ],
    ));
    tokio::time::timeout(
        Duration::from_secs(5),
        rx.wait_for(|s| s.rooms == vec![a.clone(), b.clone()]),
    )
    .await
    .unwrap()
    .unwrap();

    context.stop_sync().await;
    assert_eq!(f.backend.open_count(), 1);
}
