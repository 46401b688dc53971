//! End-to-end collaboration over the in-process relay.
//!
//! Each test wires two `BoardSession`s to one `RelayHub` and a shared
//! `MemoryPersistence`, then drives them the way two browser tabs would.

use std::sync::Arc;
use std::time::Duration;

use board_common::{
    Board, BoardAccess, ChannelEvent, Column, GuestSession, MemberPermission, Task, TaskPatch,
};
use boardsync::activity::{ActivityKind, NotificationKind};
use boardsync::clock::ManualClock;
use boardsync::permission::Actor;
use boardsync::persistence::MemoryPersistence;
use boardsync::relay::{HubTransport, RelayHub};
use boardsync::sync::{InboundOutcome, ReconnectPolicy};
use boardsync::{BoardSession, Mutation, Replica, ReplicaOptions, SyncError};
use chrono::{TimeZone, Utc};

struct Harness {
    clock: Arc<ManualClock>,
    persistence: Arc<MemoryPersistence>,
    transport: Arc<HubTransport>,
}

fn shared_board() -> Board {
    let mut board = Board::new("main-board", "Main");
    let mut todo = Column::new("todo", "To do");
    todo.tasks.push(Task::with_id("t1", "Existing"));
    todo.tasks.push(Task::with_id("t2", "Old"));
    board.columns.push(todo);
    board.columns.push(Column::new("doing", "Doing"));
    board
}

impl Harness {
    fn new() -> Self {
        Self {
            clock: Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap())),
            persistence: Arc::new(MemoryPersistence::with_boards(vec![shared_board()])),
            transport: Arc::new(HubTransport::new(Arc::new(RelayHub::default()))),
        }
    }

    fn session(&self, actor: Actor) -> BoardSession {
        let mut replica = Replica::new(actor, self.clock.clone(), ReplicaOptions::default());
        replica.load(vec![shared_board()], false);
        BoardSession::new(
            replica,
            self.persistence.clone(),
            self.transport.clone(),
            ReconnectPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(4),
            },
        )
    }
}

/// Pull events until one matches `want`, failing after a second of silence.
async fn recv_until(session: &mut BoardSession, want: InboundOutcome) {
    loop {
        let outcome = tokio::time::timeout(Duration::from_secs(1), session.next_event())
            .await
            .expect("timed out waiting for channel event")
            .expect("channel error");
        if outcome == want {
            return;
        }
    }
}

fn column_ids(session: &BoardSession, column: &str) -> Vec<String> {
    session
        .replica()
        .store
        .board("main-board")
        .and_then(|b| b.column(column))
        .map(|c| c.tasks.iter().map(|t| t.id.clone()).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn scenario_a_local_create_is_applied_recorded_and_broadcast() {
    let harness = Harness::new();
    let mut alice = harness.session(Actor::owner("alice"));
    let mut bob = harness.session(Actor::owner("bob"));
    alice.open("main-board").await.unwrap();
    bob.open("main-board").await.unwrap();

    let outcome = alice
        .mutate(Mutation::CreateTask {
            board_id: "main-board".into(),
            column_id: "todo".into(),
            task: Task::with_id("a1", "A"),
        })
        .await
        .unwrap();

    let titles: Vec<_> = alice.replica().store.board("main-board").unwrap().columns[0]
        .tasks
        .iter()
        .filter(|t| t.title == "A")
        .map(|t| t.id.clone())
        .collect();
    assert_eq!(titles, vec!["a1".to_string()]);
    assert_eq!(alice.replica().activity.latest().unwrap().kind, ActivityKind::TaskCreated);

    let envelope = outcome.envelope.unwrap();
    assert_eq!(envelope.actor_id, "alice");
    match envelope.event {
        ChannelEvent::TaskCreated { column_id, task } => {
            assert_eq!(column_id, "todo");
            assert_eq!(task.title, "A");
        }
        other => panic!("unexpected event {:?}", other),
    }

    recv_until(&mut bob, InboundOutcome::Applied("task-created")).await;
    assert_eq!(column_ids(&bob, "todo"), vec!["t1", "t2", "a1"]);
    let notice = bob.replica().notifications.iter().next().unwrap();
    assert_eq!(notice.kind, NotificationKind::Info);
    assert_eq!(harness.persistence.calls(), vec!["create_task"]);
}

#[tokio::test]
async fn scenario_b_move_reaches_peer_and_echo_is_suppressed() {
    let harness = Harness::new();
    let mut x = harness.session(Actor::owner("x"));
    let mut y = harness.session(Actor::owner("y"));
    x.open("main-board").await.unwrap();
    y.open("main-board").await.unwrap();

    x.mutate(Mutation::MoveTask {
        board_id: "main-board".into(),
        task_id: "t1".into(),
        from_column_id: "todo".into(),
        to_column_id: "doing".into(),
        index: 0,
    })
    .await
    .unwrap();
    let x_after_move = x.replica().store.snapshot();

    recv_until(&mut y, InboundOutcome::Applied("task-moved")).await;
    assert_eq!(column_ids(&y, "todo"), vec!["t2"]);
    assert_eq!(column_ids(&y, "doing"), vec!["t1"]);

    // First the echo of x's own join, then the echo of the move.
    recv_until(&mut x, InboundOutcome::Suppressed).await;
    recv_until(&mut x, InboundOutcome::Suppressed).await;
    assert_eq!(x.replica().store.snapshot(), x_after_move);
    assert_eq!(column_ids(&x, "doing"), vec!["t1"]);
}

#[tokio::test]
async fn scenario_c_invite_token_admits_guest() {
    let harness = Harness::new();
    let mut owner = harness.session(Actor::owner("alice"));
    let outcome = owner
        .mutate(Mutation::InviteMember {
            board_id: "main-board".into(),
            email: "guest@x.com".into(),
            permission: MemberPermission::Edit,
        })
        .await
        .unwrap();
    let prepared = outcome.invite.unwrap();
    let payload = boardsync::invite::decode(&prepared.token).unwrap();
    assert_eq!(payload.board_id, "main-board");
    assert_eq!(payload.board_title, "Main");
    assert_eq!(payload.email, "guest@x.com");
    assert_eq!(payload.permission, MemberPermission::Edit);

    let mut guest_tab = harness.session(Actor::owner("scratch"));
    let guest = guest_tab.accept_invite(&prepared.token, Some("Gail")).unwrap();
    assert!(guest.is_guest);
    assert_eq!(guest.access_for("main-board"), Some(MemberPermission::Edit));

    let mut guest_replica = Replica::new(Actor::guest(guest), harness.clock.clone(), ReplicaOptions::default());
    guest_replica.load(vec![shared_board()], false);
    let mut guest = BoardSession::new(
        guest_replica,
        harness.persistence.clone(),
        harness.transport.clone(),
        ReconnectPolicy::default(),
    );
    guest.open("main-board").await.unwrap();
    guest
        .mutate(Mutation::UpdateTask {
            board_id: "main-board".into(),
            task_id: "t1".into(),
            patch: TaskPatch::title("Guest edit"),
        })
        .await
        .unwrap();

    let err = guest
        .mutate(Mutation::DeleteBoard {
            board_id: "main-board".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::PermissionDenied { .. }));
}

#[tokio::test]
async fn scenario_d_rejected_update_rolls_back() {
    let harness = Harness::new();
    let mut alice = harness.session(Actor::owner("alice"));
    let mut bob = harness.session(Actor::owner("bob"));
    alice.open("main-board").await.unwrap();
    bob.open("main-board").await.unwrap();
    let before = alice.replica().store.snapshot();

    harness.persistence.fail_next(1);
    let err = alice
        .mutate(Mutation::UpdateTask {
            board_id: "main-board".into(),
            task_id: "t2".into(),
            patch: TaskPatch::title("New"),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::NetworkFailure { .. }));
    assert_eq!(alice.replica().store.task("main-board", "t2").unwrap().title, "Old");
    assert_eq!(alice.replica().store.snapshot(), before);
    let failure = alice.replica().notifications.iter().next().unwrap();
    assert_eq!(failure.kind, NotificationKind::Error);

    // Nothing was broadcast; the next thing bob sees is a later change.
    alice
        .mutate(Mutation::UpdateTask {
            board_id: "main-board".into(),
            task_id: "t1".into(),
            patch: TaskPatch::title("Later"),
        })
        .await
        .unwrap();
    recv_until(&mut bob, InboundOutcome::Applied("task-updated")).await;
    assert_eq!(bob.replica().store.task("main-board", "t2").unwrap().title, "Old");
    assert_eq!(bob.replica().store.task("main-board", "t1").unwrap().title, "Later");
}

#[tokio::test]
async fn scenario_e_editing_indicator_expires_without_renewal() {
    let harness = Harness::new();
    let mut alice = harness.session(Actor::owner("alice"));
    let mut bob = harness.session(Actor::owner("bob"));
    alice.open("main-board").await.unwrap();
    bob.open("main-board").await.unwrap();

    alice.start_editing("t2").unwrap();
    recv_until(&mut bob, InboundOutcome::Presence("user-activity")).await;

    let now = bob.replica().now();
    let lease = bob.replica().presence.editing_indicator("t2", now).unwrap();
    assert_eq!(lease.actor_id, "alice");

    harness.clock.advance_millis(2_000);
    assert!(bob.tick().is_empty());

    harness.clock.advance_millis(1_500);
    assert_eq!(bob.tick(), vec!["t2".to_string()]);
    let now = bob.replica().now();
    assert!(bob.replica().presence.editing_indicator("t2", now).is_none());
}

#[tokio::test]
async fn peer_presence_follows_join_and_leave() {
    let harness = Harness::new();
    let mut alice = harness.session(Actor::owner("alice"));
    let mut bob = harness.session(Actor::owner("bob"));
    alice.open("main-board").await.unwrap();
    bob.open("main-board").await.unwrap();

    recv_until(&mut alice, InboundOutcome::Presence("user-joined")).await;
    assert!(alice.replica().presence.contains("bob"));

    bob.close();
    recv_until(&mut alice, InboundOutcome::Presence("user-left")).await;
    assert!(!alice.replica().presence.contains("bob"));
    assert!(alice.replica().presence.contains("alice"));
}

#[tokio::test]
async fn view_guest_never_reaches_persistence() {
    let harness = Harness::new();
    let session = GuestSession {
        email: "viewer@x.com".into(),
        name: "Viewer".into(),
        board_access: vec![BoardAccess {
            board_id: "main-board".into(),
            permission: MemberPermission::View,
        }],
        is_guest: true,
        joined_at: Utc::now(),
    };
    let mut viewer = harness.session(Actor::guest(session));
    viewer.open("main-board").await.unwrap();

    let err = viewer
        .mutate(Mutation::CreateTask {
            board_id: "main-board".into(),
            column_id: "todo".into(),
            task: Task::with_id("v1", "Sneaky"),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::PermissionDenied { .. }));
    assert!(harness.persistence.calls().is_empty());
    assert_eq!(column_ids(&viewer, "todo"), vec!["t1", "t2"]);
}

#[tokio::test]
async fn dropped_channel_reconnects_transparently() {
    let harness = Harness::new();
    let mut alice = harness.session(Actor::owner("alice"));
    let mut bob = harness.session(Actor::owner("bob"));
    alice.open("main-board").await.unwrap();
    bob.open("main-board").await.unwrap();

    recv_until(&mut bob, InboundOutcome::Presence("current-users")).await;

    harness.transport.sever("bob");
    // The reconnect delivers a fresh presence snapshot.
    recv_until(&mut bob, InboundOutcome::Presence("current-users")).await;
    assert!(bob.is_connected());

    alice
        .mutate(Mutation::DeleteTask {
            board_id: "main-board".into(),
            task_id: "t1".into(),
        })
        .await
        .unwrap();
    recv_until(&mut bob, InboundOutcome::Applied("task-deleted")).await;
    assert_eq!(column_ids(&bob, "todo"), vec!["t2"]);
}

#[tokio::test]
async fn reconnect_refetches_changes_missed_while_down() {
    let harness = Harness::new();
    let mut alice = harness.session(Actor::owner("alice"));
    let mut bob = harness.session(Actor::owner("bob"));
    alice.open("main-board").await.unwrap();
    bob.open("main-board").await.unwrap();
    recv_until(&mut bob, InboundOutcome::Presence("current-users")).await;

    harness.transport.sever("bob");
    alice
        .mutate(Mutation::CreateTask {
            board_id: "main-board".into(),
            column_id: "doing".into(),
            task: Task::with_id("t9", "Written while bob was away"),
        })
        .await
        .unwrap();

    recv_until(&mut bob, InboundOutcome::Reconnected).await;
    assert_eq!(column_ids(&bob, "doing"), vec!["t9"]);
    assert!(harness.persistence.calls().contains(&"fetch_boards".to_string()));
    assert!(bob.replica().presence.contains("bob"));
}
