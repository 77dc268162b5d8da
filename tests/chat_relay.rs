//! Chat routing scenarios.
//!
//! These tests drive the router directly with in-memory sessions and read
//! what each session would have sent from its outbound queue.

use std::sync::Arc;

use chatrelay::chat::{
    Channel, ChatLogRepository, ChatRouter, DbDirectory, GroupEvent, GroupRegistry,
    HistoryStore, MessageScope, NewChatMessage, RoutingKey, ServerFrame, Session, SessionState,
    UserIdentity,
};
use chatrelay::datetime::to_storage;
use chatrelay::db::{Database, NewUser, RoomRepository, Tier, UserRepository};
use chatrelay::RelayError;
use chrono::{Duration, Utc};
use tokio::sync::mpsc;

type Events = mpsc::Receiver<Arc<GroupEvent>>;

struct Harness {
    db: Database,
    router: ChatRouter,
    store: ChatLogRepository,
}

impl Harness {
    async fn new() -> Self {
        let db = Database::open_in_memory()
            .await
            .expect("Failed to create test database");
        let store = ChatLogRepository::new(db.pool().clone());
        let directory = Arc::new(DbDirectory::new(db.pool().clone()));
        let router = ChatRouter::new(
            Arc::new(GroupRegistry::new()),
            Arc::new(store.clone()),
            directory.clone(),
            directory,
        );
        Self { db, router, store }
    }

    async fn user(&self, name: &str, tier: Tier) -> UserIdentity {
        UserRepository::new(self.db.pool())
            .create(&NewUser::new(name).with_tier(tier))
            .await
            .unwrap()
            .into()
    }

    async fn room(&self, name: &str, members: &[&UserIdentity]) -> String {
        let rooms = RoomRepository::new(self.db.pool());
        let room = rooms.get_or_create(name).await.unwrap();
        for member in members {
            rooms.add_member(room.id, member.id).await.unwrap();
        }
        room.name
    }

    async fn backdate(&self, id: i64, hours: i64) {
        sqlx::query("UPDATE chat_messages SET created_at = ? WHERE id = ?")
            .bind(to_storage(&(Utc::now() - Duration::hours(hours))))
            .bind(id)
            .execute(self.db.pool())
            .await
            .unwrap();
    }

    async fn join_room(&self, identity: Option<UserIdentity>, room: &str) -> (Session, Events) {
        let (mut session, events) = self.router.open_session(
            identity,
            Channel::Room {
                name: room.to_string(),
            },
        );
        self.router.connect(&mut session).await.unwrap();
        (session, events)
    }

    async fn join_direct(&self, me: &UserIdentity, peer: &UserIdentity) -> (Session, Events) {
        let (mut session, events) = self.router.open_session(
            Some(me.clone()),
            Channel::Direct { peer: peer.clone() },
        );
        self.router.connect(&mut session).await.unwrap();
        (session, events)
    }
}

/// Drain queued events into the frames the session would send.
fn drain(session: &Session, events: &mut Events) -> Vec<ServerFrame> {
    let mut frames = Vec::new();
    while let Ok(event) = events.try_recv() {
        if session.accepts(&event) {
            frames.push(session.render(&event, Utc::now(), &chrono_tz::Tz::UTC));
        }
    }
    frames
}

fn snapshot_ids(frame: &ServerFrame) -> Vec<i64> {
    match frame {
        ServerFrame::Snapshot { messages } => messages.iter().map(|m| m.message_id).collect(),
        other => panic!("Expected snapshot, got {other:?}"),
    }
}

// ============================================================================
// Room scenarios
// ============================================================================

#[tokio::test]
async fn test_room_message_and_delete_between_two_sessions() {
    let h = Harness::new().await;
    let alice = h.user("alice", Tier::Standard).await;
    let bob = h.user("bob", Tier::Standard).await;
    let room = h.room("test", &[&alice, &bob]).await;
    assert_eq!(room, "Test");

    let (a, mut a_events) = h.join_room(Some(alice.clone()), &room).await;
    let (b, mut b_events) = h.join_room(Some(bob.clone()), &room).await;

    h.router
        .handle_text(&a, r#"{"type":"message","message":"hi","username":"alice"}"#)
        .await
        .unwrap();

    let a_frames = drain(&a, &mut a_events);
    let b_frames = drain(&b, &mut b_events);
    assert_eq!(a_frames.len(), 1);
    assert_eq!(b_frames.len(), 1);

    let message_id = match (&a_frames[0], &b_frames[0]) {
        (ServerFrame::Message(x), ServerFrame::Message(y)) => {
            assert_eq!(x.message_id, y.message_id);
            assert_eq!(x.username, "alice");
            assert_eq!(x.message, "hi");
            x.message_id
        }
        other => panic!("Expected live messages, got {other:?}"),
    };

    h.router
        .handle_text(
            &b,
            &format!(r#"{{"type":"delete","message_id":{message_id}}}"#),
        )
        .await
        .unwrap();

    let a_frames = drain(&a, &mut a_events);
    let b_frames = drain(&b, &mut b_events);
    assert_eq!(a_frames.len(), 1);
    assert_eq!(b_frames.len(), 1);
    assert!(snapshot_ids(&a_frames[0]).is_empty());
    assert!(snapshot_ids(&b_frames[0]).is_empty());
}

#[tokio::test]
async fn test_room_connect_sends_windowed_history() {
    let h = Harness::new().await;
    let basic = h.user("basic", Tier::Standard).await;
    let pro = h.user("pro", Tier::Privileged).await;
    let room = h.room("history", &[&basic, &pro]).await;

    let old = h
        .store
        .append(NewChatMessage::room(room.as_str(), None, "x", "old"))
        .await
        .unwrap();
    let recent = h
        .store
        .append(NewChatMessage::room(room.as_str(), None, "x", "recent"))
        .await
        .unwrap();
    h.backdate(old.id, 25).await;
    h.backdate(recent.id, 1).await;

    let (mut s, _events) = h.router.open_session(
        Some(basic.clone()),
        Channel::Room { name: room.clone() },
    );
    let snapshot = h.router.connect(&mut s).await.unwrap();
    assert_eq!(snapshot_ids(&snapshot), vec![recent.id]);

    let (mut s, _events) =
        h.router
            .open_session(Some(pro.clone()), Channel::Room { name: room.clone() });
    let snapshot = h.router.connect(&mut s).await.unwrap();
    assert_eq!(snapshot_ids(&snapshot), vec![old.id, recent.id]);

    let (mut s, _events) = h.router.open_session(None, Channel::Room { name: room });
    let snapshot = h.router.connect(&mut s).await.unwrap();
    assert!(snapshot_ids(&snapshot).is_empty());
}

#[tokio::test]
async fn test_snapshot_after_delete_uses_deleter_tier() {
    let h = Harness::new().await;
    let basic = h.user("basic", Tier::Standard).await;
    let pro = h.user("pro", Tier::Privileged).await;
    let room = h.room("tiers", &[&basic, &pro]).await;

    let old = h
        .store
        .append(NewChatMessage::room(room.as_str(), None, "x", "old"))
        .await
        .unwrap();
    let doomed = h
        .store
        .append(NewChatMessage::room(room.as_str(), None, "x", "doomed"))
        .await
        .unwrap();
    h.backdate(old.id, 30).await;

    let (basic_session, mut basic_events) = h.join_room(Some(basic.clone()), &room).await;
    let (pro_session, mut pro_events) = h.join_room(Some(pro.clone()), &room).await;

    assert!(h.router.submit_delete(&basic_session, doomed.id).await.unwrap());

    // Both receive the deleter's view, which hides the 30h-old message.
    let pro_frames = drain(&pro_session, &mut pro_events);
    assert_eq!(pro_frames.len(), 1);
    assert!(snapshot_ids(&pro_frames[0]).is_empty());
    assert_eq!(drain(&basic_session, &mut basic_events).len(), 1);
}

#[tokio::test]
async fn test_non_member_gets_no_room_history() {
    let h = Harness::new().await;
    let alice = h.user("alice", Tier::Standard).await;
    let mallory = h.user("mallory", Tier::Privileged).await;
    let room = h.room("secret", &[&alice]).await;

    let (alice_session, _alice_events) = h.join_room(Some(alice.clone()), &room).await;
    let posted = h
        .router
        .submit_room_message(&alice_session, "alice", "members only")
        .await
        .unwrap();

    let (mut outsider, _events) = h.router.open_session(
        Some(mallory.clone()),
        Channel::Room { name: room.clone() },
    );
    let snapshot = h.router.connect(&mut outsider).await.unwrap();
    assert!(snapshot_ids(&snapshot).is_empty());
    assert!(h
        .router
        .history(Some(&mallory), &MessageScope::room(room.as_str()))
        .await
        .unwrap()
        .is_empty());

    let (mut member, _events) = h
        .router
        .open_session(Some(alice.clone()), Channel::Room { name: room });
    let snapshot = h.router.connect(&mut member).await.unwrap();
    assert_eq!(snapshot_ids(&snapshot), vec![posted.id]);
}

#[tokio::test]
async fn test_snapshot_after_delete_is_narrowed_per_recipient() {
    let h = Harness::new().await;
    let pro = h.user("pro", Tier::Privileged).await;
    let basic = h.user("basic", Tier::Standard).await;
    let outsider = h.user("outsider", Tier::Privileged).await;
    let room = h.room("tiers", &[&pro, &basic]).await;

    let old = h
        .store
        .append(NewChatMessage::room(room.as_str(), None, "x", "old"))
        .await
        .unwrap();
    let recent = h
        .store
        .append(NewChatMessage::room(room.as_str(), None, "x", "recent"))
        .await
        .unwrap();
    let doomed = h
        .store
        .append(NewChatMessage::room(room.as_str(), None, "x", "doomed"))
        .await
        .unwrap();
    h.backdate(old.id, 30).await;

    let (pro_session, mut pro_events) = h.join_room(Some(pro.clone()), &room).await;
    let (basic_session, mut basic_events) = h.join_room(Some(basic.clone()), &room).await;
    let (guest, mut guest_events) = h.join_room(None, &room).await;
    let (outsider_session, mut outsider_events) = h.join_room(Some(outsider), &room).await;

    assert!(h.router.submit_delete(&pro_session, doomed.id).await.unwrap());

    let frames = drain(&pro_session, &mut pro_events);
    assert_eq!(snapshot_ids(&frames[0]), vec![old.id, recent.id]);
    let frames = drain(&basic_session, &mut basic_events);
    assert_eq!(snapshot_ids(&frames[0]), vec![recent.id]);
    let frames = drain(&guest, &mut guest_events);
    assert!(snapshot_ids(&frames[0]).is_empty());
    let frames = drain(&outsider_session, &mut outsider_events);
    assert!(snapshot_ids(&frames[0]).is_empty());
}

#[tokio::test]
async fn test_delete_twice_is_a_noop_but_resyncs() {
    let h = Harness::new().await;
    let alice = h.user("alice", Tier::Standard).await;
    let room = h.room("test", &[&alice]).await;
    let (session, mut events) = h.join_room(Some(alice.clone()), &room).await;

    let message = h
        .router
        .submit_room_message(&session, "alice", "bye")
        .await
        .unwrap();
    drain(&session, &mut events);

    assert!(h.router.submit_delete(&session, message.id).await.unwrap());
    assert!(!h.router.submit_delete(&session, message.id).await.unwrap());

    let frames = drain(&session, &mut events);
    assert_eq!(frames.len(), 2);
    assert!(frames.iter().all(|f| snapshot_ids(f).is_empty()));
}

#[tokio::test]
async fn test_invalid_frames_are_dropped() {
    let h = Harness::new().await;
    let room = h.room("test", &[]).await;
    let (session, mut events) = h.join_room(None, &room).await;

    let cases = [
        "not json",
        r#"{"type":"typing"}"#,
        r#"{"type":"message","message":"","username":"a"}"#,
        r#"{"type":"message","username":"a"}"#,
        r#"{"type":"delete"}"#,
    ];
    for text in cases {
        assert!(h.router.handle_text(&session, text).await.is_err());
    }

    assert!(drain(&session, &mut events).is_empty());
    assert!(h
        .store
        .query_scope(&MessageScope::room(room.as_str()), None)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(session.state(), SessionState::Joined);
}

#[tokio::test]
async fn test_leave_stops_delivery() {
    let h = Harness::new().await;
    let room = h.room("test", &[]).await;
    let (sender, _sender_events) = h.join_room(None, &room).await;
    let (mut leaver, mut leaver_events) = h.join_room(None, &room).await;

    h.router.close(&mut leaver).await;
    h.router
        .submit_room_message(&sender, "guest", "anyone?")
        .await
        .unwrap();

    assert!(leaver_events.try_recv().is_err());
    assert_eq!(
        h.router
            .registry()
            .group_size(&RoutingKey::Room(room))
            .await,
        1
    );
}

#[tokio::test]
async fn test_rooms_do_not_leak() {
    let h = Harness::new().await;
    let alpha = h.room("alpha", &[]).await;
    let beta = h.room("beta", &[]).await;
    let (a, _a_events) = h.join_room(None, &alpha).await;
    let (b, mut b_events) = h.join_room(None, &beta).await;

    h.router
        .submit_room_message(&a, "guest", "alpha only")
        .await
        .unwrap();
    assert!(drain(&b, &mut b_events).is_empty());
}

// ============================================================================
// Direct message scenarios
// ============================================================================

#[tokio::test]
async fn test_direct_message_reaches_both_inboxes() {
    let h = Harness::new().await;
    let bob = h.user("bob", Tier::Standard).await;
    let alice = h.user("alice", Tier::Standard).await;

    let (bob_session, mut bob_events) = h.join_direct(&bob, &alice).await;
    let (alice_session, mut alice_events) = h.join_direct(&alice, &bob).await;

    h.router
        .handle_text(
            &bob_session,
            r#"{"type":"message","message":"hey","receiver":"alice"}"#,
        )
        .await
        .unwrap();

    for frames in [
        drain(&bob_session, &mut bob_events),
        drain(&alice_session, &mut alice_events),
    ] {
        assert_eq!(frames.len(), 1);
        match &frames[0] {
            ServerFrame::Message(entry) => {
                assert_eq!(entry.username, "bob");
                assert_eq!(entry.message, "hey");
            }
            other => panic!("Expected live message, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_direct_conversations_are_filtered_per_session() {
    let h = Harness::new().await;
    let bob = h.user("bob", Tier::Standard).await;
    let alice = h.user("alice", Tier::Standard).await;
    let dave = h.user("dave", Tier::Standard).await;

    // Bob has two conversations open; both share his inbox.
    let (with_alice, mut alice_events) = h.join_direct(&bob, &alice).await;
    let (with_dave, mut dave_events) = h.join_direct(&bob, &dave).await;

    h.router
        .submit_direct_message(&with_alice, "alice", "for alice")
        .await
        .unwrap();

    assert_eq!(drain(&with_alice, &mut alice_events).len(), 1);
    assert!(drain(&with_dave, &mut dave_events).is_empty());
}

#[tokio::test]
async fn test_direct_history_is_symmetric() {
    let h = Harness::new().await;
    let bob = h.user("bob", Tier::Standard).await;
    let alice = h.user("alice", Tier::Standard).await;

    let (bob_session, _bob_events) = h.join_direct(&bob, &alice).await;
    let (alice_session, _alice_events) = h.join_direct(&alice, &bob).await;
    let first = h
        .router
        .submit_direct_message(&bob_session, "alice", "one")
        .await
        .unwrap();
    let second = h
        .router
        .submit_direct_message(&alice_session, "bob", "two")
        .await
        .unwrap();

    let (mut late, _late_events) =
        h.router
            .open_session(Some(alice.clone()), Channel::Direct { peer: bob.clone() });
    let snapshot = h.router.connect(&mut late).await.unwrap();
    assert_eq!(snapshot_ids(&snapshot), vec![first.id, second.id]);
}

#[tokio::test]
async fn test_direct_message_to_unknown_receiver() {
    let h = Harness::new().await;
    let bob = h.user("bob", Tier::Standard).await;
    let alice = h.user("alice", Tier::Standard).await;
    let (session, mut events) = h.join_direct(&bob, &alice).await;

    let result = h
        .router
        .submit_direct_message(&session, "carol", "hello?")
        .await;
    assert!(matches!(result, Err(RelayError::NotFound(_))));
    assert!(drain(&session, &mut events).is_empty());
}

#[tokio::test]
async fn test_direct_peer_missing_is_refused_without_session() {
    let h = Harness::new().await;
    let bob = h.user("bob", Tier::Standard).await;

    let result = h.router.resolve_peer(Some(&bob), "carol").await;
    assert!(matches!(result, Err(RelayError::NotFound(_))));
    assert_eq!(h.router.registry().group_count().await, 0);
}

#[tokio::test]
async fn test_direct_delete_resyncs_both_participants() {
    let h = Harness::new().await;
    let bob = h.user("bob", Tier::Standard).await;
    let alice = h.user("alice", Tier::Standard).await;

    let (bob_session, mut bob_events) = h.join_direct(&bob, &alice).await;
    let (alice_session, mut alice_events) = h.join_direct(&alice, &bob).await;
    let keep = h
        .router
        .submit_direct_message(&bob_session, "alice", "keep")
        .await
        .unwrap();
    let doomed = h
        .router
        .submit_direct_message(&bob_session, "alice", "drop")
        .await
        .unwrap();
    drain(&bob_session, &mut bob_events);
    drain(&alice_session, &mut alice_events);

    assert!(h.router.submit_delete(&alice_session, doomed.id).await.unwrap());

    for frames in [
        drain(&bob_session, &mut bob_events),
        drain(&alice_session, &mut alice_events),
    ] {
        assert_eq!(frames.len(), 1);
        assert_eq!(snapshot_ids(&frames[0]), vec![keep.id]);
    }
}
