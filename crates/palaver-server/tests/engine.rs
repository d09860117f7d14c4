//! End-to-end tests of the event engine, driven through fake sessions
//! registered directly on the hub.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::mpsc;

use palaver_server::engine;
use palaver_server::hub::SessionId;
use palaver_server::presence;
use palaver_server::signaling;
use palaver_server::{AppState, ServerConfig};
use palaver_shared::protocol::{
    CallOffer, DeleteMessage, DeleteType, EditMessage, MessageKind, MessageRef, ReactToMessage,
    SendMessage, ServerEvent,
};
use palaver_shared::types::{ChatId, MessageId, UserId};
use palaver_store::{Chat, ChatMember, Database, Message, MessageState, User};

fn server() -> Arc<AppState> {
    let db = Database::open_in_memory().unwrap();
    AppState::new(ServerConfig::default(), db)
}

async fn seed_user(state: &AppState, name: &str) -> UserId {
    let id = UserId::new();
    let db = state.db.lock().await;
    db.insert_user(&User {
        id,
        email: format!("{name}@example.com"),
        name: name.to_string(),
        avatar_url: None,
        last_seen: None,
        created_at: Utc::now(),
    })
    .unwrap();
    id
}

async fn seed_chat(state: &AppState, members: &[UserId], is_group: bool) -> ChatId {
    let chat_id = ChatId::new();
    let db = state.db.lock().await;
    db.insert_chat(&Chat {
        id: chat_id,
        is_group,
        name: is_group.then(|| "room".to_string()),
        only_admins_can_send: false,
        last_message_id: None,
        created_at: Utc::now(),
    })
    .unwrap();
    for user in members {
        db.add_member(&ChatMember::member(chat_id, *user)).unwrap();
    }
    chat_id
}

/// Register a fake session and join it to the chat.
async fn connect(
    state: &AppState,
    user: UserId,
    chat: ChatId,
) -> (SessionId, mpsc::Receiver<String>) {
    let (tx, rx) = mpsc::channel(64);
    let (session, _) = state.hub.register(user, tx);
    engine::chat_join(state, session, user, chat).await.unwrap();
    (session, rx)
}

fn drain(rx: &mut mpsc::Receiver<String>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        events.push(serde_json::from_str(&frame).unwrap());
    }
    events
}

fn send_payload(chat: ChatId, content: &str) -> SendMessage {
    SendMessage {
        chat_id: chat,
        kind: MessageKind::Text,
        content: Some(content.to_string()),
        url: None,
        reply_to: None,
    }
}

/// Insert a message directly, bypassing the engine, so `created_at` can be
/// backdated for window tests.
async fn seed_message(state: &AppState, chat: ChatId, sender: UserId, age: Duration) -> MessageId {
    let id = MessageId::new();
    let db = state.db.lock().await;
    db.insert_message(&Message {
        id,
        chat_id: chat,
        sender_id: sender,
        kind: MessageKind::Text,
        content: Some("old".into()),
        url: None,
        reply_to: None,
        state: MessageState::Active,
        created_at: Utc::now() - age,
    })
    .unwrap();
    id
}

// ---------------------------------------------------------------------------
// Sending
// ---------------------------------------------------------------------------

#[tokio::test]
async fn send_fans_out_with_seeded_receipts() {
    let state = server();
    let alice = seed_user(&state, "alice").await;
    let bob = seed_user(&state, "bob").await;
    let chat = seed_chat(&state, &[alice, bob], false).await;

    let (a, mut rx_a) = connect(&state, alice, chat).await;
    let (_b, mut rx_b) = connect(&state, bob, chat).await;

    engine::message_send(&state, a, alice, send_payload(chat, "hi"))
        .await
        .unwrap();

    // Both sessions, the sender included, receive the new message.
    for rx in [&mut rx_a, &mut rx_b] {
        let events = drain(rx);
        assert_eq!(events.len(), 1);
        match &events[0] {
            ServerEvent::MessageNew(new) => {
                assert_eq!(new.chat_id, chat);
                assert_eq!(new.message.sender.name, "alice");
                assert_eq!(new.message.content.as_deref(), Some("hi"));
                assert_eq!(new.message.read_by, vec![alice]);
                assert_eq!(new.message.delivered_to, vec![alice]);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    let db = state.db.lock().await;
    let stored = db.get_chat(chat).unwrap();
    assert!(stored.last_message_id.is_some());
    // Sending implies acceptance of the conversation.
    assert!(db.has_accepted(chat, alice).unwrap());
}

#[tokio::test]
async fn send_from_non_member_is_dropped() {
    let state = server();
    let alice = seed_user(&state, "alice").await;
    let mallory = seed_user(&state, "mallory").await;
    let chat = seed_chat(&state, &[alice], false).await;

    let (_a, mut rx_a) = connect(&state, alice, chat).await;
    let (tx, _rx) = mpsc::channel(64);
    let (m, _) = state.hub.register(mallory, tx);

    engine::message_send(&state, m, mallory, send_payload(chat, "intrusion"))
        .await
        .unwrap();

    assert!(drain(&mut rx_a).is_empty());
    let db = state.db.lock().await;
    assert!(db.get_chat(chat).unwrap().last_message_id.is_none());
}

#[tokio::test]
async fn admins_only_group_blocks_plain_members() {
    let state = server();
    let admin = seed_user(&state, "admin").await;
    let member = seed_user(&state, "member").await;

    let chat = ChatId::new();
    {
        let db = state.db.lock().await;
        db.insert_chat(&Chat {
            id: chat,
            is_group: true,
            name: Some("announcements".into()),
            only_admins_can_send: true,
            last_message_id: None,
            created_at: Utc::now(),
        })
        .unwrap();
        db.add_member(&ChatMember::admin(chat, admin)).unwrap();
        db.add_member(&ChatMember::member(chat, member)).unwrap();
    }

    let (a, mut rx_a) = connect(&state, admin, chat).await;
    let (m, _rx_m) = connect(&state, member, chat).await;

    engine::message_send(&state, m, member, send_payload(chat, "me too"))
        .await
        .unwrap();
    assert!(drain(&mut rx_a).is_empty());

    engine::message_send(&state, a, admin, send_payload(chat, "announcement"))
        .await
        .unwrap();
    assert_eq!(drain(&mut rx_a).len(), 1);
}

#[tokio::test]
async fn join_by_non_member_gives_no_room_events() {
    let state = server();
    let alice = seed_user(&state, "alice").await;
    let mallory = seed_user(&state, "mallory").await;
    let chat = seed_chat(&state, &[alice], false).await;

    let (a, _rx_a) = connect(&state, alice, chat).await;
    let (_m, mut rx_m) = connect(&state, mallory, chat).await;

    engine::message_send(&state, a, alice, send_payload(chat, "private"))
        .await
        .unwrap();

    assert!(drain(&mut rx_m).is_empty());
}

#[tokio::test]
async fn reply_carries_original_preview() {
    let state = server();
    let alice = seed_user(&state, "alice").await;
    let bob = seed_user(&state, "bob").await;
    let chat = seed_chat(&state, &[alice, bob], false).await;

    let (a, _rx_a) = connect(&state, alice, chat).await;
    let (b, mut rx_b) = connect(&state, bob, chat).await;

    engine::message_send(&state, a, alice, send_payload(chat, "original"))
        .await
        .unwrap();
    let original_id = match drain(&mut rx_b).pop().unwrap() {
        ServerEvent::MessageNew(new) => new.message.id,
        other => panic!("unexpected event: {other:?}"),
    };

    let mut reply = send_payload(chat, "response");
    reply.reply_to = Some(original_id);
    engine::message_send(&state, b, bob, reply).await.unwrap();

    match drain(&mut rx_b).pop().unwrap() {
        ServerEvent::MessageNew(new) => {
            let preview = new.message.reply_to.unwrap();
            assert_eq!(preview.id, original_id);
            assert_eq!(preview.content.as_deref(), Some("original"));
            assert_eq!(preview.sender_name, "alice");
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Receipts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn read_receipt_excludes_actor_and_is_idempotent() {
    let state = server();
    let alice = seed_user(&state, "alice").await;
    let bob = seed_user(&state, "bob").await;
    let chat = seed_chat(&state, &[alice, bob], false).await;

    let (_a, mut rx_a) = connect(&state, alice, chat).await;
    let (b, mut rx_b) = connect(&state, bob, chat).await;
    let message_id = seed_message(&state, chat, alice, Duration::seconds(5)).await;

    let payload = MessageRef { message_id, chat_id: chat };
    engine::message_read(&state, b, bob, payload.clone()).await.unwrap();
    engine::message_read(&state, b, bob, payload).await.unwrap();

    let events = drain(&mut rx_a);
    assert_eq!(events.len(), 1);
    match &events[0] {
        ServerEvent::MessageRead(receipt) => {
            assert_eq!(receipt.message_id, message_id);
            assert_eq!(receipt.user_id, bob);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(drain(&mut rx_b).is_empty());
}

#[tokio::test]
async fn delivered_receipt_for_unknown_message_is_dropped() {
    let state = server();
    let alice = seed_user(&state, "alice").await;
    let chat = seed_chat(&state, &[alice], false).await;
    let (a, mut rx_a) = connect(&state, alice, chat).await;

    let payload = MessageRef {
        message_id: MessageId::new(),
        chat_id: chat,
    };
    engine::message_delivered(&state, a, alice, payload).await.unwrap();
    assert!(drain(&mut rx_a).is_empty());
}

// ---------------------------------------------------------------------------
// Reactions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reaction_reaches_actor_and_replaces_previous() {
    let state = server();
    let alice = seed_user(&state, "alice").await;
    let bob = seed_user(&state, "bob").await;
    let chat = seed_chat(&state, &[alice, bob], false).await;

    let (_a, mut rx_a) = connect(&state, alice, chat).await;
    let (b, mut rx_b) = connect(&state, bob, chat).await;
    let message_id = seed_message(&state, chat, alice, Duration::seconds(5)).await;

    for emoji in ["👍", "🔥"] {
        engine::message_react(
            &state,
            b,
            bob,
            ReactToMessage {
                message_id,
                chat_id: chat,
                emoji: emoji.to_string(),
            },
        )
        .await
        .unwrap();
    }

    // Unlike receipts, reactions echo back to the actor too.
    for rx in [&mut rx_a, &mut rx_b] {
        let events = drain(rx);
        assert_eq!(events.len(), 2);
        match &events[1] {
            ServerEvent::MessageReact(r) => assert_eq!(r.emoji, "🔥"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    let db = state.db.lock().await;
    let reactions = db.reactions_for_message(message_id).unwrap();
    assert_eq!(reactions.len(), 1);
    assert_eq!(reactions[0].emoji, "🔥");
}

// ---------------------------------------------------------------------------
// Edits
// ---------------------------------------------------------------------------

#[tokio::test]
async fn edit_within_window_updates_and_fans_out() {
    let state = server();
    let alice = seed_user(&state, "alice").await;
    let bob = seed_user(&state, "bob").await;
    let chat = seed_chat(&state, &[alice, bob], false).await;

    let (a, _rx_a) = connect(&state, alice, chat).await;
    let (_b, mut rx_b) = connect(&state, bob, chat).await;
    let message_id = seed_message(&state, chat, alice, Duration::seconds(30)).await;

    engine::message_edit(
        &state,
        a,
        alice,
        EditMessage {
            message_id,
            chat_id: chat,
            content: "  fixed  ".into(),
        },
    )
    .await
    .unwrap();

    match drain(&mut rx_b).pop().unwrap() {
        ServerEvent::MessageEdited(edited) => {
            assert_eq!(edited.content, "fixed");
            assert!(edited.is_edited);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    let db = state.db.lock().await;
    let stored = db.get_message(message_id).unwrap();
    assert_eq!(stored.content.as_deref(), Some("fixed"));
    assert!(matches!(stored.state, MessageState::Edited { .. }));
}

#[tokio::test]
async fn edit_past_window_errors_to_actor_only() {
    let state = server();
    let alice = seed_user(&state, "alice").await;
    let bob = seed_user(&state, "bob").await;
    let chat = seed_chat(&state, &[alice, bob], false).await;

    let (a, mut rx_a) = connect(&state, alice, chat).await;
    let (_b, mut rx_b) = connect(&state, bob, chat).await;
    let message_id = seed_message(&state, chat, alice, Duration::minutes(3)).await;

    engine::message_edit(
        &state,
        a,
        alice,
        EditMessage {
            message_id,
            chat_id: chat,
            content: "too late".into(),
        },
    )
    .await
    .unwrap();

    match drain(&mut rx_a).pop().unwrap() {
        ServerEvent::Error(e) => {
            assert_eq!(e.message, "Can only edit messages within 2 minutes")
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(drain(&mut rx_b).is_empty());

    let db = state.db.lock().await;
    assert_eq!(db.get_message(message_id).unwrap().content.as_deref(), Some("old"));
}

#[tokio::test]
async fn edit_by_non_sender_is_dropped() {
    let state = server();
    let alice = seed_user(&state, "alice").await;
    let bob = seed_user(&state, "bob").await;
    let chat = seed_chat(&state, &[alice, bob], false).await;

    let (_a, mut rx_a) = connect(&state, alice, chat).await;
    let (b, mut rx_b) = connect(&state, bob, chat).await;
    let message_id = seed_message(&state, chat, alice, Duration::seconds(5)).await;

    engine::message_edit(
        &state,
        b,
        bob,
        EditMessage {
            message_id,
            chat_id: chat,
            content: "hijack".into(),
        },
    )
    .await
    .unwrap();

    assert!(drain(&mut rx_a).is_empty());
    assert!(drain(&mut rx_b).is_empty());
}

// ---------------------------------------------------------------------------
// Deletes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delete_for_me_confirms_only_to_actor() {
    let state = server();
    let alice = seed_user(&state, "alice").await;
    let bob = seed_user(&state, "bob").await;
    let chat = seed_chat(&state, &[alice, bob], false).await;

    let (a, mut rx_a) = connect(&state, alice, chat).await;
    let (_b, mut rx_b) = connect(&state, bob, chat).await;
    let message_id = seed_message(&state, chat, alice, Duration::minutes(10)).await;

    // Unlike forEveryone, forMe is not bound by the 2-minute window.
    engine::message_delete(
        &state,
        a,
        alice,
        DeleteMessage {
            message_id,
            chat_id: chat,
            delete_type: DeleteType::ForMe,
        },
    )
    .await
    .unwrap();

    assert!(drain(&mut rx_b).is_empty());
    match drain(&mut rx_a).pop().unwrap() {
        ServerEvent::MessageDeleted(deleted) => {
            assert_eq!(deleted.delete_type, DeleteType::ForMe);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // The record itself is untouched.
    let db = state.db.lock().await;
    assert_eq!(db.get_message(message_id).unwrap().state, MessageState::Active);
}

#[tokio::test]
async fn delete_by_non_sender_is_dropped() {
    let state = server();
    let alice = seed_user(&state, "alice").await;
    let bob = seed_user(&state, "bob").await;
    let chat = seed_chat(&state, &[alice, bob], false).await;

    let (_a, mut rx_a) = connect(&state, alice, chat).await;
    let (b, mut rx_b) = connect(&state, bob, chat).await;
    let message_id = seed_message(&state, chat, alice, Duration::seconds(5)).await;

    for delete_type in [DeleteType::ForMe, DeleteType::ForEveryone] {
        engine::message_delete(
            &state,
            b,
            bob,
            DeleteMessage {
                message_id,
                chat_id: chat,
                delete_type,
            },
        )
        .await
        .unwrap();
    }

    assert!(drain(&mut rx_a).is_empty());
    assert!(drain(&mut rx_b).is_empty());
}

#[tokio::test]
async fn delete_for_everyone_tombstones_within_window() {
    let state = server();
    let alice = seed_user(&state, "alice").await;
    let bob = seed_user(&state, "bob").await;
    let chat = seed_chat(&state, &[alice, bob], false).await;

    let (a, _rx_a) = connect(&state, alice, chat).await;
    let (_b, mut rx_b) = connect(&state, bob, chat).await;
    let message_id = seed_message(&state, chat, alice, Duration::seconds(30)).await;

    engine::message_delete(
        &state,
        a,
        alice,
        DeleteMessage {
            message_id,
            chat_id: chat,
            delete_type: DeleteType::ForEveryone,
        },
    )
    .await
    .unwrap();

    match drain(&mut rx_b).pop().unwrap() {
        ServerEvent::MessageDeleted(deleted) => {
            assert_eq!(deleted.delete_type, DeleteType::ForEveryone);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    let db = state.db.lock().await;
    let stored = db.get_message(message_id).unwrap();
    assert_eq!(stored.state, MessageState::Deleted);
    assert_eq!(stored.content.as_deref(), Some("This message was deleted"));
}

#[tokio::test]
async fn delete_for_everyone_past_window_errors() {
    let state = server();
    let alice = seed_user(&state, "alice").await;
    let chat = seed_chat(&state, &[alice], false).await;

    let (a, mut rx_a) = connect(&state, alice, chat).await;
    let message_id = seed_message(&state, chat, alice, Duration::minutes(3)).await;

    engine::message_delete(
        &state,
        a,
        alice,
        DeleteMessage {
            message_id,
            chat_id: chat,
            delete_type: DeleteType::ForEveryone,
        },
    )
    .await
    .unwrap();

    match drain(&mut rx_a).pop().unwrap() {
        ServerEvent::Error(e) => {
            assert_eq!(e.message, "Can only delete for everyone within 2 minutes")
        }
        other => panic!("unexpected event: {other:?}"),
    }

    let db = state.db.lock().await;
    assert_eq!(db.get_message(message_id).unwrap().state, MessageState::Active);
}

// ---------------------------------------------------------------------------
// Typing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn typing_relays_to_other_members_only() {
    let state = server();
    let alice = seed_user(&state, "alice").await;
    let bob = seed_user(&state, "bob").await;
    let chat = seed_chat(&state, &[alice, bob], false).await;

    let (a, mut rx_a) = connect(&state, alice, chat).await;
    let (_b, mut rx_b) = connect(&state, bob, chat).await;

    engine::typing(&state, a, alice, chat, true);
    engine::typing(&state, a, alice, chat, false);

    assert!(drain(&mut rx_a).is_empty());
    let events = drain(&mut rx_b);
    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], ServerEvent::TypingStart(t) if t.user_id == alice));
    assert!(matches!(&events[1], ServerEvent::TypingStop(t) if t.chat_id == chat));
}

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn presence_transitions_fire_once_per_user() {
    let state = server();
    let alice = seed_user(&state, "alice").await;
    let bob = seed_user(&state, "bob").await;

    // Bob is already connected and observes Alice's transitions.
    let (tx, mut rx_bob) = mpsc::channel(64);
    let (bob_session, n) = state.hub.register(bob, tx);
    presence::session_connected(&state, bob_session, bob, n).await;
    drain(&mut rx_bob);

    // Alice opens two sessions.
    let (tx, mut rx_a1) = mpsc::channel(64);
    let (a1, n1) = state.hub.register(alice, tx);
    presence::session_connected(&state, a1, alice, n1).await;

    let (tx, _rx_a2) = mpsc::channel(64);
    let (a2, n2) = state.hub.register(alice, tx);
    presence::session_connected(&state, a2, alice, n2).await;

    let online: Vec<_> = drain(&mut rx_bob)
        .into_iter()
        .filter(|e| matches!(e, ServerEvent::UserOnline(p) if p.user_id == alice))
        .collect();
    assert_eq!(online.len(), 1, "online broadcast once despite two sessions");

    // The first session got the online snapshot including Bob.
    let events = drain(&mut rx_a1);
    assert!(events.iter().any(|e| matches!(
        e,
        ServerEvent::OnlineUsers(users) if users.contains(&bob)
    )));

    // Closing the first session keeps Alice online.
    presence::session_disconnected(&state, a1).await;
    assert!(drain(&mut rx_bob).is_empty());
    assert!(state.hub.is_online(alice));

    // Closing the last session broadcasts offline with a last_seen stamp.
    presence::session_disconnected(&state, a2).await;
    let events = drain(&mut rx_bob);
    assert_eq!(events.len(), 1);
    match &events[0] {
        ServerEvent::UserOffline(p) => assert_eq!(p.user_id, alice),
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(!state.hub.is_online(alice));

    let db = state.db.lock().await;
    assert!(db.get_user(alice).unwrap().last_seen.is_some());
}

// ---------------------------------------------------------------------------
// Call signaling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn call_to_offline_user_fails_fast() {
    let state = server();
    let alice = seed_user(&state, "alice").await;
    let bob = seed_user(&state, "bob").await;

    let (tx, mut rx_a) = mpsc::channel(64);
    let (a, _) = state.hub.register(alice, tx);

    signaling::call_start(
        &state,
        a,
        alice,
        CallOffer {
            to_user_id: bob,
            offer: serde_json::json!({"sdp": "v=0"}),
        },
    );

    match drain(&mut rx_a).pop().unwrap() {
        ServerEvent::CallFailed(e) => assert_eq!(e.message, "User is offline"),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn call_offer_reaches_every_callee_session() {
    let state = server();
    let alice = seed_user(&state, "alice").await;
    let bob = seed_user(&state, "bob").await;

    let (tx, mut rx_a) = mpsc::channel(64);
    let (a, _) = state.hub.register(alice, tx);
    let (tx, mut rx_b1) = mpsc::channel(64);
    state.hub.register(bob, tx);
    let (tx, mut rx_b2) = mpsc::channel(64);
    state.hub.register(bob, tx);

    signaling::call_start(
        &state,
        a,
        alice,
        CallOffer {
            to_user_id: bob,
            offer: serde_json::json!({"sdp": "v=0"}),
        },
    );

    for rx in [&mut rx_b1, &mut rx_b2] {
        match drain(rx).pop().unwrap() {
            ServerEvent::CallIncoming(incoming) => assert_eq!(incoming.from, alice),
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert!(drain(&mut rx_a).is_empty());
}
