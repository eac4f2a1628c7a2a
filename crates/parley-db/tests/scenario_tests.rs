use parley_db::models::{ConversationKind, LeaveOutcome, MessagePayload, MessageStatus};
use parley_db::{CoreError, Database};

fn setup_db() -> Database {
    Database::open_in_memory().expect("memory db")
}

#[test]
fn group_trip_scenario() {
    let db = setup_db();
    let u1 = db.login("user1").unwrap().into_user();
    let u2 = db.login("user2").unwrap().into_user();
    let u3 = db.login("user3").unwrap().into_user();

    let trip = db.create_group(u1.id, "Trip", None, &[u2.id, u3.id]).unwrap();
    let details = db.conversation(trip, u1.id).unwrap();
    assert_eq!(details.kind, ConversationKind::Group);
    assert_eq!(details.members.len(), 3);
    assert!(details.last_message_id.is_none());

    let hi = db
        .send(trip, u1.id, MessagePayload::text("hi").unwrap(), None)
        .unwrap();
    assert_eq!(db.conversation(trip, u2.id).unwrap().last_message_id, Some(hi));

    let receipts = db.receipts(hi, u1.id).unwrap();
    for r in &receipts {
        assert_eq!(r.is_read, r.user_id == u1.id, "receipt for {}", r.username);
    }

    db.mark_conversation_read(trip, u2.id).unwrap();
    assert_eq!(db.message(hi, u1.id).unwrap().status, MessageStatus::Sent);

    db.mark_conversation_read(trip, u3.id).unwrap();
    assert_eq!(db.message(hi, u1.id).unwrap().status, MessageStatus::Read);

    let view = &db.conversation(trip, u3.id).unwrap().messages[0];
    assert_eq!(view.status, MessageStatus::Read);
    assert_eq!(view.sender_username, "user1");
}

#[test]
fn rejected_payload_creates_no_row() {
    let db = setup_db();
    let a = db.login("alice").unwrap().into_user();
    let b = db.login("bob").unwrap().into_user();
    let conv = db.get_or_create_private(a.id, b.id).unwrap().id();

    let bad = MessagePayload::from_parts(Some("hi".into()), Some((vec![1], "image/png".into())));
    assert!(matches!(bad, Err(CoreError::Validation(_))));

    let details = db.conversation(conv, a.id).unwrap();
    assert!(details.messages.is_empty());
    assert!(details.last_message_id.is_none());
}

#[test]
fn group_lifecycle_until_dissolution() {
    let db = setup_db();
    let a = db.login("alice").unwrap().into_user();
    let b = db.login("bob").unwrap().into_user();
    let c = db.login("carol").unwrap().into_user();

    let group = db.create_group(a.id, "Book Club", None, &[b.id]).unwrap();
    db.add_members(group, b.id, &[c.id]).unwrap();
    let msg = db
        .send(group, c.id, MessagePayload::text("joined").unwrap(), None)
        .unwrap();
    db.react(msg, a.id, "🎉").unwrap();

    assert_eq!(
        db.leave(group, c.id).unwrap(),
        LeaveOutcome::Left { remaining: 2 }
    );
    // Carol's message stays after she leaves.
    assert_eq!(db.conversation(group, a.id).unwrap().messages.len(), 1);

    assert_eq!(db.leave(group, a.id).unwrap(), LeaveOutcome::Dissolved);
    assert!(matches!(
        db.conversation(group, b.id),
        Err(CoreError::NotFound(_))
    ));
    assert!(db.conversations_for_user(b.id).unwrap().is_empty());
}

#[test]
fn forwarded_copy_outlives_dissolved_source() {
    let db = setup_db();
    let a = db.login("alice").unwrap().into_user();
    let b = db.login("bob").unwrap().into_user();

    let group = db.create_group(a.id, "Temp", None, &[b.id]).unwrap();
    let dm = db.get_or_create_private(a.id, b.id).unwrap().id();
    let original = db
        .send(group, b.id, MessagePayload::text("keep this").unwrap(), None)
        .unwrap();
    let copy = db.forward(dm, a.id, original).unwrap();

    assert_eq!(db.leave(group, b.id).unwrap(), LeaveOutcome::Dissolved);

    let forwarded = db.message(copy, b.id).unwrap();
    assert!(forwarded.is_forwarded);
    assert_eq!(forwarded.payload.as_text(), Some("keep this"));
    assert_eq!(forwarded.original_message_id, None);
}
