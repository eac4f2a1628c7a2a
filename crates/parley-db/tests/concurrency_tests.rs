use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use parley_db::models::{MessagePayload, PrivateConversation};
use parley_db::{CoreError, Database};
use uuid::Uuid;

const WORKERS: usize = 16;

fn open_pool(dir: &tempfile::TempDir) -> Arc<Database> {
    let db = Database::open_with_pool(&dir.path().join("parley.db"), 4).expect("open pool");
    Arc::new(db)
}

/// Callers retry once on `Conflict`, the way the HTTP layer does.
fn resolve(db: &Database, a: Uuid, b: Uuid) -> Uuid {
    match db.get_or_create_private(a, b) {
        Ok(found) => found.id(),
        Err(CoreError::Conflict(_)) => db.get_or_create_private(a, b).expect("re-resolve").id(),
        Err(e) => panic!("unexpected error: {e}"),
    }
}

#[test]
fn concurrent_private_creation_yields_one_conversation() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_pool(&dir);
    let alice = db.login("alice").unwrap().into_user().id;
    let bob = db.login("bob").unwrap().into_user().id;

    let handles: Vec<_> = (0..WORKERS)
        .map(|i| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                if i % 2 == 0 {
                    resolve(&db, alice, bob)
                } else {
                    resolve(&db, bob, alice)
                }
            })
        })
        .collect();

    let ids: HashSet<Uuid> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(ids.len(), 1);

    let previews = db.conversations_for_user(alice).unwrap();
    assert_eq!(previews.len(), 1);
    assert_eq!(Some(&previews[0].id), ids.iter().next());
    assert!(matches!(
        db.get_or_create_private(alice, bob).unwrap(),
        PrivateConversation::Existing(_)
    ));
}

#[test]
fn concurrent_logins_share_one_account() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_pool(&dir);

    let handles: Vec<_> = (0..WORKERS)
        .map(|_| {
            let db = Arc::clone(&db);
            thread::spawn(move || db.login("carol").unwrap().into_user().id)
        })
        .collect();

    let ids: HashSet<Uuid> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(ids.len(), 1);
}

#[test]
fn concurrent_sends_keep_pointer_on_newest_message() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_pool(&dir);
    let alice = db.login("alice").unwrap().into_user().id;
    let bob = db.login("bob").unwrap().into_user().id;
    let conv = db.get_or_create_private(alice, bob).unwrap().id();

    let handles: Vec<_> = (0..WORKERS)
        .map(|i| {
            let db = Arc::clone(&db);
            let sender = if i % 2 == 0 { alice } else { bob };
            thread::spawn(move || {
                let payload = MessagePayload::text(format!("message {i}")).unwrap();
                db.send(conv, sender, payload, None).unwrap()
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let details = db.conversation(conv, alice).unwrap();
    assert_eq!(details.messages.len(), WORKERS);
    assert_eq!(
        details.last_message_id,
        details.messages.last().map(|m| m.id)
    );
    assert!(
        details
            .messages
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp)
    );
}
