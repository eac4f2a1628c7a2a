use std::collections::HashMap;

use chrono::Utc;
use rusqlite::{Connection, params};
use tracing::debug;
use uuid::Uuid;

use crate::membership::require_member;
use crate::messages::query_message;
use crate::models::ReactionView;
use crate::{CoreError, Database, Result};

impl Database {
    // -- Reactions --

    /// Set the user's reaction on a message, replacing any previous one.
    pub fn react(&self, message_id: Uuid, user_id: Uuid, emoticon: &str) -> Result<()> {
        let emoticon = emoticon.trim();
        if emoticon.is_empty() {
            return Err(CoreError::Validation("emoticon is empty".into()));
        }

        self.with_conn_mut(|conn| {
            let message = query_message(conn, message_id)?
                .filter(|m| !m.is_deleted)
                .ok_or_else(|| CoreError::NotFound(format!("message {}", message_id)))?;
            require_member(conn, message.conversation_id, user_id)?;

            conn.execute(
                "INSERT INTO reactions (message_id, user_id, emoticon, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (message_id, user_id)
                 DO UPDATE SET emoticon = excluded.emoticon, created_at = excluded.created_at",
                params![message_id, user_id, emoticon, Utc::now()],
            )?;
            debug!("User {} reacted {} on {}", user_id, emoticon, message_id);
            Ok(())
        })
    }

    /// Drop the user's reaction. Returns whether there was one to remove.
    pub fn unreact(&self, message_id: Uuid, user_id: Uuid) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute(
                "DELETE FROM reactions WHERE message_id = ?1 AND user_id = ?2",
                params![message_id, user_id],
            )?;
            Ok(removed > 0)
        })
    }
}

/// Batch-fetch reactions for every message of a conversation, keyed by message id.
pub(crate) fn reactions_for_conversation(
    conn: &Connection,
    conversation_id: Uuid,
) -> Result<HashMap<Uuid, Vec<ReactionView>>> {
    let mut stmt = conn.prepare(
        "SELECT r.message_id, r.user_id, u.username, r.emoticon
         FROM reactions r
         JOIN messages m ON m.id = r.message_id
         LEFT JOIN users u ON u.id = r.user_id
         WHERE m.conversation_id = ?1
         ORDER BY r.created_at",
    )?;

    let mut grouped: HashMap<Uuid, Vec<ReactionView>> = HashMap::new();
    let rows = stmt.query_map([conversation_id], |row| {
        Ok((
            row.get::<_, Uuid>(0)?,
            ReactionView {
                user_id: row.get(1)?,
                username: row
                    .get::<_, Option<String>>(2)?
                    .unwrap_or_else(|| "unknown".to_string()),
                emoticon: row.get(3)?,
            },
        ))
    })?;
    for row in rows {
        let (message_id, reaction) = row?;
        grouped.entry(message_id).or_default().push(reaction);
    }

    Ok(grouped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessagePayload;
    use crate::testutil;

    fn setup() -> (Database, Uuid, Uuid, Uuid, Uuid) {
        let db = testutil::db();
        let a = testutil::user(&db, "alice");
        let b = testutil::user(&db, "bob");
        let conv = db.get_or_create_private(a.id, b.id).unwrap().id();
        let msg = db
            .send(conv, a.id, MessagePayload::text("hello").unwrap(), None)
            .unwrap();
        (db, conv, msg, a.id, b.id)
    }

    #[test]
    fn second_reaction_replaces_first() {
        let (db, conv, msg, _a, b) = setup();

        db.react(msg, b, "👍").unwrap();
        db.react(msg, b, "❤️").unwrap();

        let details = db.conversation(conv, b).unwrap();
        let reactions = &details.messages[0].reactions;
        assert_eq!(reactions.len(), 1);
        assert_eq!(reactions[0].emoticon, "❤️");
        assert_eq!(reactions[0].username, "bob");
    }

    #[test]
    fn unreact_is_idempotent() {
        let (db, conv, msg, a, _b) = setup();

        db.react(msg, a, "😂").unwrap();
        assert!(db.unreact(msg, a).unwrap());
        assert!(!db.unreact(msg, a).unwrap());
        assert!(db.conversation(conv, a).unwrap().messages[0].reactions.is_empty());
    }

    #[test]
    fn react_guards() {
        let (db, conv, msg, a, _b) = setup();
        let carol = testutil::user(&db, "carol");

        assert!(matches!(db.react(msg, a, "  "), Err(CoreError::Validation(_))));
        assert!(matches!(
            db.react(msg, carol.id, "👍"),
            Err(CoreError::Forbidden(_))
        ));
        assert!(matches!(
            db.react(Uuid::new_v4(), a, "👍"),
            Err(CoreError::NotFound(_))
        ));

        db.delete_message(conv, msg, a).unwrap();
        assert!(matches!(db.react(msg, a, "👍"), Err(CoreError::NotFound(_))));
    }

    #[test]
    fn reactions_survive_soft_delete() {
        let (db, conv, msg, a, b) = setup();
        db.react(msg, b, "👍").unwrap();
        db.delete_message(conv, msg, a).unwrap();

        let details = db.conversation(conv, a).unwrap();
        assert_eq!(details.messages[0].reactions.len(), 1);
    }
}
