use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::conversations::conversation_kind;
use crate::models::{ConversationKind, LeaveOutcome};
use crate::receipts::promote_read_messages;
use crate::users::require_users;
use crate::{CoreError, Database, Result};

impl Database {
    // -- Membership --

    /// Add users to a group. Users who are already members are skipped, so
    /// repeating the call is harmless. Returns how many rows were added.
    pub fn add_members(
        &self,
        conversation_id: Uuid,
        actor_id: Uuid,
        user_ids: &[Uuid],
    ) -> Result<usize> {
        self.with_conn_mut(|conn| {
            if conversation_kind(conn, conversation_id)? != ConversationKind::Group {
                return Err(CoreError::InvalidOperation(
                    "members can only be added to group conversations".into(),
                ));
            }
            require_member(conn, conversation_id, actor_id)?;
            require_users(conn, user_ids)?;

            let now = Utc::now();
            let mut added = 0;
            for user_id in user_ids {
                added += insert_member(conn, conversation_id, *user_id, now)?;
            }

            debug!("Added {} members to group {}", added, conversation_id);
            Ok(added)
        })
    }

    /// Remove `user_id` from a group. When at most one member is left the
    /// group is dissolved together with everything it owns.
    pub fn leave(&self, conversation_id: Uuid, user_id: Uuid) -> Result<LeaveOutcome> {
        self.with_conn_mut(|conn| {
            if conversation_kind(conn, conversation_id)? != ConversationKind::Group {
                return Err(CoreError::InvalidOperation(
                    "private conversations cannot be left".into(),
                ));
            }
            require_member(conn, conversation_id, user_id)?;

            conn.execute(
                "DELETE FROM memberships WHERE conversation_id = ?1 AND user_id = ?2",
                params![conversation_id, user_id],
            )?;

            let remaining = member_count(conn, conversation_id)?;
            if remaining <= 1 {
                // Memberships, messages, reactions and receipts cascade.
                conn.execute("DELETE FROM conversations WHERE id = ?1", [conversation_id])?;
                info!(
                    "Group {} dissolved after {} left ({} member remaining)",
                    conversation_id, user_id, remaining
                );
                return Ok(LeaveOutcome::Dissolved);
            }

            // A departed member's unread receipts would otherwise hold
            // messages at `sent` forever.
            conn.execute(
                "DELETE FROM read_status
                 WHERE user_id = ?1 AND is_read = 0
                   AND message_id IN (SELECT id FROM messages WHERE conversation_id = ?2)",
                params![user_id, conversation_id],
            )?;
            promote_read_messages(conn, conversation_id)?;

            debug!("User {} left group {}", user_id, conversation_id);
            Ok(LeaveOutcome::Left { remaining })
        })
    }
}

pub(crate) fn is_member(conn: &Connection, conversation_id: Uuid, user_id: Uuid) -> Result<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM memberships WHERE conversation_id = ?1 AND user_id = ?2)",
        params![conversation_id, user_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

pub(crate) fn require_member(conn: &Connection, conversation_id: Uuid, user_id: Uuid) -> Result<()> {
    if is_member(conn, conversation_id, user_id)? {
        Ok(())
    } else {
        Err(CoreError::Forbidden(format!(
            "user {} is not a member of conversation {}",
            user_id, conversation_id
        )))
    }
}

/// Returns 1 if a row was inserted, 0 if the user was already a member.
pub(crate) fn insert_member(
    conn: &Connection,
    conversation_id: Uuid,
    user_id: Uuid,
    joined_at: DateTime<Utc>,
) -> Result<usize> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO memberships (conversation_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
        params![conversation_id, user_id, joined_at],
    )?;
    Ok(inserted)
}

pub(crate) fn member_ids(conn: &Connection, conversation_id: Uuid) -> Result<Vec<Uuid>> {
    let mut stmt =
        conn.prepare_cached("SELECT user_id FROM memberships WHERE conversation_id = ?1")?;
    let rows = stmt
        .query_map([conversation_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn member_count(conn: &Connection, conversation_id: Uuid) -> Result<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM memberships WHERE conversation_id = ?1",
        [conversation_id],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    #[test]
    fn add_members_is_idempotent() {
        let db = testutil::db();
        let a = testutil::user(&db, "alice");
        let b = testutil::user(&db, "bob");
        let c = testutil::user(&db, "carol");
        let group = db.create_group(a.id, "Trip", None, &[b.id]).unwrap();

        assert_eq!(db.add_members(group, a.id, &[b.id, c.id]).unwrap(), 1);
        assert_eq!(db.add_members(group, b.id, &[c.id]).unwrap(), 0);
        assert_eq!(db.conversation(group, c.id).unwrap().members.len(), 3);
    }

    #[test]
    fn add_members_guards() {
        let db = testutil::db();
        let a = testutil::user(&db, "alice");
        let b = testutil::user(&db, "bob");
        let c = testutil::user(&db, "carol");
        let private = db.get_or_create_private(a.id, b.id).unwrap().id();
        let group = db.create_group(a.id, "Trip", None, &[b.id]).unwrap();

        assert!(matches!(
            db.add_members(private, a.id, &[c.id]),
            Err(CoreError::InvalidOperation(_))
        ));
        assert!(matches!(
            db.add_members(group, c.id, &[c.id]),
            Err(CoreError::Forbidden(_))
        ));
        assert!(matches!(
            db.add_members(group, a.id, &[Uuid::new_v4()]),
            Err(CoreError::NotFound(_))
        ));
        assert!(matches!(
            db.add_members(Uuid::new_v4(), a.id, &[c.id]),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn leave_guards() {
        let db = testutil::db();
        let a = testutil::user(&db, "alice");
        let b = testutil::user(&db, "bob");
        let c = testutil::user(&db, "carol");
        let private = db.get_or_create_private(a.id, b.id).unwrap().id();
        let group = db.create_group(a.id, "Trip", None, &[b.id]).unwrap();

        assert!(matches!(
            db.leave(private, a.id),
            Err(CoreError::InvalidOperation(_))
        ));
        assert!(matches!(db.leave(group, c.id), Err(CoreError::Forbidden(_))));
    }

    #[test]
    fn leave_from_three_keeps_group() {
        let db = testutil::db();
        let a = testutil::user(&db, "alice");
        let b = testutil::user(&db, "bob");
        let c = testutil::user(&db, "carol");
        let group = db.create_group(a.id, "Trip", None, &[b.id, c.id]).unwrap();

        assert_eq!(
            db.leave(group, c.id).unwrap(),
            LeaveOutcome::Left { remaining: 2 }
        );
        let details = db.conversation(group, a.id).unwrap();
        assert_eq!(details.members.len(), 2);
        assert!(details.members.iter().all(|m| m.id != c.id));
    }

    #[test]
    fn leave_from_two_dissolves_group() {
        let db = testutil::db();
        let a = testutil::user(&db, "alice");
        let b = testutil::user(&db, "bob");
        let group = db.create_group(a.id, "Trip", None, &[b.id]).unwrap();
        db.send(group, a.id, crate::models::MessagePayload::text("bye").unwrap(), None)
            .unwrap();

        assert_eq!(db.leave(group, b.id).unwrap(), LeaveOutcome::Dissolved);
        assert!(matches!(
            db.conversation(group, a.id),
            Err(CoreError::NotFound(_))
        ));
        assert!(db.conversations_for_user(a.id).unwrap().is_empty());

        let orphans: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT (SELECT COUNT(*) FROM messages) + (SELECT COUNT(*) FROM read_status)
                          + (SELECT COUNT(*) FROM memberships)",
                    [],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(orphans, 0);
    }
}
