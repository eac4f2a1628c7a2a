use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;
use uuid::Uuid;

use crate::membership::{insert_member, require_member};
use crate::messages::list_messages;
use crate::models::{
    ConversationDetails, ConversationKind, ConversationPreview, LastMessagePreview,
    PrivateConversation, UserSummary,
};
use crate::users::{require_users, summary_from_row};
use crate::{CoreError, Database, Result};

pub const GROUP_NAME_MIN: usize = 3;
pub const GROUP_NAME_MAX: usize = 20;
pub const MAX_GROUP_INVITES: usize = 50;
const PREVIEW_LIMIT: u32 = 50;

impl Database {
    // -- Registry --

    /// Resolve the private conversation between two users, creating it (and
    /// both memberships) on first contact. A concurrent creator that wins the
    /// race surfaces as `Conflict`; calling again returns the winner's row.
    pub fn get_or_create_private(&self, user_a: Uuid, user_b: Uuid) -> Result<PrivateConversation> {
        if user_a == user_b {
            return Err(CoreError::Validation(
                "a private conversation needs two different users".into(),
            ));
        }
        let (low, high) = if user_a < user_b {
            (user_a, user_b)
        } else {
            (user_b, user_a)
        };

        self.with_conn_mut(|conn| {
            require_users(conn, &[user_a, user_b])?;

            let existing: Option<Uuid> = conn
                .query_row(
                    "SELECT id FROM conversations
                     WHERE kind = 'private' AND pair_low = ?1 AND pair_high = ?2",
                    params![low, high],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(id) = existing {
                return Ok(PrivateConversation::Existing(id));
            }

            let id = Uuid::new_v4();
            let now = Utc::now();
            conn.execute(
                "INSERT INTO conversations (id, kind, pair_low, pair_high, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, ConversationKind::Private, low, high, now],
            )?;
            insert_member(conn, id, low, now)?;
            insert_member(conn, id, high, now)?;

            debug!("Created private conversation {} for {} / {}", id, low, high);
            Ok(PrivateConversation::Created(id))
        })
    }

    pub fn create_group(
        &self,
        creator_id: Uuid,
        name: &str,
        photo_url: Option<&str>,
        participant_ids: &[Uuid],
    ) -> Result<Uuid> {
        let name = validate_group_name(name)?;

        let mut seen = HashSet::new();
        let participants: Vec<Uuid> = participant_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();
        if participants.is_empty() || participants.len() > MAX_GROUP_INVITES {
            return Err(CoreError::Validation(format!(
                "a group needs 1-{} participants",
                MAX_GROUP_INVITES
            )));
        }

        self.with_conn_mut(|conn| {
            require_users(conn, &[creator_id])?;
            require_users(conn, &participants)?;

            let id = Uuid::new_v4();
            let now = Utc::now();
            conn.execute(
                "INSERT INTO conversations (id, kind, name, photo_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, ConversationKind::Group, name, photo_url, now],
            )?;

            insert_member(conn, id, creator_id, now)?;
            for user_id in &participants {
                insert_member(conn, id, *user_id, now)?;
            }

            debug!(
                "Created group {} '{}' with {} invitees",
                id,
                name,
                participants.len()
            );
            Ok(id)
        })
    }

    pub fn set_group_name(&self, conversation_id: Uuid, actor_id: Uuid, name: &str) -> Result<()> {
        let name = validate_group_name(name)?;

        self.with_conn_mut(|conn| {
            require_group(conn, conversation_id)?;
            require_member(conn, conversation_id, actor_id)?;
            conn.execute(
                "UPDATE conversations SET name = ?1 WHERE id = ?2",
                params![name, conversation_id],
            )?;
            Ok(())
        })
    }

    pub fn set_group_photo(
        &self,
        conversation_id: Uuid,
        actor_id: Uuid,
        photo_url: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            require_group(conn, conversation_id)?;
            require_member(conn, conversation_id, actor_id)?;
            conn.execute(
                "UPDATE conversations SET photo_url = ?1 WHERE id = ?2",
                params![photo_url, conversation_id],
            )?;
            Ok(())
        })
    }

    /// Full view of one conversation: metadata, members (groups only) and
    /// every message in order with its reactions.
    pub fn conversation(&self, conversation_id: Uuid, viewer_id: Uuid) -> Result<ConversationDetails> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT kind, name, photo_url, last_message_id, created_at
                     FROM conversations WHERE id = ?1",
                    [conversation_id],
                    |row| {
                        Ok((
                            row.get::<_, ConversationKind>(0)?,
                            row.get::<_, Option<String>>(1)?,
                            row.get::<_, Option<String>>(2)?,
                            row.get::<_, Option<Uuid>>(3)?,
                            row.get::<_, DateTime<Utc>>(4)?,
                        ))
                    },
                )
                .optional()?;
            let Some((kind, name, photo_url, last_message_id, created_at)) = row else {
                return Err(CoreError::NotFound(format!("conversation {}", conversation_id)));
            };

            require_member(conn, conversation_id, viewer_id)?;

            let members = match kind {
                ConversationKind::Group => list_members(conn, conversation_id)?,
                ConversationKind::Private => Vec::new(),
            };

            Ok(ConversationDetails {
                id: conversation_id,
                kind,
                name,
                photo_url,
                last_message_id,
                created_at,
                members,
                messages: list_messages(conn, conversation_id)?,
            })
        })
    }

    /// Conversations the user belongs to, most recent activity first.
    pub fn conversations_for_user(&self, user_id: Uuid) -> Result<Vec<ConversationPreview>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.kind, c.name, c.photo_url, cu.username, cu.photo_url,
                        m.id, su.username, m.content, m.photo_data IS NOT NULL, m.is_deleted, m.timestamp
                 FROM memberships me
                 JOIN conversations c ON c.id = me.conversation_id
                 LEFT JOIN users cu ON c.kind = 'private'
                      AND cu.id = CASE WHEN c.pair_low = me.user_id THEN c.pair_high ELSE c.pair_low END
                 LEFT JOIN messages m ON m.id = c.last_message_id
                 LEFT JOIN users su ON su.id = m.sender_id
                 WHERE me.user_id = ?1
                 ORDER BY m.timestamp IS NULL, m.timestamp DESC, c.created_at DESC
                 LIMIT ?2",
            )?;

            let rows = stmt
                .query_map(params![user_id, PREVIEW_LIMIT], |row| {
                    let kind: ConversationKind = row.get(1)?;
                    let (display_name, display_photo_url) = match kind {
                        ConversationKind::Group => (
                            row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                            row.get(3)?,
                        ),
                        ConversationKind::Private => (
                            row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                            row.get(5)?,
                        ),
                    };

                    let last_message = match row.get::<_, Option<Uuid>>(6)? {
                        Some(id) => {
                            let is_deleted: bool = row.get(10)?;
                            Some(LastMessagePreview {
                                id,
                                sender_username: row
                                    .get::<_, Option<String>>(7)?
                                    .unwrap_or_else(|| "unknown".to_string()),
                                text: if is_deleted { None } else { row.get(8)? },
                                has_photo: !is_deleted && row.get::<_, bool>(9)?,
                                is_deleted,
                                timestamp: row.get(11)?,
                            })
                        }
                        None => None,
                    };

                    Ok(ConversationPreview {
                        id: row.get(0)?,
                        kind,
                        display_name,
                        display_photo_url,
                        last_message,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

/// Trimmed group name, or `Validation` if it breaks the length/charset rule.
pub fn validate_group_name(name: &str) -> Result<&str> {
    let name = name.trim();
    let len = name.chars().count();
    if !(GROUP_NAME_MIN..=GROUP_NAME_MAX).contains(&len) {
        return Err(CoreError::Validation(format!(
            "group name must be {}-{} characters",
            GROUP_NAME_MIN, GROUP_NAME_MAX
        )));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == ' ') {
        return Err(CoreError::Validation(
            "group name may only contain letters, digits and spaces".into(),
        ));
    }
    Ok(name)
}

pub(crate) fn conversation_kind(conn: &Connection, conversation_id: Uuid) -> Result<ConversationKind> {
    conn.query_row(
        "SELECT kind FROM conversations WHERE id = ?1",
        [conversation_id],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| CoreError::NotFound(format!("conversation {}", conversation_id)))
}

fn require_group(conn: &Connection, conversation_id: Uuid) -> Result<()> {
    match conversation_kind(conn, conversation_id)? {
        ConversationKind::Group => Ok(()),
        ConversationKind::Private => Err(CoreError::NotFound(format!(
            "group conversation {}",
            conversation_id
        ))),
    }
}

fn list_members(conn: &Connection, conversation_id: Uuid) -> Result<Vec<UserSummary>> {
    let mut stmt = conn.prepare(
        "SELECT u.id, u.username, u.photo_url
         FROM memberships me
         JOIN users u ON u.id = me.user_id
         WHERE me.conversation_id = ?1
         ORDER BY u.username",
    )?;
    let rows = stmt
        .query_map([conversation_id], summary_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessagePayload;
    use crate::testutil;

    #[test]
    fn private_conversation_is_shared_by_both_orders() {
        let db = testutil::db();
        let a = testutil::user(&db, "alice");
        let b = testutil::user(&db, "bob");

        let first = db.get_or_create_private(a.id, b.id).unwrap();
        assert!(matches!(first, PrivateConversation::Created(_)));
        let second = db.get_or_create_private(b.id, a.id).unwrap();
        assert_eq!(second, PrivateConversation::Existing(first.id()));
    }

    #[test]
    fn private_conversation_rejects_self_and_strangers() {
        let db = testutil::db();
        let a = testutil::user(&db, "alice");

        assert!(matches!(
            db.get_or_create_private(a.id, a.id),
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            db.get_or_create_private(a.id, Uuid::new_v4()),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn group_creation_validates_name_and_size() {
        let db = testutil::db();
        let a = testutil::user(&db, "alice");
        let b = testutil::user(&db, "bob");

        for bad in ["ab", "   ", "this name is far too long", "trip!"] {
            assert!(
                matches!(
                    db.create_group(a.id, bad, None, &[b.id]),
                    Err(CoreError::Validation(_))
                ),
                "{bad:?} should be rejected"
            );
        }
        assert!(matches!(
            db.create_group(a.id, "Trip", None, &[]),
            Err(CoreError::Validation(_))
        ));

        let too_many: Vec<Uuid> = (0..51).map(|_| Uuid::new_v4()).collect();
        assert!(matches!(
            db.create_group(a.id, "Trip", None, &too_many),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn group_creation_fails_atomically_on_unknown_participant() {
        let db = testutil::db();
        let a = testutil::user(&db, "alice");
        let b = testutil::user(&db, "bob");

        let err = db
            .create_group(a.id, "Trip", None, &[b.id, Uuid::new_v4()])
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
        assert!(db.conversations_for_user(a.id).unwrap().is_empty());
    }

    #[test]
    fn group_metadata_updates() {
        let db = testutil::db();
        let a = testutil::user(&db, "alice");
        let b = testutil::user(&db, "bob");
        let c = testutil::user(&db, "carol");
        let group = db.create_group(a.id, "Trip", None, &[b.id]).unwrap();

        db.set_group_name(group, b.id, " Road Trip ").unwrap();
        db.set_group_photo(group, a.id, "/photos/g.png").unwrap();
        let details = db.conversation(group, a.id).unwrap();
        assert_eq!(details.name.as_deref(), Some("Road Trip"));
        assert_eq!(details.photo_url.as_deref(), Some("/photos/g.png"));

        assert!(matches!(
            db.set_group_name(group, c.id, "Hijack"),
            Err(CoreError::Forbidden(_))
        ));

        let private = db.get_or_create_private(a.id, b.id).unwrap().id();
        assert!(matches!(
            db.set_group_name(private, a.id, "Nope"),
            Err(CoreError::NotFound(_))
        ));
        assert!(matches!(
            db.set_group_photo(Uuid::new_v4(), a.id, "/x.png"),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn details_require_membership() {
        let db = testutil::db();
        let a = testutil::user(&db, "alice");
        let b = testutil::user(&db, "bob");
        let c = testutil::user(&db, "carol");
        let private = db.get_or_create_private(a.id, b.id).unwrap().id();

        let details = db.conversation(private, b.id).unwrap();
        assert_eq!(details.kind, ConversationKind::Private);
        assert!(details.members.is_empty());
        assert!(matches!(
            db.conversation(private, c.id),
            Err(CoreError::Forbidden(_))
        ));
        assert!(matches!(
            db.conversation(Uuid::new_v4(), a.id),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn previews_show_counterpart_and_order_by_activity() {
        let db = testutil::db();
        let a = testutil::user(&db, "alice");
        let b = testutil::user(&db, "bob");
        let c = testutil::user(&db, "carol");

        let with_bob = db.get_or_create_private(a.id, b.id).unwrap().id();
        let group = db.create_group(a.id, "Trip", Some("/g.png"), &[b.id, c.id]).unwrap();
        let quiet = db.get_or_create_private(a.id, c.id).unwrap().id();

        db.send(group, b.id, MessagePayload::text("first").unwrap(), None)
            .unwrap();
        db.send(with_bob, b.id, MessagePayload::text("latest").unwrap(), None)
            .unwrap();

        let previews = db.conversations_for_user(a.id).unwrap();
        let ids: Vec<Uuid> = previews.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![with_bob, group, quiet]);

        assert_eq!(previews[0].display_name, "bob");
        let last = previews[0].last_message.as_ref().unwrap();
        assert_eq!(last.text.as_deref(), Some("latest"));
        assert_eq!(last.sender_username, "bob");

        assert_eq!(previews[1].display_name, "Trip");
        assert_eq!(previews[1].display_photo_url.as_deref(), Some("/g.png"));
        assert_eq!(previews[2].display_name, "carol");
        assert!(previews[2].last_message.is_none());

        // Bob sees alice as the counterpart of the same conversation.
        let bobs = db.conversations_for_user(b.id).unwrap();
        assert_eq!(bobs[0].display_name, "alice");
    }
}
