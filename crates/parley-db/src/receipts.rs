use rusqlite::{Connection, params};
use tracing::debug;
use uuid::Uuid;

use crate::conversations::conversation_kind;
use crate::membership::require_member;
use crate::messages::query_message;
use crate::models::Receipt;
use crate::{CoreError, Database, Result};

impl Database {
    // -- Read receipts --

    /// Mark every message in the conversation as read for `user_id`, then
    /// promote messages whose receipts are now all read. Returns the number
    /// of receipts flipped.
    pub fn mark_conversation_read(&self, conversation_id: Uuid, user_id: Uuid) -> Result<usize> {
        self.with_conn_mut(|conn| {
            conversation_kind(conn, conversation_id)?;
            require_member(conn, conversation_id, user_id)?;

            let flipped = conn.execute(
                "UPDATE read_status SET is_read = 1
                 WHERE user_id = ?1 AND is_read = 0
                   AND message_id IN (SELECT id FROM messages WHERE conversation_id = ?2)",
                params![user_id, conversation_id],
            )?;
            let promoted = promote_read_messages(conn, conversation_id)?;

            debug!(
                "User {} read {} messages in {} ({} now read by all)",
                user_id, flipped, conversation_id, promoted
            );
            Ok(flipped)
        })
    }

    /// Per-recipient read state of one message.
    pub fn receipts(&self, message_id: Uuid, viewer_id: Uuid) -> Result<Vec<Receipt>> {
        self.with_conn(|conn| {
            let message = query_message(conn, message_id)?
                .ok_or_else(|| CoreError::NotFound(format!("message {}", message_id)))?;
            require_member(conn, message.conversation_id, viewer_id)?;

            let mut stmt = conn.prepare(
                "SELECT rs.user_id, u.username, rs.is_read
                 FROM read_status rs
                 JOIN users u ON u.id = rs.user_id
                 WHERE rs.message_id = ?1
                 ORDER BY u.username",
            )?;
            let rows = stmt
                .query_map([message_id], |row| {
                    Ok(Receipt {
                        user_id: row.get(0)?,
                        username: row.get(1)?,
                        is_read: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

/// Flip `sent` messages to `read` once none of their receipts is unread.
/// Messages that are already `read`, deleted, or have no receipts at all are
/// left alone, so running this twice changes nothing.
pub(crate) fn promote_read_messages(conn: &Connection, conversation_id: Uuid) -> Result<usize> {
    let promoted = conn.execute(
        "UPDATE messages SET status = 'read'
         WHERE conversation_id = ?1
           AND status = 'sent'
           AND is_deleted = 0
           AND EXISTS (SELECT 1 FROM read_status rs WHERE rs.message_id = messages.id)
           AND NOT EXISTS (
               SELECT 1 FROM read_status rs
               WHERE rs.message_id = messages.id AND rs.is_read = 0
           )",
        [conversation_id],
    )?;
    Ok(promoted)
}
