use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::debug;
use uuid::Uuid;

use crate::conversations::conversation_kind;
use crate::membership::{member_ids, require_member};
use crate::models::{Message, MessagePayload, MessageStatus, MessageView, OriginalPreview};
use crate::reactions::reactions_for_conversation;
use crate::{CoreError, Database, Result};

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, content, photo_data, photo_mime_type,
     timestamp, status, is_deleted, is_reply, is_forwarded, original_message_id";

struct NewMessage<'a> {
    conversation_id: Uuid,
    sender_id: Uuid,
    payload: &'a MessagePayload,
    is_reply: bool,
    is_forwarded: bool,
    original_message_id: Option<Uuid>,
}

impl Database {
    // -- Ledger --

    /// Append a message, fan out read receipts and move the conversation's
    /// last-message pointer, all in one transaction.
    pub fn send(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        payload: MessagePayload,
        reply_to: Option<Uuid>,
    ) -> Result<Uuid> {
        self.with_conn_mut(|conn| {
            conversation_kind(conn, conversation_id)?;
            require_member(conn, conversation_id, sender_id)?;

            if let Some(reply_id) = reply_to {
                match query_message(conn, reply_id)? {
                    Some(target) if target.conversation_id == conversation_id && !target.is_deleted => {}
                    _ => {
                        return Err(CoreError::NotFound(format!(
                            "message {} in conversation {}",
                            reply_id, conversation_id
                        )));
                    }
                }
            }

            append_message(
                conn,
                NewMessage {
                    conversation_id,
                    sender_id,
                    payload: &payload,
                    is_reply: reply_to.is_some(),
                    is_forwarded: false,
                    original_message_id: reply_to,
                },
            )
        })
    }

    /// Copy a live message's payload into `conversation_id` as a new message
    /// authored by `sender_id`. The original is left untouched.
    pub fn forward(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        original_message_id: Uuid,
    ) -> Result<Uuid> {
        self.with_conn_mut(|conn| {
            let original = match query_message(conn, original_message_id)? {
                Some(m) if !m.is_deleted => m,
                _ => {
                    return Err(CoreError::NotFound(format!(
                        "message {}",
                        original_message_id
                    )));
                }
            };

            conversation_kind(conn, conversation_id)?;
            require_member(conn, conversation_id, sender_id)?;

            append_message(
                conn,
                NewMessage {
                    conversation_id,
                    sender_id,
                    payload: &original.payload,
                    is_reply: false,
                    is_forwarded: true,
                    original_message_id: Some(original.id),
                },
            )
        })
    }

    /// Soft-delete a message. Only its author may do so; anything else
    /// (wrong conversation, already deleted, someone else's message) is
    /// `NotFound`. Read receipts for the message are dropped.
    pub fn delete_message(&self, conversation_id: Uuid, message_id: Uuid, user_id: Uuid) -> Result<()> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET is_deleted = 1
                 WHERE id = ?1 AND conversation_id = ?2 AND sender_id = ?3 AND is_deleted = 0",
                params![message_id, conversation_id, user_id],
            )?;
            if changed == 0 {
                return Err(CoreError::NotFound(format!(
                    "message {} by {} in conversation {}",
                    message_id, user_id, conversation_id
                )));
            }

            conn.execute("DELETE FROM read_status WHERE message_id = ?1", [message_id])?;
            debug!("Message {} deleted by {}", message_id, user_id);
            Ok(())
        })
    }

    /// Load one message; the viewer must belong to its conversation.
    pub fn message(&self, message_id: Uuid, viewer_id: Uuid) -> Result<Message> {
        self.with_conn(|conn| {
            let message = query_message(conn, message_id)?
                .ok_or_else(|| CoreError::NotFound(format!("message {}", message_id)))?;
            require_member(conn, message.conversation_id, viewer_id)?;
            Ok(message)
        })
    }
}

fn append_message(conn: &Connection, new: NewMessage<'_>) -> Result<Uuid> {
    let id = Uuid::new_v4();

    // Never older than the newest message already in the conversation, so
    // timestamp order matches append order.
    let latest: Option<DateTime<Utc>> = conn
        .query_row(
            "SELECT timestamp FROM messages WHERE conversation_id = ?1
             ORDER BY timestamp DESC LIMIT 1",
            [new.conversation_id],
            |row| row.get(0),
        )
        .optional()?;
    let now = Utc::now();
    let timestamp = latest.map_or(now, |latest| latest.max(now));

    let (content, photo_data, photo_mime_type) = new.payload.columns();
    conn.execute(
        "INSERT INTO messages (id, conversation_id, sender_id, content, photo_data, photo_mime_type,
                               timestamp, status, is_reply, is_forwarded, original_message_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            id,
            new.conversation_id,
            new.sender_id,
            content,
            photo_data,
            photo_mime_type,
            timestamp,
            MessageStatus::Sent,
            new.is_reply,
            new.is_forwarded,
            new.original_message_id,
        ],
    )?;

    // Fan-out: one receipt per current member, the sender's pre-read.
    let mut insert_status = conn.prepare_cached(
        "INSERT INTO read_status (message_id, user_id, is_read) VALUES (?1, ?2, ?3)",
    )?;
    for member in member_ids(conn, new.conversation_id)? {
        insert_status.execute(params![id, member, member == new.sender_id])?;
    }

    conn.execute(
        "UPDATE conversations SET last_message_id = ?1 WHERE id = ?2",
        params![id, new.conversation_id],
    )?;

    debug!(
        "Message {} appended to {} by {} (forwarded: {})",
        id, new.conversation_id, new.sender_id, new.is_forwarded
    );
    Ok(id)
}

pub(crate) fn query_message(conn: &Connection, message_id: Uuid) -> Result<Option<Message>> {
    let sql = format!("SELECT {} FROM messages WHERE id = ?1", MESSAGE_COLUMNS);
    let row = conn
        .query_row(&sql, [message_id], message_from_row)
        .optional()?;
    Ok(row)
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        payload: MessagePayload::from_columns(row.get(3)?, row.get(4)?, row.get(5)?)?,
        timestamp: row.get(6)?,
        status: row.get(7)?,
        is_deleted: row.get(8)?,
        is_reply: row.get(9)?,
        is_forwarded: row.get(10)?,
        original_message_id: row.get(11)?,
    })
}

/// Every message of a conversation in timestamp order, with sender names,
/// reply/forward previews and reactions attached.
pub(crate) fn list_messages(conn: &Connection, conversation_id: Uuid) -> Result<Vec<MessageView>> {
    let mut reactions = reactions_for_conversation(conn, conversation_id)?;

    // JOIN users for sender names in one query (no N+1)
    let mut stmt = conn.prepare(
        "SELECT m.id, m.conversation_id, m.sender_id, u.username,
                m.content, m.photo_data, m.photo_mime_type,
                m.timestamp, m.status, m.is_deleted, m.is_reply, m.is_forwarded,
                m.original_message_id,
                o.id, ou.username, o.content, o.photo_data IS NOT NULL, o.is_deleted
         FROM messages m
         LEFT JOIN users u ON u.id = m.sender_id
         LEFT JOIN messages o ON o.id = m.original_message_id
         LEFT JOIN users ou ON ou.id = o.sender_id
         WHERE m.conversation_id = ?1
         ORDER BY m.timestamp, m.rowid",
    )?;

    let rows = stmt
        .query_map([conversation_id], |row| {
            let id: Uuid = row.get(0)?;
            let is_deleted: bool = row.get(9)?;
            let payload = if is_deleted {
                None
            } else {
                Some(MessagePayload::from_columns(row.get(4)?, row.get(5)?, row.get(6)?)?)
            };

            let original = match row.get::<_, Option<Uuid>>(13)? {
                Some(original_id) => {
                    let original_deleted: bool = row.get(17)?;
                    Some(OriginalPreview {
                        id: original_id,
                        sender_username: unknown_if_missing(row.get(14)?),
                        text: if original_deleted { None } else { row.get(15)? },
                        has_photo: !original_deleted && row.get::<_, bool>(16)?,
                        is_deleted: original_deleted,
                    })
                }
                None => None,
            };

            Ok(MessageView {
                id,
                conversation_id: row.get(1)?,
                sender_id: row.get(2)?,
                sender_username: unknown_if_missing(row.get(3)?),
                payload,
                timestamp: row.get(7)?,
                status: row.get(8)?,
                is_deleted,
                is_reply: row.get(10)?,
                is_forwarded: row.get(11)?,
                original_message_id: row.get(12)?,
                original,
                reactions: Vec::new(),
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows
        .into_iter()
        .map(|mut view| {
            view.reactions = reactions.remove(&view.id).unwrap_or_default();
            view
        })
        .collect())
}

fn unknown_if_missing(username: Option<String>) -> String {
    username.unwrap_or_else(|| "unknown".to_string())
}
