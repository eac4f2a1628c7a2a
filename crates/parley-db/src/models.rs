//! Domain types returned by the core. Distinct from parley-types wire models
//! to keep the storage layer independent of any transport.
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use uuid::Uuid;

use crate::{CoreError, Result};

pub const MAX_TEXT_LEN: usize = 1000;
pub const PHOTO_MIME_TYPES: &[&str] = &["image/jpeg", "image/png"];

// -- Users --

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub photo_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a username login: either a fresh account or the existing one.
#[derive(Debug, Clone)]
pub enum Login {
    Created(User),
    Existing(User),
}

impl Login {
    pub fn into_user(self) -> User {
        match self {
            Login::Created(u) | Login::Existing(u) => u,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Login::Created(_))
    }
}

/// Username and photo of a conversation member, reactor, or reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub photo_url: Option<String>,
}

// -- Conversations --

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationKind {
    Private,
    Group,
}

impl ConversationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ConversationKind::Private => "private",
            ConversationKind::Group => "group",
        }
    }
}

impl ToSql for ConversationKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ConversationKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "private" => Ok(ConversationKind::Private),
            "group" => Ok(ConversationKind::Group),
            other => Err(FromSqlError::Other(
                format!("unknown conversation kind '{}'", other).into(),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivateConversation {
    Created(Uuid),
    Existing(Uuid),
}

impl PrivateConversation {
    pub fn id(self) -> Uuid {
        match self {
            PrivateConversation::Created(id) | PrivateConversation::Existing(id) => id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConversationDetails {
    pub id: Uuid,
    pub kind: ConversationKind,
    pub name: Option<String>,
    pub photo_url: Option<String>,
    pub last_message_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    /// Populated for groups only.
    pub members: Vec<UserSummary>,
    pub messages: Vec<MessageView>,
}

#[derive(Debug, Clone)]
pub struct ConversationPreview {
    pub id: Uuid,
    pub kind: ConversationKind,
    pub display_name: String,
    pub display_photo_url: Option<String>,
    pub last_message: Option<LastMessagePreview>,
}

#[derive(Debug, Clone)]
pub struct LastMessagePreview {
    pub id: Uuid,
    pub sender_username: String,
    pub text: Option<String>,
    pub has_photo: bool,
    pub is_deleted: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    Left { remaining: usize },
    /// The group collapsed to at most one member and was deleted.
    Dissolved,
}

// -- Messages --

/// Message body: text or a photo, never both and never neither.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagePayload {
    Text(String),
    Photo { data: Vec<u8>, mime_type: String },
}

impl MessagePayload {
    /// Build a payload from the optional halves a client submits.
    pub fn from_parts(text: Option<String>, photo: Option<(Vec<u8>, String)>) -> Result<Self> {
        match (text, photo) {
            (Some(text), None) => Self::text(text),
            (None, Some((data, mime_type))) => Self::photo(data, mime_type),
            (Some(_), Some(_)) => Err(CoreError::Validation(
                "a message carries text or a photo, not both".into(),
            )),
            (None, None) => Err(CoreError::Validation(
                "a message needs text or a photo".into(),
            )),
        }
    }

    pub fn text(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(CoreError::Validation("message text is empty".into()));
        }
        if text.chars().count() > MAX_TEXT_LEN {
            return Err(CoreError::Validation(format!(
                "message text exceeds {} characters",
                MAX_TEXT_LEN
            )));
        }
        Ok(MessagePayload::Text(text))
    }

    pub fn photo(data: Vec<u8>, mime_type: impl Into<String>) -> Result<Self> {
        let mime_type = mime_type.into().to_ascii_lowercase();
        if data.is_empty() {
            return Err(CoreError::Validation("photo is empty".into()));
        }
        if !PHOTO_MIME_TYPES.contains(&mime_type.as_str()) {
            return Err(CoreError::Validation(format!(
                "unsupported photo type '{}'",
                mime_type
            )));
        }
        Ok(MessagePayload::Photo { data, mime_type })
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessagePayload::Text(t) => Some(t),
            MessagePayload::Photo { .. } => None,
        }
    }

    pub fn is_photo(&self) -> bool {
        matches!(self, MessagePayload::Photo { .. })
    }

    /// Split into the (content, photo_data, photo_mime_type) column triple.
    pub(crate) fn columns(&self) -> (Option<&str>, Option<&[u8]>, Option<&str>) {
        match self {
            MessagePayload::Text(t) => (Some(t), None, None),
            MessagePayload::Photo { data, mime_type } => (None, Some(data), Some(mime_type)),
        }
    }

    pub(crate) fn from_columns(
        content: Option<String>,
        photo_data: Option<Vec<u8>>,
        photo_mime_type: Option<String>,
    ) -> rusqlite::Result<Self> {
        match (content, photo_data, photo_mime_type) {
            (Some(text), None, None) => Ok(MessagePayload::Text(text)),
            (None, Some(data), Some(mime_type)) => Ok(MessagePayload::Photo { data, mime_type }),
            _ => Err(rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Null,
                "message row has an inconsistent payload".into(),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    Sent,
    Read,
}

impl MessageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageStatus::Sent => "sent",
            MessageStatus::Read => "read",
        }
    }
}

impl ToSql for MessageStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for MessageStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "sent" => Ok(MessageStatus::Sent),
            "read" => Ok(MessageStatus::Read),
            other => Err(FromSqlError::Other(
                format!("unknown message status '{}'", other).into(),
            )),
        }
    }
}

/// A stored message as the ledger sees it.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub payload: MessagePayload,
    pub timestamp: DateTime<Utc>,
    pub status: MessageStatus,
    pub is_deleted: bool,
    pub is_reply: bool,
    pub is_forwarded: bool,
    pub original_message_id: Option<Uuid>,
}

/// A message as shown inside a conversation.
#[derive(Debug, Clone)]
pub struct MessageView {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub sender_username: String,
    /// Withheld once the message is deleted.
    pub payload: Option<MessagePayload>,
    pub timestamp: DateTime<Utc>,
    pub status: MessageStatus,
    pub is_deleted: bool,
    pub is_reply: bool,
    pub is_forwarded: bool,
    pub original_message_id: Option<Uuid>,
    pub original: Option<OriginalPreview>,
    pub reactions: Vec<ReactionView>,
}

/// Short form of the message a reply or forward points at.
#[derive(Debug, Clone)]
pub struct OriginalPreview {
    pub id: Uuid,
    pub sender_username: String,
    pub text: Option<String>,
    pub has_photo: bool,
    pub is_deleted: bool,
}

// -- Reactions & receipts --

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionView {
    pub user_id: Uuid,
    pub username: String,
    pub emoticon: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub user_id: Uuid,
    pub username: String,
    pub is_read: bool,
}
