use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- JWT Claims --

/// JWT claims issued at login and checked by the auth middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Session --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
    /// True when this login registered the username.
    pub created: bool,
}

// -- Users --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub photo_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetUsernameRequest {
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PhotoResponse {
    pub photo_url: String,
}

// -- Conversations --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Private,
    Group,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePrivateRequest {
    pub recipient_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateGroupRequest {
    pub name: String,
    pub participants: Vec<Uuid>,
    /// Optional base64 group photo, stored through the photo store.
    pub photo: Option<String>,
    pub photo_mime_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationCreatedResponse {
    pub conversation_id: Uuid,
    pub created: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetGroupNameRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddMembersRequest {
    pub participants: Vec<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddMembersResponse {
    pub added: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LeaveResponse {
    pub conversation_id: Uuid,
    pub dissolved: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkReadResponse {
    pub marked: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationResponse {
    pub id: Uuid,
    pub kind: ConversationKind,
    pub name: Option<String>,
    pub photo_url: Option<String>,
    pub last_message_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub members: Vec<UserResponse>,
    pub messages: Vec<MessageResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationPreviewResponse {
    pub id: Uuid,
    pub kind: ConversationKind,
    pub display_name: String,
    pub display_photo_url: Option<String>,
    pub last_message: Option<LastMessageResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LastMessageResponse {
    pub id: Uuid,
    pub sender_username: String,
    pub text: Option<String>,
    pub has_photo: bool,
    pub is_deleted: bool,
    pub timestamp: DateTime<Utc>,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub text: Option<String>,
    /// Base64-encoded photo bytes; requires `photo_mime_type`.
    pub photo: Option<String>,
    pub photo_mime_type: Option<String>,
    pub reply_to: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForwardMessageRequest {
    pub message_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageCreatedResponse {
    pub message_id: Uuid,
    pub conversation_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Read,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub sender_username: String,
    pub text: Option<String>,
    /// Base64 photo bytes.
    pub photo: Option<String>,
    pub photo_mime_type: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub status: MessageStatus,
    pub is_deleted: bool,
    pub is_reply: bool,
    pub is_forwarded: bool,
    pub original_message_id: Option<Uuid>,
    pub original_message: Option<OriginalMessageResponse>,
    pub reactions: Vec<ReactionResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OriginalMessageResponse {
    pub id: Uuid,
    pub sender_username: String,
    pub text: Option<String>,
    pub has_photo: bool,
    pub is_deleted: bool,
}

// -- Reactions & receipts --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReactRequest {
    pub emoticon: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionResponse {
    pub user_id: Uuid,
    pub username: String,
    pub emoticon: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReceiptResponse {
    pub user_id: Uuid,
    pub username: String,
    pub is_read: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
