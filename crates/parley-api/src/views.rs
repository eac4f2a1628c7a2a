//! Core models -> wire responses.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;

use parley_db::models::{
    ConversationDetails, ConversationKind, ConversationPreview, MessagePayload, MessageStatus,
    MessageView, Receipt, User, UserSummary,
};
use parley_types::api;

pub fn user(u: User) -> api::UserResponse {
    api::UserResponse {
        id: u.id,
        username: u.username,
        photo_url: u.photo_url,
    }
}

pub fn member(u: UserSummary) -> api::UserResponse {
    api::UserResponse {
        id: u.id,
        username: u.username,
        photo_url: u.photo_url,
    }
}

fn kind(k: ConversationKind) -> api::ConversationKind {
    match k {
        ConversationKind::Private => api::ConversationKind::Private,
        ConversationKind::Group => api::ConversationKind::Group,
    }
}

fn status(s: MessageStatus) -> api::MessageStatus {
    match s {
        MessageStatus::Sent => api::MessageStatus::Sent,
        MessageStatus::Read => api::MessageStatus::Read,
    }
}

pub fn conversation(c: ConversationDetails) -> api::ConversationResponse {
    api::ConversationResponse {
        id: c.id,
        kind: kind(c.kind),
        name: c.name,
        photo_url: c.photo_url,
        last_message_id: c.last_message_id,
        created_at: c.created_at,
        members: c.members.into_iter().map(member).collect(),
        messages: c.messages.into_iter().map(message).collect(),
    }
}

pub fn preview(p: ConversationPreview) -> api::ConversationPreviewResponse {
    api::ConversationPreviewResponse {
        id: p.id,
        kind: kind(p.kind),
        display_name: p.display_name,
        display_photo_url: p.display_photo_url,
        last_message: p.last_message.map(|m| api::LastMessageResponse {
            id: m.id,
            sender_username: m.sender_username,
            text: m.text,
            has_photo: m.has_photo,
            is_deleted: m.is_deleted,
            timestamp: m.timestamp,
        }),
    }
}

pub fn message(m: MessageView) -> api::MessageResponse {
    let (text, photo, photo_mime_type) = match m.payload {
        Some(MessagePayload::Text(t)) => (Some(t), None, None),
        Some(MessagePayload::Photo { data, mime_type }) => {
            (None, Some(B64.encode(&data)), Some(mime_type))
        }
        None => (None, None, None),
    };

    api::MessageResponse {
        id: m.id,
        conversation_id: m.conversation_id,
        sender_id: m.sender_id,
        sender_username: m.sender_username,
        text,
        photo,
        photo_mime_type,
        timestamp: m.timestamp,
        status: status(m.status),
        is_deleted: m.is_deleted,
        is_reply: m.is_reply,
        is_forwarded: m.is_forwarded,
        original_message_id: m.original_message_id,
        original_message: m.original.map(|o| api::OriginalMessageResponse {
            id: o.id,
            sender_username: o.sender_username,
            text: o.text,
            has_photo: o.has_photo,
            is_deleted: o.is_deleted,
        }),
        reactions: m
            .reactions
            .into_iter()
            .map(|r| api::ReactionResponse {
                user_id: r.user_id,
                username: r.username,
                emoticon: r.emoticon,
            })
            .collect(),
    }
}

pub fn receipt(r: Receipt) -> api::ReceiptResponse {
    api::ReceiptResponse {
        user_id: r.user_id,
        username: r.username,
        is_read: r.is_read,
    }
}
