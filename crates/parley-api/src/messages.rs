use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use tracing::debug;
use uuid::Uuid;

use parley_db::models::MessagePayload;
use parley_types::api::{
    Claims, ForwardMessageRequest, MessageCreatedResponse, ReceiptResponse, SendMessageRequest,
};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::{blocking, views};

pub async fn send_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let photo = match (req.photo, req.photo_mime_type) {
        (Some(data), Some(mime_type)) => {
            let bytes = B64
                .decode(&data)
                .map_err(|_| ApiError::BadRequest("photo is not valid base64".into()))?;
            Some((bytes, mime_type))
        }
        (None, None) => None,
        _ => {
            return Err(ApiError::BadRequest(
                "photo and photo_mime_type go together".into(),
            ));
        }
    };
    let payload = MessagePayload::from_parts(req.text, photo)?;
    let reply_to = req.reply_to;

    let message_id = blocking(&state, move |db| {
        db.send(conversation_id, claims.sub, payload, reply_to)
    })
    .await?;

    debug!("Message {} sent to {}", message_id, conversation_id);
    Ok((
        StatusCode::CREATED,
        Json(MessageCreatedResponse {
            message_id,
            conversation_id,
        }),
    ))
}

/// Copy an existing message into this conversation.
pub async fn forward_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ForwardMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message_id = blocking(&state, move |db| {
        db.forward(conversation_id, claims.sub, req.message_id)
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageCreatedResponse {
            message_id,
            conversation_id,
        }),
    ))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Path((conversation_id, message_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(&state, move |db| {
        db.delete_message(conversation_id, message_id, claims.sub)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_receipts(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let receipts = blocking(&state, move |db| db.receipts(message_id, claims.sub)).await?;
    let receipts: Vec<ReceiptResponse> = receipts.into_iter().map(views::receipt).collect();
    Ok(Json(receipts))
}
