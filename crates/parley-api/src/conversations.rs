use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use tracing::{debug, info};
use uuid::Uuid;

use parley_db::CoreError;
use parley_db::models::{LeaveOutcome, PrivateConversation};
use parley_types::api::{
    AddMembersRequest, AddMembersResponse, Claims, ConversationCreatedResponse,
    ConversationPreviewResponse, CreateGroupRequest, CreatePrivateRequest, LeaveResponse,
    MarkReadResponse, PhotoResponse, SetGroupNameRequest,
};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::files::content_type;
use crate::{blocking, views};

/// GET /conversations
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let previews = blocking(&state, move |db| db.conversations_for_user(claims.sub)).await?;
    let previews: Vec<ConversationPreviewResponse> =
        previews.into_iter().map(views::preview).collect();
    Ok(Json(previews))
}

/// POST /conversations/private
pub async fn create_private(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreatePrivateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let me = claims.sub;
    let other = req.recipient_id;

    let resolved = blocking(&state, move |db| match db.get_or_create_private(me, other) {
        // Lost a creation race: the winner's row is there now.
        Err(CoreError::Conflict(reason)) => {
            debug!("Private conversation conflict ({}), re-resolving", reason);
            db.get_or_create_private(me, other)
        }
        other => other,
    })
    .await?;

    let (status, created) = match resolved {
        PrivateConversation::Created(_) => (StatusCode::CREATED, true),
        PrivateConversation::Existing(_) => (StatusCode::OK, false),
    };
    Ok((
        status,
        Json(ConversationCreatedResponse {
            conversation_id: resolved.id(),
            created,
        }),
    ))
}

/// POST /conversations/group
pub async fn create_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // Reject a bad name before anything reaches the photo store.
    parley_db::conversations::validate_group_name(&req.name)?;

    let photo_url = match (req.photo, req.photo_mime_type) {
        (Some(photo), Some(mime_type)) => {
            let bytes = B64
                .decode(&photo)
                .map_err(|_| ApiError::BadRequest("photo is not valid base64".into()))?;
            Some(state.photos.save(&bytes, &mime_type).await?)
        }
        (None, None) => None,
        _ => {
            return Err(ApiError::BadRequest(
                "photo and photo_mime_type go together".into(),
            ));
        }
    };

    let name = req.name;
    let participants = req.participants;
    let stored = photo_url.clone();
    let created = blocking(&state, move |db| {
        db.create_group(claims.sub, &name, stored.as_deref(), &participants)
    })
    .await;

    let conversation_id = match created {
        Ok(id) => id,
        Err(e) => {
            if let Some(url) = &photo_url {
                state.photos.discard(url).await;
            }
            return Err(e);
        }
    };

    info!("Group {} created by {}", conversation_id, claims.username);
    Ok((
        StatusCode::CREATED,
        Json(ConversationCreatedResponse {
            conversation_id,
            created: true,
        }),
    ))
}

/// GET /conversations/{conversation_id}
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let details = blocking(&state, move |db| db.conversation(conversation_id, claims.sub)).await?;
    Ok(Json(views::conversation(details)))
}

/// PUT /conversations/{conversation_id}/name
pub async fn set_group_name(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SetGroupNameRequest>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(&state, move |db| {
        db.set_group_name(conversation_id, claims.sub, &req.name)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /conversations/{conversation_id}/photo (raw image body)
pub async fn set_group_photo(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let mime_type = content_type(&headers)?;
    let photo_url = state.photos.save(&body, &mime_type).await?;

    let url = photo_url.clone();
    let updated = blocking(&state, move |db| {
        db.set_group_photo(conversation_id, claims.sub, &url)
    })
    .await;
    if let Err(e) = updated {
        state.photos.discard(&photo_url).await;
        return Err(e);
    }

    Ok(Json(PhotoResponse { photo_url }))
}

/// POST /conversations/{conversation_id}/members
pub async fn add_members(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AddMembersRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let added = blocking(&state, move |db| {
        db.add_members(conversation_id, claims.sub, &req.participants)
    })
    .await?;
    Ok(Json(AddMembersResponse { added }))
}

/// DELETE /conversations/{conversation_id}/members/me
pub async fn leave_group(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = blocking(&state, move |db| db.leave(conversation_id, claims.sub)).await?;
    Ok(Json(LeaveResponse {
        conversation_id,
        dissolved: outcome == LeaveOutcome::Dissolved,
    }))
}

/// POST /conversations/{conversation_id}/read
pub async fn mark_read(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let marked = blocking(&state, move |db| {
        db.mark_conversation_read(conversation_id, claims.sub)
    })
    .await?;
    Ok(Json(MarkReadResponse { marked }))
}
