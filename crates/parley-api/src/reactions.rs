use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use parley_types::api::{Claims, ReactRequest};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;

/// Set (or replace) the caller's reaction on a message.
pub async fn react(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ReactRequest>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(&state, move |db| {
        db.react(message_id, claims.sub, &req.emoticon)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unreact(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = blocking(&state, move |db| db.unreact(message_id, claims.sub)).await?;
    Ok(Json(serde_json::json!({ "removed": removed })))
}
