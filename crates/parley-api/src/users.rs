use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Query, State},
    http::HeaderMap,
    response::IntoResponse,
};
use serde::Deserialize;

use parley_types::api::{Claims, LoginResponse, PhotoResponse, SetUsernameRequest, UserResponse};

use crate::auth::{AppState, issue_token};
use crate::error::ApiError;
use crate::files::content_type;
use crate::{blocking, views};

#[derive(Debug, Deserialize)]
pub struct UserSearchQuery {
    pub search: Option<String>,
}

/// GET /users?search=
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UserSearchQuery>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let users = blocking(&state, move |db| db.list_users(query.search.as_deref())).await?;
    let users: Vec<UserResponse> = users.into_iter().map(views::member).collect();
    Ok(Json(users))
}

/// GET /users/me
pub async fn get_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user = blocking(&state, move |db| db.user(claims.sub)).await?;
    Ok(Json(views::user(user)))
}

/// PUT /users/me/username. Returns a fresh token carrying the new name.
pub async fn set_username(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SetUsernameRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = blocking(&state, move |db| db.set_username(claims.sub, &req.username)).await?;
    let token = issue_token(&state.jwt_secret, user.id, &user.username)?;

    Ok(Json(LoginResponse {
        user_id: user.id,
        username: user.username,
        token,
        created: false,
    }))
}

/// PUT /users/me/photo with a raw image/png or image/jpeg body.
pub async fn set_photo(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let mime_type = content_type(&headers)?;
    let photo_url = state.photos.save(&body, &mime_type).await?;

    let url = photo_url.clone();
    if let Err(e) = blocking(&state, move |db| db.set_user_photo(claims.sub, &url)).await {
        state.photos.discard(&photo_url).await;
        return Err(e);
    }

    Ok(Json(PhotoResponse { photo_url }))
}
