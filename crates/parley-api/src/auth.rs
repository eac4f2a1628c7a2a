use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::error;
use uuid::Uuid;

use parley_db::Database;
use parley_types::api::{Claims, LoginRequest, LoginResponse};

use crate::blocking;
use crate::error::ApiError;
use crate::files::PhotoStore;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub photos: PhotoStore,
}

/// POST /session: log in by username, registering it on first use.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.clone();
    let login = blocking(&state, move |db| db.login(&username)).await?;

    let created = login.is_new();
    let user = login.into_user();
    let token = issue_token(&state.jwt_secret, user.id, &user.username)?;

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(LoginResponse {
            user_id: user.id,
            username: user.username,
            token,
            created,
        }),
    ))
}

pub(crate) fn issue_token(secret: &str, user_id: Uuid, username: &str) -> Result<String, ApiError> {
    create_token(secret, user_id, username).map_err(|e| {
        error!("Failed to sign token for {}: {}", user_id, e);
        ApiError::Internal("token signing failed".into())
    })
}

pub fn create_token(secret: &str, user_id: Uuid, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
