pub mod auth;
pub mod conversations;
pub mod error;
pub mod files;
pub mod messages;
pub mod middleware;
pub mod reactions;
pub mod users;
pub mod views;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
};
use tower_http::services::ServeDir;
use tracing::error;

use parley_db::Database;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::files::{MAX_PHOTO_SIZE, PHOTO_ROUTE};

/// Base64 photos inside JSON bodies grow by a third; leave room for that.
const MAX_BODY_SIZE: usize = MAX_PHOTO_SIZE * 3 / 2;

pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/session", post(auth::login))
        .route("/liveness", get(liveness))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/users", get(users::list_users))
        .route("/users/me", get(users::get_me))
        .route("/users/me/username", put(users::set_username))
        .route("/users/me/photo", put(users::set_photo))
        .route("/conversations", get(conversations::list_conversations))
        .route("/conversations/private", post(conversations::create_private))
        .route("/conversations/group", post(conversations::create_group))
        .route("/conversations/{conversation_id}", get(conversations::get_conversation))
        .route("/conversations/{conversation_id}/name", put(conversations::set_group_name))
        .route("/conversations/{conversation_id}/photo", put(conversations::set_group_photo))
        .route("/conversations/{conversation_id}/members", post(conversations::add_members))
        .route("/conversations/{conversation_id}/members/me", delete(conversations::leave_group))
        .route("/conversations/{conversation_id}/read", post(conversations::mark_read))
        .route("/conversations/{conversation_id}/messages", post(messages::send_message))
        .route("/conversations/{conversation_id}/forward", post(messages::forward_message))
        .route(
            "/conversations/{conversation_id}/messages/{message_id}",
            delete(messages::delete_message),
        )
        .route("/messages/{message_id}/receipts", get(messages::get_receipts))
        .route(
            "/messages/{message_id}/reaction",
            put(reactions::react).delete(reactions::unreact),
        )
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ))
        .with_state(state.clone());

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .nest_service(PHOTO_ROUTE, ServeDir::new(state.photos.dir()))
}

async fn liveness() -> &'static str {
    "ok"
}

/// Run a core call off the async runtime.
pub(crate) async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> parley_db::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal("worker task failed".into())
        })?
        .map_err(ApiError::from)
}
