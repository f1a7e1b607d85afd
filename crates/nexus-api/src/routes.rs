use axum::{
    Json, Router, middleware,
    response::IntoResponse,
    routing::{get, patch, post, put},
};

use crate::auth::{self, AppState};
use crate::middleware::require_auth;
use crate::{contacts, conversations, messages, presence};

/// All HTTP routes. Everything except registration, login and the health
/// check sits behind `require_auth`.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/health", get(health));

    let protected_routes = Router::new()
        .route("/me", get(presence::get_me))
        .route("/presence", put(presence::set_presence))
        .route("/contacts", get(contacts::list_contacts))
        .route("/contacts/{peer_id}/conversation", get(conversations::open_conversation))
        .route(
            "/conversations/{conversation_id}/messages",
            get(conversations::poll_messages).post(conversations::send_message),
        )
        .route(
            "/messages/{message_id}",
            patch(messages::edit_message).delete(messages::unsend_message),
        )
        .route("/unread", get(contacts::unread_counts))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
