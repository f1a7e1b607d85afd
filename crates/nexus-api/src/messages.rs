use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::debug;

use nexus_db::models::MessageRow;
use nexus_types::api::{EditMessageRequest, EditMessageResponse, MessageResponse};
use nexus_types::models::{Identity, MessageId};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::with_db;

/// PATCH /messages/{message_id}
pub async fn edit_message(
    State(state): State<AppState>,
    Path(message_id): Path<MessageId>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<EditMessageRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let content = require_content(req.content)?;
    let caller = identity.user_id;

    // `now` is taken inside the blocking task, right before the write.
    let edited_at = with_db(&state, move |db| db.edit_message(message_id, caller, &content, Utc::now()))
        .await?
        .ok_or(ApiError::NotFoundOrForbidden)?;

    debug!("User {} edited message {}", caller, message_id);
    Ok(Json(EditMessageResponse { id: message_id, edited_at }))
}

/// DELETE /messages/{message_id}: unsend.
pub async fn unsend_message(
    State(state): State<AppState>,
    Path(message_id): Path<MessageId>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = identity.user_id;

    let unsent = with_db(&state, move |db| db.unsend_message(message_id, caller, Utc::now())).await?;
    if !unsent {
        return Err(ApiError::NotFoundOrForbidden);
    }

    debug!("User {} unsent message {}", caller, message_id);
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) fn require_content(content: String) -> Result<String, ApiError> {
    if content.trim().is_empty() {
        return Err(ApiError::InvalidInput("content must not be empty".into()));
    }
    Ok(content)
}

pub(crate) fn message_response(row: MessageRow) -> MessageResponse {
    MessageResponse {
        id: row.id,
        conversation_id: row.conversation_id,
        sender_id: row.sender_id,
        sender_name: row.sender_name,
        content: row.content,
        sent_at: row.sent_at,
        edited: row.edited,
        edited_at: row.edited_at,
        is_read: row.is_read,
    }
}
