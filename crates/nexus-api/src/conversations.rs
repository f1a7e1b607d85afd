use axum::{
    Extension, Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::debug;

use nexus_types::api::{
    OpenConversationResponse, PeerResponse, PollResponse, SendMessageRequest, SendMessageResponse,
};
use nexus_types::models::{ConversationId, Identity, MessageId, UserId};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::messages::{message_response, require_content};
use crate::presence::mark_active;
use crate::with_db;

#[derive(Debug, Deserialize)]
pub struct PollQuery {
    /// Watermark: the highest message id the client already has. Absent
    /// fetches the whole visible history.
    pub after: Option<MessageId>,
}

/// GET /contacts/{peer_id}/conversation
///
/// Resolves (creating if needed) the caller's conversation with the peer and
/// returns its history. Side effect: every message from the peer in it is
/// marked read.
pub async fn open_conversation(
    State(state): State<AppState>,
    Path(peer_id): Path<UserId>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = identity.user_id;
    if peer_id == user_id {
        return Err(ApiError::InvalidInput("cannot open a conversation with yourself".into()));
    }
    mark_active(&state, user_id).await;

    let (peer, opened) = with_db(&state, move |db| {
        let Some(peer) = db.get_user_by_id(peer_id)? else {
            return Ok(None);
        };
        let opened = db.open_conversation(user_id, peer_id, Utc::now())?;
        Ok(Some((peer, opened)))
    })
    .await?
    .ok_or(ApiError::NotFoundOrForbidden)?;

    if opened.marked_read > 0 {
        debug!(
            "User {} read {} message(s) in conversation {}",
            user_id, opened.marked_read, opened.conversation_id
        );
    }

    Ok(Json(OpenConversationResponse {
        conversation_id: opened.conversation_id,
        peer: PeerResponse {
            user_id: peer.id,
            username: peer.username,
        },
        messages: opened.messages.into_iter().map(message_response).collect(),
    }))
}

/// POST /conversations/{conversation_id}/messages
pub async fn send_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<ConversationId>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let content = require_content(req.content)?;
    let sender_id = identity.user_id;
    mark_active(&state, sender_id).await;

    let sent = with_db(&state, move |db| {
        db.insert_message(conversation_id, sender_id, &content, Utc::now())
    })
    .await?
    .ok_or(ApiError::NotFoundOrForbidden)?;

    Ok((
        StatusCode::CREATED,
        Json(SendMessageResponse {
            id: sent.id,
            sent_at: sent.sent_at,
        }),
    ))
}

/// GET /conversations/{conversation_id}/messages?after={id}
///
/// Delta fetch for polling clients. Does not touch read-state.
pub async fn poll_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<ConversationId>,
    Query(query): Query<PollQuery>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = identity.user_id;
    let after = query.after;

    let rows = with_db(&state, move |db| {
        if db.conversation_peer(conversation_id, user_id)?.is_none() {
            return Ok(None);
        }
        match after {
            Some(after) => db.get_messages_after(conversation_id, after),
            None => db.get_messages(conversation_id),
        }
        .map(Some)
    })
    .await?
    .ok_or(ApiError::NotFoundOrForbidden)?;

    Ok(Json(PollResponse {
        messages: rows.into_iter().map(message_response).collect(),
    }))
}
