use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::{debug, warn};

use nexus_db::models::Presence;
use nexus_types::api::{PresenceResponse, ProfileResponse, SetPresenceRequest};
use nexus_types::models::{Identity, UserId};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::{degrade, with_db};

/// PUT /presence: the client's explicit online/offline signal.
pub async fn set_presence(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<SetPresenceRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let user_id = identity.user_id;

    with_db(&state, move |db| db.set_presence(user_id, req.is_online, Utc::now())).await?;
    debug!("User {} is now {}", user_id, if req.is_online { "online" } else { "offline" });

    Ok(StatusCode::NO_CONTENT)
}

/// GET /me: the caller's own profile. A failed status read degrades to
/// offline rather than failing the request.
pub async fn get_me(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = identity.user_id;
    let lookup = with_db(&state, move |db| db.get_presence(user_id)).await;
    let (presence, presence_degraded) = degrade("status", lookup.map_err(anyhow::Error::from), Presence::default)
        .map(presence_response)
        .into_parts();

    Ok(Json(ProfileResponse {
        user_id,
        username: identity.username,
        role: identity.role,
        presence,
        presence_degraded,
    }))
}

/// Marks the caller online and refreshes `last_seen`. Callers treat this as
/// best effort: a failed write is logged and the request carries on.
pub(crate) async fn mark_active(state: &AppState, user_id: UserId) {
    if let Err(e) = with_db(state, move |db| db.set_presence(user_id, true, Utc::now())).await {
        warn!("Could not refresh presence for user {}: {}", user_id, e);
    }
}

pub(crate) fn presence_response(p: Presence) -> PresenceResponse {
    PresenceResponse {
        is_online: p.is_online,
        last_seen: p.last_seen,
    }
}
