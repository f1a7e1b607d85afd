use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::debug;

use nexus_types::models::Identity;

use crate::auth::{AppState, decode_token};
use crate::error::ApiError;
use crate::with_db;

/// Extract and validate the JWT from the Authorization header, then hand the
/// caller's `Identity` to the handler as a request extension.
///
/// The token only names the user; username and role come from the stored
/// row, and a token whose user no longer exists is refused.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthenticated)?;

    let claims = decode_token(&state.jwt_secret, token)?;

    let user_id = claims.sub;
    let Some(user) = with_db(&state, move |db| db.get_user_by_id(user_id)).await? else {
        debug!("Refusing token for unknown user {}", user_id);
        return Err(ApiError::Unauthenticated);
    };

    req.extensions_mut().insert(Identity {
        user_id: user.id,
        username: user.username,
        role: user.role,
    });
    Ok(next.run(req).await)
}
