use std::sync::{Arc, LazyLock};

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::info;

use nexus_db::Database;
use nexus_types::api::{LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};
use nexus_types::models::{Claims, Role, UserId};

use crate::error::ApiError;
use crate::presence::mark_active;
use crate::with_db;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
}

/// Hash checked when a login names an unknown user, so that path costs the
/// same Argon2 work as a wrong password.
static DUMMY_HASH: LazyLock<Option<String>> = LazyLock::new(|| {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(b"nexus-unknown-user", &salt)
        .ok()
        .map(|h| h.to_string())
});

pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;

    let username = req.username.trim().to_string();
    let name_len = username.chars().count();
    if !(3..=32).contains(&name_len) {
        return Err(ApiError::InvalidInput("username must be 3 to 32 characters".into()));
    }
    if req.password.chars().count() < 8 {
        return Err(ApiError::InvalidInput("password must be at least 8 characters".into()));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Password hashing failed: {}", e))?
        .to_string();

    let stored_name = username.clone();
    let user_id = with_db(&state, move |db| db.create_user(&stored_name, &password_hash, Role::Member))
        .await?
        .ok_or(ApiError::Conflict)?;

    let token = create_token(&state, user_id, &username, Role::Member)?;
    info!("Registered user {} ({})", username, user_id);

    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id, token })))
}

/// Verifies credentials, issues a token and marks the user online.
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;

    let username = req.username.trim().to_string();
    let Some(user) = with_db(&state, move |db| db.get_user_by_username(&username)).await? else {
        burn_verify(&req.password);
        return Err(ApiError::Unauthenticated);
    };

    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| anyhow::anyhow!("Stored hash for user {} is unreadable: {}", user.id, e))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthenticated)?;

    let token = create_token(&state, user.id, &user.username, user.role)?;

    mark_active(&state, user.id).await;

    Ok(Json(LoginResponse {
        user_id: user.id,
        username: user.username,
        role: user.role,
        token,
    }))
}

fn burn_verify(password: &str) {
    if let Some(hash) = DUMMY_HASH.as_deref().and_then(|h| PasswordHash::new(h).ok()) {
        let _ = Argon2::default().verify_password(password.as_bytes(), &hash);
    }
}

pub fn create_token(state: &AppStateInner, user_id: UserId, username: &str, role: Role) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        role,
        exp: (Utc::now() + state.token_ttl).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.jwt_secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn decode_token(secret: &str, token: &str) -> Result<Claims, ApiError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthenticated)?;
    Ok(data.claims)
}
