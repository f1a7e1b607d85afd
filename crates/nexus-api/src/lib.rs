pub mod auth;
pub mod contacts;
pub mod conversations;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod presence;
pub mod routes;

use anyhow::anyhow;
use tracing::{error, warn};

use nexus_db::Database;
use nexus_types::Outcome;

use crate::auth::AppState;
use crate::error::ApiError;

/// Runs a blocking database call off the async runtime.
pub(crate) async fn with_db<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Storage(anyhow!("blocking task failed: {}", e))
        })?
        .map_err(ApiError::Storage)
}

/// Turns a failed non-critical read into its safe default.
pub(crate) fn degrade<T>(what: &str, result: anyhow::Result<T>, fallback: impl FnOnce() -> T) -> Outcome<T> {
    match result {
        Ok(value) => Outcome::Fresh(value),
        Err(e) => {
            warn!("{} lookup failed, serving fallback: {:#}", what, e);
            Outcome::Degraded(fallback())
        }
    }
}
