use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub addr: SocketAddr,
    pub token_ttl: chrono::Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = get("NEXUS_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("NEXUS_JWT_SECRET is unset or still a placeholder; set it in your environment or .env file");
        }

        let db_path = get("NEXUS_DB_PATH").unwrap_or_else(|| "nexus.db".into()).into();
        let host = get("NEXUS_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = get("NEXUS_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("NEXUS_PORT must be a port number")?;
        let ttl_hours: i64 = get("NEXUS_TOKEN_TTL_HOURS")
            .unwrap_or_else(|| "720".into()) // 30 days
            .parse()
            .context("NEXUS_TOKEN_TTL_HOURS must be a whole number of hours")?;
        if ttl_hours <= 0 {
            bail!("NEXUS_TOKEN_TTL_HOURS must be positive");
        }

        let addr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        Ok(Self {
            jwt_secret,
            db_path,
            addr,
            token_ttl: chrono::Duration::hours(ttl_hours),
        })
    }
}
