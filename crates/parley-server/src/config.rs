use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use tracing::warn;

use parley_api::AuthSettings;

/// Placeholder secrets from sample `.env` files. Treated as unset.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "changeme",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub auth: AuthSettings,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let host = std::env::var("PARLEY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = std::env::var("PARLEY_PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .context("PARLEY_PORT must be a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

        let db_path: PathBuf = std::env::var("PARLEY_DB_PATH")
            .unwrap_or_else(|_| "parley.db".into())
            .into();

        let session_ttl_days: i64 = std::env::var("PARLEY_SESSION_TTL_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|d| *d > 0)
            .unwrap_or(30);

        let secure_cookies = std::env::var("PARLEY_COOKIE_SECURE")
            .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            addr,
            db_path,
            auth: AuthSettings {
                jwt_secret: secret("PARLEY_JWT_SECRET"),
                api_key: secret("PARLEY_API_KEY"),
                session_ttl_days,
                secure_cookies,
            },
        })
    }
}

/// Read a secret, refusing empty and placeholder values. A missing secret
/// disables the mechanism that depends on it.
fn secret(var: &str) -> Option<String> {
    match std::env::var(var) {
        Ok(v) if v.trim().is_empty() => {
            warn!("{} is empty; the dependent auth method is disabled", var);
            None
        }
        Ok(v) if PLACEHOLDER_SECRETS.contains(&v.as_str()) => {
            warn!("{} is still a placeholder; the dependent auth method is disabled", var);
            None
        }
        Ok(v) => Some(v),
        Err(_) => {
            warn!("{} is not set; the dependent auth method is disabled", var);
            None
        }
    }
}
