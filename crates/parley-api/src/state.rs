use std::sync::Arc;

use axum::http::StatusCode;
use tracing::{error, info, warn};

use parley_auth::{Authenticator, TokenService};
use parley_db::{Database, is_conflict};

use crate::sessions::DatabaseSessions;

pub type AppState = Arc<AppStateInner>;

/// Secrets and session settings resolved from the environment.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub jwt_secret: Option<String>,
    pub api_key: Option<String>,
    pub session_ttl_days: i64,
    pub secure_cookies: bool,
}

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub authenticator: Authenticator,
    /// `None` when no signing secret is configured.
    pub tokens: Option<TokenService>,
    pub session_ttl: chrono::Duration,
    pub secure_cookies: bool,
}

impl AppStateInner {
    pub fn new(db: Arc<Database>, settings: AuthSettings) -> AppState {
        let tokens = settings.jwt_secret.as_deref().map(TokenService::new);
        let authenticator = Authenticator::standard(
            DatabaseSessions::new(db.clone()),
            tokens.clone(),
            settings.api_key.as_deref(),
        );
        info!("Authentication chain: {:?}", authenticator.methods());

        Arc::new(Self {
            db,
            authenticator,
            tokens,
            session_ttl: chrono::Duration::days(settings.session_ttl_days),
            secure_cookies: settings.secure_cookies,
        })
    }
}

/// Run a blocking database closure off the async runtime. A duplicate key
/// becomes 409 so racing inserts of the same row fail cleanly.
pub async fn run_db<F, T>(state: &AppState, f: F) -> Result<T, StatusCode>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            if is_conflict(&e) {
                warn!("DB conflict: {:#}", e);
                return StatusCode::CONFLICT;
            }
            error!("DB error: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}
