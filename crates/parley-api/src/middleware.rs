use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use tracing::error;

use parley_auth::{AuthOutcome, Credentials};

use crate::state::AppState;

/// Resolve the caller for every API request and attach the `AuthOutcome`
/// as a request extension. Never rejects; handlers decide what they need.
pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let credentials = Credentials::from_headers(req.headers());

    let outcome = if credentials.is_empty() {
        AuthOutcome::anonymous()
    } else {
        // Session lookups hit SQLite
        let st = state.clone();
        tokio::task::spawn_blocking(move || st.authenticator.authenticate(&credentials))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            })?
    };

    req.extensions_mut().insert(outcome);
    Ok(next.run(req).await)
}

/// The calling user's id. Anonymous callers get 401; service callers,
/// which have no user, get 403.
pub fn require_user(auth: &AuthOutcome) -> Result<String, StatusCode> {
    let identity = auth.identity().ok_or(StatusCode::UNAUTHORIZED)?;
    identity
        .user_id()
        .map(str::to_string)
        .ok_or(StatusCode::FORBIDDEN)
}
