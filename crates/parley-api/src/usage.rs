use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{Duration, Utc};

use parley_auth::AuthOutcome;
use parley_db::{Database, timestamp};
use parley_types::api::UsageResponse;

use crate::convert;
use crate::middleware::require_user;
use crate::state::{AppState, run_db};

/// GET /usage: messages sent in the last 24 hours against the daily cap.
pub async fn get_usage(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthOutcome>,
) -> Result<impl IntoResponse, StatusCode> {
    let user_id = require_user(&auth)?;
    let usage = run_db(&state, move |db| usage_for(db, &user_id))
        .await?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    Ok(Json(usage))
}

/// `None` if the user no longer exists.
fn usage_for(db: &Database, user_id: &str) -> anyhow::Result<Option<UsageResponse>> {
    let Some(user) = db.get_user_by_id(user_id)? else {
        return Ok(None);
    };

    let kind = convert::user_kind(&user);
    let since = timestamp(Utc::now() - Duration::hours(24));
    let sent = db.count_user_messages_since(user_id, &since)?;
    let max = kind.max_messages_per_day();

    Ok(Some(UsageResponse {
        user_kind: kind,
        messages_last24h: sent,
        max_messages_per_day: max,
        remaining: max.saturating_sub(sent),
    }))
}
