use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use parley_auth::{Access, AuthOutcome};
use parley_db::{DailyQuota, timestamp};
use parley_types::api::SaveMessageRequest;
use parley_types::models::{Message, Role};

use crate::chats::load_chat;
use crate::convert;
use crate::state::{AppState, run_db};

pub async fn get_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(auth): Extension<AuthOutcome>,
) -> Result<impl IntoResponse, StatusCode> {
    let chat = load_chat(&state, chat_id, &auth, Access::Read).await?;
    let rows = run_db(&state, move |db| db.get_messages(&chat.id)).await?;

    let messages: Vec<Message> = rows.into_iter().map(convert::message).collect();
    Ok(Json(messages))
}

/// POST /chats/{id}/messages: persist one message. User-authored messages
/// count against the owner's daily allowance.
pub async fn save_message(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(auth): Extension<AuthOutcome>,
    Json(req): Json<SaveMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if !req.parts.is_array() || !req.attachments.is_array() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let chat = load_chat(&state, chat_id, &auth, Access::Write).await?;

    // A reused client id fails on the primary key (409)
    let message_id = req.id.unwrap_or_else(Uuid::new_v4).to_string();
    let parts = req.parts.to_string();
    let attachments = req.attachments.to_string();

    let row = if req.role == Role::User {
        let owner = chat.user_id.clone();
        let user = run_db(&state, move |db| db.get_user_by_id(&owner))
            .await?
            .ok_or(StatusCode::UNAUTHORIZED)?;
        let quota = DailyQuota {
            user_id: chat.user_id.clone(),
            since: timestamp(Utc::now() - Duration::hours(24)),
            max: convert::user_kind(&user).max_messages_per_day(),
        };

        let max = quota.max;
        run_db(&state, move |db| {
            db.insert_user_message(&message_id, &chat.id, &parts, &attachments, &quota)
        })
        .await?
        .ok_or_else(|| {
            warn!("User {} hit the daily message limit ({})", user.id, max);
            StatusCode::TOO_MANY_REQUESTS
        })?
    } else {
        let role = req.role;
        run_db(&state, move |db| {
            db.insert_message(&message_id, &chat.id, role, &parts, &attachments)
        })
        .await?
    };

    Ok((StatusCode::CREATED, Json(convert::message(row))))
}

/// DELETE /messages/{id}/trailing: drop a message and everything after it
/// in the same chat, e.g. before regenerating a response.
pub async fn delete_trailing(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(auth): Extension<AuthOutcome>,
) -> Result<impl IntoResponse, StatusCode> {
    let mid = message_id.to_string();
    let message = run_db(&state, move |db| db.get_message(&mid))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;

    let chat_id: Uuid = message.chat_id.parse().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    load_chat(&state, chat_id, &auth, Access::Write).await?;

    let deleted = run_db(&state, move |db| db.delete_messages_from(&message.id)).await?;
    info!("Deleted {} trailing messages from chat {}", deleted, chat_id);

    Ok(Json(serde_json::json!({ "deleted": deleted })))
}
