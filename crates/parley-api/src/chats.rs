use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use parley_auth::{Access, AuthOutcome, authorize};
use parley_db::HistoryCursor;
use parley_db::models::ChatRow;
use parley_types::api::{
    ChatHistoryResponse, CreateChatRequest, MoveChatRequest, UpdateTitleRequest,
    UpdateVisibilityRequest,
};
use parley_types::models::Visibility;

use crate::convert;
use crate::middleware::require_user;
use crate::projects::load_project;
use crate::state::{AppState, run_db};

const DEFAULT_TITLE: &str = "New chat";
const MAX_TITLE_LEN: usize = 120;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    pub starting_after: Option<Uuid>,
    pub ending_before: Option<Uuid>,
}

fn default_limit() -> u32 {
    20
}

/// GET /chats/history: the caller's chats, newest first, one page at a time.
pub async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
    Extension(auth): Extension<AuthOutcome>,
) -> Result<impl IntoResponse, StatusCode> {
    let user_id = require_user(&auth)?;
    let limit = query.limit.clamp(1, 100);

    let cursor = match (query.starting_after, query.ending_before) {
        (Some(_), Some(_)) => return Err(StatusCode::BAD_REQUEST),
        (Some(id), None) => HistoryCursor::StartingAfter(id.to_string()),
        (None, Some(id)) => HistoryCursor::EndingBefore(id.to_string()),
        (None, None) => HistoryCursor::Latest,
    };

    let page = run_db(&state, move |db| db.get_chat_history(&user_id, limit, &cursor))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(ChatHistoryResponse {
        chats: page.chats.into_iter().map(convert::chat).collect(),
        has_more: page.has_more,
    }))
}

pub async fn create_chat(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthOutcome>,
    Json(req): Json<CreateChatRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let user_id = require_user(&auth)?;
    let title = validate_title(req.title.as_deref().unwrap_or(DEFAULT_TITLE))?;
    let visibility = req.visibility.unwrap_or(Visibility::Private);

    // Chats can only be filed under the caller's own projects
    let project_id = match req.project_id {
        Some(pid) => Some(load_project(&state, pid, &auth, Access::Write).await?.id),
        None => None,
    };

    // A reused client id fails on the primary key (409)
    let chat_id = req.id.unwrap_or_else(Uuid::new_v4).to_string();
    let row = run_db(&state, move |db| {
        db.create_chat(&chat_id, &user_id, project_id.as_deref(), &title, visibility)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(convert::chat(row))))
}

pub async fn get_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(auth): Extension<AuthOutcome>,
) -> Result<impl IntoResponse, StatusCode> {
    let row = load_chat(&state, chat_id, &auth, Access::Read).await?;
    Ok(Json(convert::chat(row)))
}

pub async fn delete_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(auth): Extension<AuthOutcome>,
) -> Result<impl IntoResponse, StatusCode> {
    let row = load_chat(&state, chat_id, &auth, Access::Write).await?;
    if !run_db(&state, move |db| db.delete_chat(&row.id)).await? {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_visibility(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(auth): Extension<AuthOutcome>,
    Json(req): Json<UpdateVisibilityRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let mut row = load_chat(&state, chat_id, &auth, Access::Write).await?;

    let id = row.id.clone();
    if !run_db(&state, move |db| db.set_chat_visibility(&id, req.visibility)).await? {
        return Err(StatusCode::NOT_FOUND);
    }

    row.visibility = req.visibility.as_str().to_string();
    Ok(Json(convert::chat(row)))
}

pub async fn update_title(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(auth): Extension<AuthOutcome>,
    Json(req): Json<UpdateTitleRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let mut row = load_chat(&state, chat_id, &auth, Access::Write).await?;
    let title = validate_title(&req.title)?;

    let (id, new_title) = (row.id.clone(), title.clone());
    if !run_db(&state, move |db| db.set_chat_title(&id, &new_title)).await? {
        return Err(StatusCode::NOT_FOUND);
    }

    row.title = title;
    Ok(Json(convert::chat(row)))
}

/// PUT /chats/{id}/project: file a chat under a project, or take it out
/// with `projectId: null`. The caller must own both.
pub async fn move_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(auth): Extension<AuthOutcome>,
    Json(req): Json<MoveChatRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let mut row = load_chat(&state, chat_id, &auth, Access::Write).await?;

    let project_id = match req.project_id {
        Some(pid) => Some(load_project(&state, pid, &auth, Access::Write).await?.id),
        None => None,
    };

    let (id, target) = (row.id.clone(), project_id.clone());
    // The chat may have been deleted since it was loaded
    if !run_db(&state, move |db| db.set_chat_project(&id, target.as_deref())).await? {
        return Err(StatusCode::NOT_FOUND);
    }

    row.project_id = project_id;
    Ok(Json(convert::chat(row)))
}

/// Fetch a chat and run it through the access policy.
pub(crate) async fn load_chat(
    state: &AppState,
    chat_id: Uuid,
    auth: &AuthOutcome,
    access: Access,
) -> Result<ChatRow, StatusCode> {
    let cid = chat_id.to_string();
    let row = run_db(state, move |db| db.get_chat(&cid))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;

    authorize(auth.identity(), &row.user_id, convert::visibility(&row), access)?;
    Ok(row)
}

fn validate_title(title: &str) -> Result<String, StatusCode> {
    let title = title.trim();
    if title.is_empty() || title.chars().count() > MAX_TITLE_LEN {
        return Err(StatusCode::BAD_REQUEST);
    }
    Ok(title.to_string())
}
