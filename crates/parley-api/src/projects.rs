use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use parley_auth::{Access, AuthOutcome, authorize};
use parley_db::models::ProjectRow;
use parley_types::api::{CreateProjectRequest, UpdateProjectRequest};
use parley_types::models::{Chat, Project, Visibility};

use crate::convert;
use crate::middleware::require_user;
use crate::state::{AppState, run_db};

const MAX_NAME_LEN: usize = 64;
const MAX_ICON_LEN: usize = 32;
const DEFAULT_COLOR: &str = "#6366f1";
const DEFAULT_ICON: &str = "folder";

pub async fn list_projects(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthOutcome>,
) -> Result<impl IntoResponse, StatusCode> {
    let user_id = require_user(&auth)?;
    let rows = run_db(&state, move |db| db.list_projects(&user_id)).await?;

    let projects: Vec<Project> = rows.into_iter().map(convert::project).collect();
    Ok(Json(projects))
}

pub async fn create_project(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthOutcome>,
    Json(req): Json<CreateProjectRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let user_id = require_user(&auth)?;

    let name = validate_name(&req.name)?;
    let color = validate_color(req.color.as_deref().unwrap_or(DEFAULT_COLOR))?;
    let icon = validate_icon(req.icon.as_deref().unwrap_or(DEFAULT_ICON))?;

    let project_id = Uuid::new_v4().to_string();
    let row = run_db(&state, move |db| {
        db.create_project(&project_id, &user_id, &name, &color, &icon)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(convert::project(row))))
}

pub async fn get_project(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Extension(auth): Extension<AuthOutcome>,
) -> Result<impl IntoResponse, StatusCode> {
    let row = load_project(&state, project_id, &auth, Access::Read).await?;
    Ok(Json(convert::project(row)))
}

/// PATCH /projects/{id}: fields left out keep their current value.
pub async fn update_project(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Extension(auth): Extension<AuthOutcome>,
    Json(req): Json<UpdateProjectRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let mut row = load_project(&state, project_id, &auth, Access::Write).await?;

    if let Some(name) = req.name.as_deref() {
        row.name = validate_name(name)?;
    }
    if let Some(color) = req.color.as_deref() {
        row.color = validate_color(color)?;
    }
    if let Some(icon) = req.icon.as_deref() {
        row.icon = validate_icon(icon)?;
    }

    let updated = row.clone();
    let found = run_db(&state, move |db| {
        db.update_project(&updated.id, &updated.name, &updated.color, &updated.icon)
    })
    .await?;
    if !found {
        return Err(StatusCode::NOT_FOUND);
    }

    Ok(Json(convert::project(row)))
}

pub async fn delete_project(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Extension(auth): Extension<AuthOutcome>,
) -> Result<impl IntoResponse, StatusCode> {
    let row = load_project(&state, project_id, &auth, Access::Write).await?;
    if !run_db(&state, move |db| db.delete_project(&row.id)).await? {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(StatusCode::NO_CONTENT)
}

/// GET /projects/{id}/chats: the chats filed under a project.
pub async fn list_project_chats(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Extension(auth): Extension<AuthOutcome>,
) -> Result<impl IntoResponse, StatusCode> {
    let row = load_project(&state, project_id, &auth, Access::Read).await?;
    let rows = run_db(&state, move |db| db.list_project_chats(&row.id)).await?;

    let chats: Vec<Chat> = rows.into_iter().map(convert::chat).collect();
    Ok(Json(chats))
}

/// Fetch a project and check the caller's access to it. Projects are
/// never public.
pub(crate) async fn load_project(
    state: &AppState,
    project_id: Uuid,
    auth: &AuthOutcome,
    access: Access,
) -> Result<ProjectRow, StatusCode> {
    let pid = project_id.to_string();
    let row = run_db(state, move |db| db.get_project(&pid))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;

    authorize(auth.identity(), &row.user_id, Visibility::Private, access)?;
    Ok(row)
}

fn validate_name(name: &str) -> Result<String, StatusCode> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err(StatusCode::BAD_REQUEST);
    }
    Ok(name.to_string())
}

/// Colors are `#rrggbb`.
fn validate_color(color: &str) -> Result<String, StatusCode> {
    let hex = color.strip_prefix('#').ok_or(StatusCode::BAD_REQUEST)?;
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(StatusCode::BAD_REQUEST);
    }
    Ok(color.to_ascii_lowercase())
}

fn validate_icon(icon: &str) -> Result<String, StatusCode> {
    let icon = icon.trim();
    if icon.is_empty() || icon.chars().count() > MAX_ICON_LEN {
        return Err(StatusCode::BAD_REQUEST);
    }
    Ok(icon.to_string())
}
