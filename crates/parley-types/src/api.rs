use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Chat, Role, UserKind, Visibility};

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub user_id: Uuid,
    pub email: String,
    pub kind: UserKind,
}

/// `token` is null whenever the caller has no browser session to exchange.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: Option<String>,
}

// -- Projects --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateProjectRequest {
    pub name: String,
    pub color: Option<String>,
    pub icon: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProjectRequest {
    pub name: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
}

// -- Chats --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CreateChatRequest {
    pub id: Option<Uuid>,
    pub title: Option<String>,
    pub visibility: Option<Visibility>,
    pub project_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateVisibilityRequest {
    pub visibility: Visibility,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateTitleRequest {
    pub title: String,
}

/// `projectId: null` removes the chat from its project.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct MoveChatRequest {
    pub project_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistoryResponse {
    pub chats: Vec<Chat>,
    pub has_more: bool,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SaveMessageRequest {
    pub id: Option<Uuid>,
    pub role: Role,
    pub parts: serde_json::Value,
    #[serde(default = "empty_array")]
    pub attachments: serde_json::Value,
}

fn empty_array() -> serde_json::Value {
    serde_json::Value::Array(vec![])
}

// -- Usage --

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageResponse {
    pub user_kind: UserKind,
    pub messages_last24h: u32,
    pub max_messages_per_day: u32,
    pub remaining: u32,
}
