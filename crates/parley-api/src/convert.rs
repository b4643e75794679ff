//! Row → model conversion. Rows written by this server always parse;
//! anything else is logged and replaced with a default rather than
//! failing the whole response.

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use parley_db::models::{ChatRow, MessageRow, ProjectRow, UserRow};
use parley_types::models::{Chat, Message, Project, Role, User, UserKind, Visibility};

pub fn user(row: UserRow) -> User {
    User {
        id: parse_id(&row.id, "user", &row.id),
        kind: user_kind(&row),
        created_at: parse_timestamp(&row.created_at, &row.id),
        email: row.email,
    }
}

pub fn user_kind(row: &UserRow) -> UserKind {
    UserKind::parse(&row.kind).unwrap_or_else(|| {
        warn!("Unknown kind '{}' on user '{}'", row.kind, row.id);
        UserKind::Guest
    })
}

pub fn project(row: ProjectRow) -> Project {
    Project {
        id: parse_id(&row.id, "project", &row.id),
        user_id: parse_id(&row.user_id, "user_id", &row.id),
        created_at: parse_timestamp(&row.created_at, &row.id),
        name: row.name,
        color: row.color,
        icon: row.icon,
    }
}

pub fn chat(row: ChatRow) -> Chat {
    Chat {
        id: parse_id(&row.id, "chat", &row.id),
        user_id: parse_id(&row.user_id, "user_id", &row.id),
        project_id: row.project_id.as_deref().map(|p| parse_id(p, "project_id", &row.id)),
        visibility: visibility(&row),
        created_at: parse_timestamp(&row.created_at, &row.id),
        title: row.title,
    }
}

pub fn visibility(row: &ChatRow) -> Visibility {
    // Unknown values are treated as the stricter setting
    Visibility::parse(&row.visibility).unwrap_or_else(|| {
        warn!("Unknown visibility '{}' on chat '{}'", row.visibility, row.id);
        Visibility::Private
    })
}

pub fn message(row: MessageRow) -> Message {
    Message {
        id: parse_id(&row.id, "message", &row.id),
        chat_id: parse_id(&row.chat_id, "chat_id", &row.id),
        role: Role::parse(&row.role).unwrap_or_else(|| {
            warn!("Unknown role '{}' on message '{}'", row.role, row.id);
            Role::System
        }),
        parts: parse_json(&row.parts, &row.id),
        attachments: parse_json(&row.attachments, &row.id),
        created_at: parse_timestamp(&row.created_at, &row.id),
    }
}

fn parse_id(value: &str, field: &str, row_id: &str) -> Uuid {
    value.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}' on row '{}': {}", field, value, row_id, e);
        Uuid::default()
    })
}

fn parse_json(value: &str, row_id: &str) -> serde_json::Value {
    serde_json::from_str(value).unwrap_or_else(|e| {
        warn!("Corrupt JSON on message '{}': {}", row_id, e);
        serde_json::Value::Array(vec![])
    })
}

fn parse_timestamp(value: &str, row_id: &str) -> DateTime<Utc> {
    value
        .parse::<DateTime<Utc>>()
        .or_else(|_| {
            // Rows written by older schemas use "YYYY-MM-DD HH:MM:SS".
            chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt created_at '{}' on row '{}': {}", value, row_id, e);
            DateTime::default()
        })
}
