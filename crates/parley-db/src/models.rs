/// Database row types. These map directly to SQLite rows and stay
/// string-typed; parley-api converts them into parley-types models.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub password: Option<String>,
    pub kind: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct ProjectRow {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub color: String,
    pub icon: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct ChatRow {
    pub id: String,
    pub user_id: String,
    pub project_id: Option<String>,
    pub title: String,
    pub visibility: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub chat_id: String,
    pub role: String,
    pub parts: String,
    pub attachments: String,
    pub created_at: String,
}

/// One page of a user's chat history.
#[derive(Debug)]
pub struct ChatPage {
    pub chats: Vec<ChatRow>,
    pub has_more: bool,
}
