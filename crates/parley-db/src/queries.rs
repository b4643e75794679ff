use crate::models::{ChatPage, ChatRow, MessageRow, ProjectRow, UserRow};
use crate::Database;
use anyhow::Result;
use parley_types::models::{Role, UserKind, Visibility};
use rusqlite::{Connection, Params, Row};

const USER_COLUMNS: &str = "SELECT id, email, password, kind, created_at FROM users";
const PROJECT_COLUMNS: &str = "SELECT id, user_id, name, color, icon, created_at FROM projects";
const CHAT_COLUMNS: &str =
    "SELECT id, user_id, project_id, title, visibility, created_at FROM chats";
const MESSAGE_COLUMNS: &str =
    "SELECT id, chat_id, role, parts, attachments, created_at FROM messages";

/// Position in a user's chat history, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryCursor {
    Latest,
    /// Chats created after the given chat.
    StartingAfter(String),
    /// Chats created before the given chat.
    EndingBefore(String),
}

/// A per-user message allowance over a trailing window.
#[derive(Debug, Clone)]
pub struct DailyQuota {
    pub user_id: String,
    /// Start of the window, as produced by [`crate::timestamp`].
    pub since: String,
    pub max: u32,
}

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        email: &str,
        password_hash: Option<&str>,
        kind: UserKind,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, password, kind) VALUES (?1, ?2, ?3, ?4)",
                (id, email, password_hash, kind.as_str()),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            query_one(conn, &format!("{USER_COLUMNS} WHERE email = ?1"), [email], user_from_row)
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            query_one(conn, &format!("{USER_COLUMNS} WHERE id = ?1"), [id], user_from_row)
        })
    }

    // -- Sessions --

    pub fn create_session(&self, id: &str, user_id: &str, expires_at: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (id, user_id, expires_at) VALUES (?1, ?2, ?3)",
                (id, user_id, expires_at),
            )?;
            Ok(())
        })
    }

    /// Owner of a session that is still live at `now`.
    pub fn get_session_user(&self, id: &str, now: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT user_id FROM sessions WHERE id = ?1 AND expires_at > ?2",
                (id, now),
                |row| row.get(0),
            )
            .optional()
        })
    }

    pub fn delete_session(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM sessions WHERE id = ?1", [id])? > 0))
    }

    pub fn purge_expired_sessions(&self, now: &str) -> Result<usize> {
        self.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM sessions WHERE expires_at <= ?1", [now])?)
        })
    }

    // -- Projects --

    pub fn create_project(
        &self,
        id: &str,
        user_id: &str,
        name: &str,
        color: &str,
        icon: &str,
    ) -> Result<ProjectRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO projects (id, user_id, name, color, icon) VALUES (?1, ?2, ?3, ?4, ?5)",
                (id, user_id, name, color, icon),
            )?;
            query_one(conn, &format!("{PROJECT_COLUMNS} WHERE id = ?1"), [id], project_from_row)?
                .ok_or_else(|| anyhow::anyhow!("Project vanished after insert: {}", id))
        })
    }

    pub fn get_project(&self, id: &str) -> Result<Option<ProjectRow>> {
        self.with_conn(|conn| {
            query_one(conn, &format!("{PROJECT_COLUMNS} WHERE id = ?1"), [id], project_from_row)
        })
    }

    pub fn list_projects(&self, user_id: &str) -> Result<Vec<ProjectRow>> {
        self.with_conn(|conn| {
            query_all(
                conn,
                &format!("{PROJECT_COLUMNS} WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC"),
                [user_id],
                project_from_row,
            )
        })
    }

    pub fn update_project(&self, id: &str, name: &str, color: &str, icon: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE projects SET name = ?2, color = ?3, icon = ?4 WHERE id = ?1",
                (id, name, color, icon),
            )?;
            Ok(changed > 0)
        })
    }

    /// Chats in the project survive with `project_id` cleared.
    pub fn delete_project(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM projects WHERE id = ?1", [id])? > 0))
    }

    // -- Chats --

    pub fn create_chat(
        &self,
        id: &str,
        user_id: &str,
        project_id: Option<&str>,
        title: &str,
        visibility: Visibility,
    ) -> Result<ChatRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO chats (id, user_id, project_id, title, visibility) VALUES (?1, ?2, ?3, ?4, ?5)",
                (id, user_id, project_id, title, visibility.as_str()),
            )?;
            query_one(conn, &format!("{CHAT_COLUMNS} WHERE id = ?1"), [id], chat_from_row)?
                .ok_or_else(|| anyhow::anyhow!("Chat vanished after insert: {}", id))
        })
    }

    pub fn get_chat(&self, id: &str) -> Result<Option<ChatRow>> {
        self.with_conn(|conn| {
            query_one(conn, &format!("{CHAT_COLUMNS} WHERE id = ?1"), [id], chat_from_row)
        })
    }

    /// Messages go with the chat (ON DELETE CASCADE).
    pub fn delete_chat(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM chats WHERE id = ?1", [id])? > 0))
    }

    /// A page of `user_id`'s chats, newest first. Returns `None` when the
    /// cursor chat does not exist or belongs to someone else.
    pub fn get_chat_history(
        &self,
        user_id: &str,
        limit: u32,
        cursor: &HistoryCursor,
    ) -> Result<Option<ChatPage>> {
        self.with_conn(|conn| {
            // One extra row tells us whether another page exists.
            let fetch = i64::from(limit) + 1;

            let mut chats = match cursor {
                HistoryCursor::Latest => query_all(
                    conn,
                    &format!(
                        "{CHAT_COLUMNS} WHERE user_id = ?1
                         ORDER BY created_at DESC, rowid DESC LIMIT ?2"
                    ),
                    rusqlite::params![user_id, fetch],
                    chat_from_row,
                )?,
                HistoryCursor::StartingAfter(chat_id) | HistoryCursor::EndingBefore(chat_id) => {
                    let Some((created_at, rowid)) = chat_position(conn, user_id, chat_id)? else {
                        return Ok(None);
                    };
                    let op = match cursor {
                        HistoryCursor::StartingAfter(_) => ">",
                        _ => "<",
                    };
                    query_all(
                        conn,
                        &format!(
                            "{CHAT_COLUMNS} WHERE user_id = ?1 AND (created_at, rowid) {op} (?2, ?3)
                             ORDER BY created_at DESC, rowid DESC LIMIT ?4"
                        ),
                        rusqlite::params![user_id, created_at, rowid, fetch],
                        chat_from_row,
                    )?
                }
            };

            let has_more = chats.len() > limit as usize;
            chats.truncate(limit as usize);
            Ok(Some(ChatPage { chats, has_more }))
        })
    }

    pub fn list_project_chats(&self, project_id: &str) -> Result<Vec<ChatRow>> {
        self.with_conn(|conn| {
            query_all(
                conn,
                &format!("{CHAT_COLUMNS} WHERE project_id = ?1 ORDER BY created_at DESC, rowid DESC"),
                [project_id],
                chat_from_row,
            )
        })
    }

    pub fn set_chat_visibility(&self, id: &str, visibility: Visibility) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE chats SET visibility = ?2 WHERE id = ?1",
                (id, visibility.as_str()),
            )?;
            Ok(changed > 0)
        })
    }

    pub fn set_chat_title(&self, id: &str, title: &str) -> Result<bool> {
        self.with_conn(|conn| {
            Ok(conn.execute("UPDATE chats SET title = ?2 WHERE id = ?1", (id, title))? > 0)
        })
    }

    pub fn set_chat_project(&self, id: &str, project_id: Option<&str>) -> Result<bool> {
        self.with_conn(|conn| {
            let changed =
                conn.execute("UPDATE chats SET project_id = ?2 WHERE id = ?1", (id, project_id))?;
            Ok(changed > 0)
        })
    }

    // -- Messages --

    pub fn insert_message(
        &self,
        id: &str,
        chat_id: &str,
        role: Role,
        parts: &str,
        attachments: &str,
    ) -> Result<MessageRow> {
        self.with_conn(|conn| insert_message_row(conn, id, chat_id, role, parts, attachments))
    }

    /// Insert a user-authored message unless `quota` is already used up.
    /// The count and the insert share one lock and one transaction, so
    /// concurrent senders cannot overshoot. `None` means the limit was hit.
    pub fn insert_user_message(
        &self,
        id: &str,
        chat_id: &str,
        parts: &str,
        attachments: &str,
        quota: &DailyQuota,
    ) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            if count_user_messages(&tx, &quota.user_id, &quota.since)? >= quota.max {
                return Ok(None);
            }

            let row = insert_message_row(&tx, id, chat_id, Role::User, parts, attachments)?;
            tx.commit()?;
            Ok(Some(row))
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            query_one(conn, &format!("{MESSAGE_COLUMNS} WHERE id = ?1"), [id], message_from_row)
        })
    }

    /// All messages of a chat, oldest first.
    pub fn get_messages(&self, chat_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            query_all(
                conn,
                &format!("{MESSAGE_COLUMNS} WHERE chat_id = ?1 ORDER BY created_at ASC, rowid ASC"),
                [chat_id],
                message_from_row,
            )
        })
    }

    /// Delete a message and every later message in the same chat.
    /// Returns the number of rows removed.
    pub fn delete_messages_from(&self, message_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let anchor: Option<(String, String, i64)> = conn
                .query_row(
                    "SELECT chat_id, created_at, rowid FROM messages WHERE id = ?1",
                    [message_id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;

            let Some((chat_id, created_at, rowid)) = anchor else {
                return Ok(0);
            };

            let removed = conn.execute(
                "DELETE FROM messages WHERE chat_id = ?1 AND (created_at, rowid) >= (?2, ?3)",
                rusqlite::params![chat_id, created_at, rowid],
            )?;
            Ok(removed)
        })
    }

    /// User-authored messages across all of `user_id`'s chats since `since`.
    pub fn count_user_messages_since(&self, user_id: &str, since: &str) -> Result<u32> {
        self.with_conn(|conn| count_user_messages(conn, user_id, since))
    }
}

fn insert_message_row(
    conn: &Connection,
    id: &str,
    chat_id: &str,
    role: Role,
    parts: &str,
    attachments: &str,
) -> Result<MessageRow> {
    conn.execute(
        "INSERT INTO messages (id, chat_id, role, parts, attachments) VALUES (?1, ?2, ?3, ?4, ?5)",
        (id, chat_id, role.as_str(), parts, attachments),
    )?;
    query_one(conn, &format!("{MESSAGE_COLUMNS} WHERE id = ?1"), [id], message_from_row)?
        .ok_or_else(|| anyhow::anyhow!("Message vanished after insert: {}", id))
}

fn count_user_messages(conn: &Connection, user_id: &str, since: &str) -> Result<u32> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM messages m
         JOIN chats c ON m.chat_id = c.id
         WHERE c.user_id = ?1 AND m.role = 'user' AND m.created_at >= ?2",
        (user_id, since),
        |row| row.get(0),
    )?;
    Ok(count)
}

fn chat_position(conn: &Connection, user_id: &str, chat_id: &str) -> Result<Option<(String, i64)>> {
    conn.query_row(
        "SELECT created_at, rowid FROM chats WHERE id = ?1 AND user_id = ?2",
        (chat_id, user_id),
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()
}

fn query_one<P, T>(
    conn: &Connection,
    sql: &str,
    params: P,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<Option<T>>
where
    P: Params,
{
    let mut stmt = conn.prepare(sql)?;
    let row = stmt.query_row(params, map).optional()?;
    Ok(row)
}

fn query_all<P, T>(
    conn: &Connection,
    sql: &str,
    params: P,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<Vec<T>>
where
    P: Params,
{
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, map)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        password: row.get(2)?,
        kind: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<ProjectRow> {
    Ok(ProjectRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        color: row.get(3)?,
        icon: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn chat_from_row(row: &Row<'_>) -> rusqlite::Result<ChatRow> {
    Ok(ChatRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        project_id: row.get(2)?,
        title: row.get(3)?,
        visibility: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        role: row.get(2)?,
        parts: row.get(3)?,
        attachments: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
