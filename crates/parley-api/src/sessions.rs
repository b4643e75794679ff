use std::sync::Arc;

use chrono::Utc;

use parley_auth::SessionStore;
use parley_db::{Database, timestamp};

/// Session lookups backed by the `sessions` table.
pub struct DatabaseSessions {
    db: Arc<Database>,
}

impl DatabaseSessions {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl SessionStore for DatabaseSessions {
    fn session_user(&self, session_id: &str) -> anyhow::Result<Option<String>> {
        self.db.get_session_user(session_id, &timestamp(Utc::now()))
    }
}
