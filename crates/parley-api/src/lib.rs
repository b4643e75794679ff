pub mod auth;
pub mod chats;
pub mod convert;
pub mod messages;
pub mod middleware;
pub mod projects;
pub mod routes;
pub mod sessions;
pub mod state;
pub mod usage;

pub use routes::router;
pub use state::{AppState, AppStateInner, AuthSettings};
