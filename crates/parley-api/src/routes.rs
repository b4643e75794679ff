use axum::{
    Router, middleware,
    routing::{delete, get, patch, post, put},
};

use crate::middleware::authenticate;
use crate::state::AppState;
use crate::{auth, chats, messages, projects, usage};

/// All HTTP routes. API routes live under `/api` and run behind the
/// `authenticate` middleware.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/guest", post(auth::guest))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/session", get(auth::session))
        .route("/auth/me", get(auth::me))
        .route("/auth/token", get(auth::issue_token))
        .route("/projects", get(projects::list_projects).post(projects::create_project))
        .route(
            "/projects/{project_id}",
            get(projects::get_project)
                .patch(projects::update_project)
                .delete(projects::delete_project),
        )
        .route("/projects/{project_id}/chats", get(projects::list_project_chats))
        .route("/chats", post(chats::create_chat))
        .route("/chats/history", get(chats::history))
        .route("/chats/{chat_id}", get(chats::get_chat).delete(chats::delete_chat))
        .route("/chats/{chat_id}/visibility", patch(chats::update_visibility))
        .route("/chats/{chat_id}/title", patch(chats::update_title))
        .route("/chats/{chat_id}/project", put(chats::move_chat))
        .route(
            "/chats/{chat_id}/messages",
            get(messages::get_messages).post(messages::save_message),
        )
        .route("/messages/{message_id}/trailing", delete(messages::delete_trailing))
        .route("/usage", get(usage::get_usage))
        .route_layer(middleware::from_fn_with_state(state.clone(), authenticate))
        .with_state(state);

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
}

async fn health() -> &'static str {
    "ok"
}
