use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use parley_api::{AppStateInner, AuthSettings, router};
use parley_db::Database;

const SECRET: &str = "integration-signing-secret";
const API_KEY: &str = "integration-service-key";

enum Auth<'a> {
    Cookie(&'a str),
    Bearer(&'a str),
    ApiKey(&'a str),
}

fn app_with(jwt_secret: Option<&str>, api_key: Option<&str>) -> Router {
    let db = Arc::new(Database::open_in_memory().unwrap());
    router(AppStateInner::new(
        db,
        AuthSettings {
            jwt_secret: jwt_secret.map(String::from),
            api_key: api_key.map(String::from),
            session_ttl_days: 30,
            secure_cookies: false,
        },
    ))
}

fn app() -> Router {
    app_with(Some(SECRET), Some(API_KEY))
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    auth: &[Auth<'_>],
    body: Option<Value>,
) -> (StatusCode, HeaderMap, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    for a in auth {
        builder = match a {
            Auth::Cookie(c) => builder.header(header::COOKIE, *c),
            Auth::Bearer(t) => builder.header(header::AUTHORIZATION, format!("Bearer {}", t)),
            Auth::ApiKey(k) => builder.header("x-api-key", *k),
        };
    }
    let request = match body {
        Some(b) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, headers, value)
}

async fn get(app: &Router, uri: &str, auth: &[Auth<'_>]) -> (StatusCode, HeaderMap, Value) {
    send(app, Method::GET, uri, auth, None).await
}

async fn post(
    app: &Router,
    uri: &str,
    auth: &[Auth<'_>],
    body: Value,
) -> (StatusCode, HeaderMap, Value) {
    send(app, Method::POST, uri, auth, Some(body)).await
}

fn session_cookie(headers: &HeaderMap) -> String {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("parley_session="))
        .and_then(|v| v.split(';').next())
        .unwrap()
        .to_string()
}

fn register_body(email: &str) -> Value {
    json!({ "email": email, "password": "correct horse" })
}

/// Register and return (cookie, user id).
async fn register(app: &Router, email: &str) -> (String, String) {
    let (status, headers, body) = post(app, "/api/auth/register", &[], register_body(email)).await;
    assert_eq!(status, StatusCode::CREATED);
    (session_cookie(&headers), body["userId"].as_str().unwrap().to_string())
}

async fn guest(app: &Router) -> String {
    let (status, headers, _) = send(app, Method::POST, "/api/auth/guest", &[], None).await;
    assert_eq!(status, StatusCode::CREATED);
    session_cookie(&headers)
}

async fn bearer_for(app: &Router, cookie: &str) -> String {
    let (status, _, body) = get(app, "/api/auth/token", &[Auth::Cookie(cookie)]).await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}

async fn create_chat(app: &Router, cookie: &str, body: Value) -> Value {
    let (status, _, chat) = post(app, "/api/chats", &[Auth::Cookie(cookie)], body).await;
    assert_eq!(status, StatusCode::CREATED);
    chat
}

fn text(t: &str) -> Value {
    json!({ "role": "user", "parts": [{ "type": "text", "text": t }] })
}

#[tokio::test]
async fn session_endpoint_reports_each_method() {
    let app = app();
    let (cookie, user_id) = register(&app, "ada@example.com").await;
    let token = bearer_for(&app, &cookie).await;

    let (_, _, anon) = get(&app, "/api/auth/session", &[]).await;
    assert_eq!(anon, json!({ "isAuthenticated": false, "authenticationType": null }));

    let (_, _, by_cookie) = get(
        &app,
        "/api/auth/session",
        &[Auth::Cookie(&cookie), Auth::Bearer("garbage"), Auth::ApiKey(API_KEY)],
    )
    .await;
    assert_eq!(by_cookie["authenticationType"], "cookie");
    assert_eq!(by_cookie["userId"], user_id.as_str());

    let (_, _, by_jwt) = get(&app, "/api/auth/session", &[Auth::Bearer(&token)]).await;
    assert_eq!(by_jwt["authenticationType"], "jwt");
    assert_eq!(by_jwt["userId"], user_id.as_str());

    let (_, _, by_key) = get(&app, "/api/auth/session", &[Auth::ApiKey(API_KEY)]).await;
    assert_eq!(by_key, json!({ "isAuthenticated": true, "authenticationType": "apiKey" }));
}

#[tokio::test]
async fn foreign_token_falls_through_to_api_key() {
    let app = app();
    let (cookie, _) = register(&app, "bob@example.com").await;

    let other = app_with(Some("another-secret"), None);
    let (other_cookie, _) = register(&other, "eve@example.com").await;
    let foreign_token = bearer_for(&other, &other_cookie).await;

    let (_, _, outcome) = get(
        &app,
        "/api/auth/session",
        &[Auth::Bearer(&foreign_token), Auth::ApiKey(API_KEY)],
    )
    .await;
    assert_eq!(outcome["authenticationType"], "apiKey");

    let (_, _, outcome) = get(&app, "/api/auth/session", &[Auth::Bearer(&foreign_token)]).await;
    assert_eq!(outcome["isAuthenticated"], false);

    // The session on the first app is unaffected
    let (_, _, outcome) = get(&app, "/api/auth/session", &[Auth::Cookie(&cookie)]).await;
    assert_eq!(outcome["authenticationType"], "cookie");
}

#[tokio::test]
async fn token_requires_cookie_session() {
    let app = app();
    let (cookie, _) = register(&app, "cy@example.com").await;
    let token = bearer_for(&app, &cookie).await;

    let (status, _, body) = get(&app, "/api/auth/token", &[Auth::Bearer(&token)]).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "token": null }));

    let (status, _, _) = get(&app, "/api/auth/token", &[]).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn token_route_without_secret_is_server_error() {
    let app = app_with(None, Some(API_KEY));
    let (cookie, _) = register(&app, "dee@example.com").await;

    let (status, _, _) = get(&app, "/api/auth/token", &[Auth::Cookie(&cookie)]).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn me_needs_a_user() {
    let app = app();
    let (cookie, user_id) = register(&app, "abe@example.com").await;

    let (status, _, me) = get(&app, "/api/auth/me", &[Auth::Cookie(&cookie)]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["id"], user_id.as_str());

    let (status, _, _) = get(&app, "/api/auth/me", &[Auth::ApiKey(API_KEY)]).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _, _) = get(&app, "/api/auth/me", &[]).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_logout_and_guests() {
    let app = app();
    register(&app, "fay@example.com").await;

    let shouting = register_body("FAY@example.com");
    let (status, _, _) = post(&app, "/api/auth/register", &[], shouting).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let wrong = json!({ "email": "fay@example.com", "password": "wrong horse" });
    let (status, _, _) = post(&app, "/api/auth/login", &[], wrong).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, headers, body) =
        post(&app, "/api/auth/login", &[], register_body("fay@example.com")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kind"], "regular");
    let cookie = session_cookie(&headers);

    let (status, _, _) =
        send(&app, Method::POST, "/api/auth/logout", &[Auth::Cookie(&cookie)], None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, _, outcome) = get(&app, "/api/auth/session", &[Auth::Cookie(&cookie)]).await;
    assert_eq!(outcome["isAuthenticated"], false);

    let (status, headers, guest) = send(&app, Method::POST, "/api/auth/guest", &[], None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(guest["kind"], "guest");
    let guest_cookie = session_cookie(&headers);

    let (_, _, me) = get(&app, "/api/auth/me", &[Auth::Cookie(&guest_cookie)]).await;
    assert_eq!(me["email"], guest["email"]);

    // Guests have no password to log in with
    let attempt = json!({ "email": guest["email"], "password": "anything-at-all" });
    let (status, _, _) = post(&app, "/api/auth/login", &[], attempt).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn rejects_bad_registrations() {
    let app = app();
    let long_email = format!("{}@example.com", "g".repeat(60));
    for body in [
        json!({ "email": "no-at-sign", "password": "long enough" }),
        json!({ "email": "gil@example.com", "password": "short" }),
        json!({ "email": long_email, "password": "long enough" }),
    ] {
        let (status, _, _) = post(&app, "/api/auth/register", &[], body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_registrations_get_one_account() {
    let app = app();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let app = app.clone();
            tokio::spawn(async move {
                post(&app, "/api/auth/register", &[], register_body("race@example.com")).await.0
            })
        })
        .collect();

    let mut statuses = Vec::new();
    for task in tasks {
        statuses.push(task.await.unwrap());
    }
    statuses.sort();

    let mut expected = vec![StatusCode::CONFLICT; 7];
    expected.insert(0, StatusCode::CREATED);
    assert_eq!(statuses, expected);
}

#[tokio::test]
async fn private_chats_follow_the_access_policy() {
    let app = app();
    let (owner, _) = register(&app, "hal@example.com").await;
    let (stranger, _) = register(&app, "ivy@example.com").await;
    let stranger_token = bearer_for(&app, &stranger).await;

    let chat = create_chat(&app, &owner, json!({ "title": "Secret plans" })).await;
    assert_eq!(chat["visibility"], "private");
    let uri = format!("/api/chats/{}", chat["id"].as_str().unwrap());
    let messages_uri = format!("{}/messages", uri);

    let (status, _, _) = get(&app, &uri, &[Auth::Cookie(&owner)]).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = get(&app, &uri, &[]).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _, _) = get(&app, &messages_uri, &[]).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _, _) = get(&app, &uri, &[Auth::Bearer(&stranger_token)]).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Service callers may read, but not write
    let (status, _, _) = get(&app, &uri, &[Auth::ApiKey(API_KEY)]).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = get(&app, &messages_uri, &[Auth::ApiKey(API_KEY)]).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = send(&app, Method::DELETE, &uri, &[Auth::ApiKey(API_KEY)], None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, _) = post(&app, &messages_uri, &[Auth::Cookie(&owner)], text("hi")).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _, updated) = send(
        &app,
        Method::PATCH,
        &format!("{}/visibility", uri),
        &[Auth::Cookie(&owner)],
        Some(json!({ "visibility": "public" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["visibility"], "public");

    // Public chats and their messages are readable by anyone
    let (status, _, _) = get(&app, &uri, &[]).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, messages) = get(&app, &messages_uri, &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(messages.as_array().unwrap().len(), 1);

    // ...but still only writable by the owner
    let (status, _, _) = post(&app, &messages_uri, &[], text("anonymous")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _, _) = send(&app, Method::DELETE, &uri, &[Auth::Cookie(&stranger)], None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, _) = send(&app, Method::DELETE, &uri, &[Auth::Cookie(&owner)], None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _, _) = get(&app, &uri, &[Auth::Cookie(&owner)]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn chat_titles_and_client_ids() {
    let app = app();
    let (owner, _) = register(&app, "ned@example.com").await;
    let (stranger, _) = register(&app, "oli@example.com").await;

    let chat_id = uuid::Uuid::new_v4().to_string();
    let chat = create_chat(&app, &owner, json!({ "id": chat_id })).await;
    assert_eq!(chat["id"], chat_id.as_str());

    // Reusing a client id conflicts, whoever sends it
    for cookie in [&owner, &stranger] {
        let body = json!({ "id": chat_id, "title": "again" });
        let (status, _, _) = post(&app, "/api/chats", &[Auth::Cookie(cookie)], body).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    let title_uri = format!("/api/chats/{}/title", chat_id);
    let rename = |cookie: String, title: String| {
        let app = app.clone();
        let uri = title_uri.clone();
        async move {
            let body = json!({ "title": title });
            send(&app, Method::PATCH, &uri, &[Auth::Cookie(&cookie)], Some(body)).await
        }
    };

    let (status, _, renamed) = rename(owner.clone(), "  Trip ideas ".to_string()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(renamed["title"], "Trip ideas");

    for bad in ["   ".to_string(), "x".repeat(121)] {
        let (status, _, _) = rename(owner.clone(), bad).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    let (status, _, _) = rename(stranger.clone(), "Mine now".to_string()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let chat_uri = format!("/api/chats/{}", chat_id);
    let (_, _, stored) = get(&app, &chat_uri, &[Auth::Cookie(&owner)]).await;
    assert_eq!(stored["title"], "Trip ideas");
}

#[tokio::test]
async fn chat_history_pages() {
    let app = app();
    let (cookie, _) = register(&app, "jo@example.com").await;
    let auth = [Auth::Cookie(&cookie)];
    let mut ids = Vec::new();
    for i in 0..3 {
        let chat = create_chat(&app, &cookie, json!({ "title": format!("chat {}", i) })).await;
        ids.push(chat["id"].as_str().unwrap().to_string());
    }

    let (status, _, page) = get(&app, "/api/chats/history?limit=2", &auth).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["chats"].as_array().unwrap().len(), 2);
    assert_eq!(page["chats"][0]["title"], "chat 2");
    assert_eq!(page["hasMore"], true);

    let uri = format!("/api/chats/history?limit=2&ending_before={}", ids[1]);
    let (_, _, rest) = get(&app, &uri, &auth).await;
    assert_eq!(rest["chats"][0]["title"], "chat 0");
    assert_eq!(rest["hasMore"], false);

    let uri = format!("/api/chats/history?starting_after={}", ids[0]);
    let (status, _, newer) = get(&app, &uri, &auth).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(newer["chats"][0]["title"], "chat 2");
    assert_eq!(newer["chats"][1]["title"], "chat 1");
    assert_eq!(newer["chats"].as_array().unwrap().len(), 2);
    assert_eq!(newer["hasMore"], false);

    let uri = format!("/api/chats/history?starting_after={}&ending_before={}", ids[0], ids[2]);
    let (status, _, _) = get(&app, &uri, &auth).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let uri = format!("/api/chats/history?ending_before={}", uuid::Uuid::new_v4());
    let (status, _, _) = get(&app, &uri, &auth).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = get(&app, "/api/chats/history", &[Auth::ApiKey(API_KEY)]).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _, _) = get(&app, "/api/chats/history", &[]).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn history_limit_is_clamped() {
    let app = app();
    let (cookie, _) = register(&app, "pat@example.com").await;
    let auth = [Auth::Cookie(&cookie)];
    for i in 0..101 {
        create_chat(&app, &cookie, json!({ "title": format!("chat {}", i) })).await;
    }

    let (status, _, smallest) = get(&app, "/api/chats/history?limit=0", &auth).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(smallest["chats"].as_array().unwrap().len(), 1);
    assert_eq!(smallest["chats"][0]["title"], "chat 100");
    assert_eq!(smallest["hasMore"], true);

    let (status, _, largest) = get(&app, "/api/chats/history?limit=1000", &auth).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(largest["chats"].as_array().unwrap().len(), 100);
    assert_eq!(largest["hasMore"], true);
}

#[tokio::test]
async fn project_membership() {
    let app = app();
    let (cookie, _) = register(&app, "kim@example.com").await;
    let (stranger, _) = register(&app, "lee@example.com").await;
    let auth = [Auth::Cookie(&cookie)];

    let bad = json!({ "name": "Bad", "color": "red" });
    let (status, _, _) = post(&app, "/api/projects", &auth, bad).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let body = json!({ "name": " Research ", "icon": "flask" });
    let (status, _, project) = post(&app, "/api/projects", &auth, body).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(project["name"], "Research");
    assert_eq!(project["color"], "#6366f1");
    let project_id = project["id"].as_str().unwrap().to_string();
    let project_uri = format!("/api/projects/{}", project_id);

    let (status, _, _) = get(&app, &project_uri, &[Auth::Cookie(&stranger)]).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // A stranger cannot file chats under someone else's project
    let body = json!({ "projectId": project_id });
    let (status, _, _) = post(&app, "/api/chats", &[Auth::Cookie(&stranger)], body).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let chat = create_chat(&app, &cookie, json!({})).await;
    assert_eq!(chat["title"], "New chat");
    let chat_uri = format!("/api/chats/{}", chat["id"].as_str().unwrap());

    let (status, _, moved) = send(
        &app,
        Method::PUT,
        &format!("{}/project", chat_uri),
        &auth,
        Some(json!({ "projectId": project_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(moved["projectId"], project_id.as_str());

    let (_, _, chats) = get(&app, &format!("{}/chats", project_uri), &auth).await;
    assert_eq!(chats.as_array().unwrap().len(), 1);

    let (status, _, renamed) =
        send(&app, Method::PATCH, &project_uri, &auth, Some(json!({ "color": "#00FF00" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(renamed["color"], "#00ff00");
    assert_eq!(renamed["name"], "Research");

    let (status, _, _) = send(&app, Method::DELETE, &project_uri, &auth, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _, _) = send(&app, Method::DELETE, &project_uri, &auth, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, _, orphan) = get(&app, &chat_uri, &auth).await;
    assert_eq!(orphan["projectId"], Value::Null);

    let (_, _, projects) = get(&app, "/api/projects", &auth).await;
    assert_eq!(projects, json!([]));
}

#[tokio::test]
async fn messages_and_daily_allowance() {
    let app = app();
    let guest = guest(&app).await;
    let auth = [Auth::Cookie(&guest)];

    let chat = create_chat(&app, &guest, json!({ "title": "Quick question" })).await;
    let messages_uri = format!("/api/chats/{}/messages", chat["id"].as_str().unwrap());

    let malformed = json!({ "role": "user", "parts": "not an array" });
    let (status, _, _) = post(&app, &messages_uri, &auth, malformed).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, first) = post(&app, &messages_uri, &auth, text("hi")).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["attachments"], json!([]));

    // A client id can only be used once
    let again = json!({ "id": first["id"], "role": "user", "parts": [] });
    let (status, _, _) = post(&app, &messages_uri, &auth, again).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let reply = json!({ "role": "assistant", "parts": [{ "type": "text", "text": "hello" }] });
    let (status, _, _) = post(&app, &messages_uri, &auth, reply).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, _, usage) = get(&app, "/api/usage", &auth).await;
    assert_eq!(usage["userKind"], "guest");
    assert_eq!(usage["messagesLast24h"], 1);
    assert_eq!(usage["remaining"], 19);

    for _ in 0..19 {
        let (status, _, _) = post(&app, &messages_uri, &auth, text("more")).await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let (status, _, _) = post(&app, &messages_uri, &auth, text("one too many")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    // Assistant messages do not count
    let reply = json!({ "role": "assistant", "parts": [] });
    let (status, _, _) = post(&app, &messages_uri, &auth, reply).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, _, all) = get(&app, &messages_uri, &auth).await;
    assert_eq!(all.as_array().unwrap().len(), 22);
    assert_eq!(all[0]["id"], first["id"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_sends_respect_the_allowance() {
    let app = app();
    let guest = guest(&app).await;

    let chat = create_chat(&app, &guest, json!({})).await;
    let messages_uri = format!("/api/chats/{}/messages", chat["id"].as_str().unwrap());
    for _ in 0..19 {
        let (status, _, _) = post(&app, &messages_uri, &[Auth::Cookie(&guest)], text("x")).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let (app, uri, cookie) = (app.clone(), messages_uri.clone(), guest.clone());
            tokio::spawn(async move {
                post(&app, &uri, &[Auth::Cookie(&cookie)], text("last")).await.0
            })
        })
        .collect();

    let mut created = 0;
    for task in tasks {
        match task.await.unwrap() {
            StatusCode::CREATED => created += 1,
            status => assert_eq!(status, StatusCode::TOO_MANY_REQUESTS),
        }
    }
    assert_eq!(created, 1);

    let (_, _, usage) = get(&app, "/api/usage", &[Auth::Cookie(&guest)]).await;
    assert_eq!(usage["messagesLast24h"], 20);
    assert_eq!(usage["remaining"], 0);
}

#[tokio::test]
async fn trailing_messages_are_removed() {
    let app = app();
    let (cookie, _) = register(&app, "max@example.com").await;
    let auth = [Auth::Cookie(&cookie)];
    let chat = create_chat(&app, &cookie, json!({ "title": "Regenerate me" })).await;
    let messages_uri = format!("/api/chats/{}/messages", chat["id"].as_str().unwrap());

    let mut ids = Vec::new();
    for role in ["user", "assistant", "user", "assistant"] {
        let body = json!({ "role": role, "parts": [] });
        let (_, _, msg) = post(&app, &messages_uri, &auth, body).await;
        ids.push(msg["id"].as_str().unwrap().to_string());
    }

    let trailing = format!("/api/messages/{}/trailing", ids[1]);
    let (status, _, _) =
        send(&app, Method::DELETE, &trailing, &[Auth::ApiKey(API_KEY)], None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, body) = send(&app, Method::DELETE, &trailing, &auth, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 3);

    let (_, _, left) = get(&app, &messages_uri, &auth).await;
    assert_eq!(left.as_array().unwrap().len(), 1);
    assert_eq!(left[0]["id"], ids[0].as_str());
}
