use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{self, SaltString, rand_core::OsRng},
};
use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use parley_auth::{AuthMethod, AuthOutcome, SESSION_COOKIE};
use parley_db::timestamp;
use parley_types::api::{LoginRequest, RegisterRequest, SessionResponse, TokenResponse};
use parley_types::models::UserKind;

use crate::convert;
use crate::middleware::require_user;
use crate::state::{AppState, run_db};

const MAX_EMAIL_LEN: usize = 64;
const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 128;

pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let email = req.email.trim().to_lowercase();

    // Validate input
    if !email.contains('@') || email.len() > MAX_EMAIL_LEN {
        return Err(StatusCode::BAD_REQUEST);
    }
    if req.password.len() < MIN_PASSWORD_LEN || req.password.len() > MAX_PASSWORD_LEN {
        return Err(StatusCode::BAD_REQUEST);
    }

    // Skip hashing when the email is obviously taken. A concurrent
    // registration still loses on the UNIQUE index and gets 409.
    let lookup = email.clone();
    if run_db(&state, move |db| db.get_user_by_email(&lookup)).await?.is_some() {
        return Err(StatusCode::CONFLICT);
    }

    let password_hash = hash_password(req.password).await?;

    let user_id = Uuid::new_v4();
    let (uid, mail) = (user_id.to_string(), email.clone());
    run_db(&state, move |db| {
        db.create_user(&uid, &mail, Some(&password_hash), UserKind::Regular)
    })
    .await?;

    let cookie = start_session(&state, user_id).await?;
    info!("Registered user {}", user_id);

    Ok((
        StatusCode::CREATED,
        jar.add(cookie),
        Json(SessionResponse {
            user_id,
            email,
            kind: UserKind::Regular,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let email = req.email.trim().to_lowercase();
    let user = run_db(&state, move |db| db.get_user_by_email(&email))
        .await?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    // Guests have no password and cannot log back in
    let stored = user.password.clone().ok_or(StatusCode::UNAUTHORIZED)?;
    if !verify_password(req.password, stored).await.map_err(|e| {
        error!("Stored password hash for {} is unreadable: {}", user.id, e);
        StatusCode::INTERNAL_SERVER_ERROR
    })? {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let user_id: Uuid = user.id.parse().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let cookie = start_session(&state, user_id).await?;

    Ok((
        jar.add(cookie),
        Json(SessionResponse {
            user_id,
            kind: convert::user_kind(&user),
            email: user.email,
        }),
    ))
}

/// Create a throwaway guest account and sign it in.
pub async fn guest(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, StatusCode> {
    let user_id = Uuid::new_v4();
    let email = format!("guest-{}", user_id.simple());

    let (uid, mail) = (user_id.to_string(), email.clone());
    run_db(&state, move |db| db.create_user(&uid, &mail, None, UserKind::Guest)).await?;

    let cookie = start_session(&state, user_id).await?;

    Ok((
        StatusCode::CREATED,
        jar.add(cookie),
        Json(SessionResponse {
            user_id,
            email,
            kind: UserKind::Guest,
        }),
    ))
}

pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, StatusCode> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        let session_id = cookie.value().to_string();
        run_db(&state, move |db| db.delete_session(&session_id)).await?;
    }

    let removal = Cookie::build(SESSION_COOKIE).path("/");
    Ok((StatusCode::NO_CONTENT, jar.remove(removal)))
}

/// GET /auth/session: how (and whether) this request authenticated.
pub async fn session(Extension(auth): Extension<AuthOutcome>) -> Json<AuthOutcome> {
    Json(auth)
}

pub async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthOutcome>,
) -> Result<impl IntoResponse, StatusCode> {
    let user_id = require_user(&auth)?;
    let user = run_db(&state, move |db| db.get_user_by_id(&user_id))
        .await?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    Ok(Json(convert::user(user)))
}

/// GET /auth/token: exchange a browser session for a bearer token.
pub async fn issue_token(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthOutcome>,
) -> Result<Response, StatusCode> {
    if auth.method() != Some(AuthMethod::Cookie) {
        return Ok((StatusCode::UNAUTHORIZED, Json(TokenResponse { token: None })).into_response());
    }

    let Some(tokens) = state.tokens.clone() else {
        error!("Token requested but no signing secret is configured");
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    };

    let user_id = require_user(&auth)?;
    let user = run_db(&state, move |db| db.get_user_by_id(&user_id))
        .await?
        .ok_or_else(|| {
            warn!("Session points at a missing user");
            StatusCode::UNAUTHORIZED
        })?;

    let token = tokens.issue(&user.id, &user.email).map_err(|e| {
        error!("Token issuance failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(TokenResponse { token: Some(token) }).into_response())
}

/// Argon2id with a fresh salt, on the blocking pool.
async fn hash_password(password: String) -> Result<String, StatusCode> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(|e| {
        error!("Password hashing failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

/// `Ok(false)` on a wrong password. An unparseable stored hash is an
/// error, not a mismatch.
async fn verify_password(password: String, stored: String) -> Result<bool, password_hash::Error> {
    tokio::task::spawn_blocking(move || -> Result<bool, password_hash::Error> {
        let parsed = PasswordHash::new(&stored)?;
        Ok(Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
    })
    .await
    .unwrap_or_else(|e| {
        error!("spawn_blocking join error: {}", e);
        Err(password_hash::Error::Crypto)
    })
}

async fn start_session(state: &AppState, user_id: Uuid) -> Result<Cookie<'static>, StatusCode> {
    let session_id = URL_SAFE_NO_PAD.encode(rand::random::<[u8; 32]>());
    let expires_at = timestamp(Utc::now() + state.session_ttl);

    let (sid, uid) = (session_id.clone(), user_id.to_string());
    run_db(state, move |db| db.create_session(&sid, &uid, &expires_at)).await?;

    Ok(Cookie::build((SESSION_COOKIE, session_id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.secure_cookies)
        .max_age(time::Duration::seconds(state.session_ttl.num_seconds()))
        .build())
}
