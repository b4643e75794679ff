use axum::http::{HeaderMap, header};
use axum_extra::extract::CookieJar;

/// Name of the cookie holding the server-side session id.
pub const SESSION_COOKIE: &str = "parley_session";

/// Header carrying the shared service key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// The raw credentials a request presents. Nothing here is verified yet.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub session_id: Option<String>,
    pub bearer_token: Option<String>,
    pub api_key: Option<String>,
}

impl Credentials {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let session_id = CookieJar::from_headers(headers)
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty());

        let bearer_token = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from);

        let api_key = headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|k| !k.is_empty())
            .map(String::from);

        Self {
            session_id,
            bearer_token,
            api_key,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.session_id.is_none() && self.bearer_token.is_none() && self.api_key.is_none()
    }
}
