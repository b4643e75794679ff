use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::authenticator::{AuthMethod, Identity};
use crate::credentials::Credentials;
use crate::token::TokenService;

/// One credential strategy. Returns `None` both when the credential is
/// absent and when it fails to verify.
pub trait Verifier: Send + Sync {
    fn method(&self) -> AuthMethod;
    fn verify(&self, credentials: &Credentials) -> Option<Identity>;
}

/// Backing store for browser sessions.
pub trait SessionStore: Send + Sync {
    /// User id owning a live (unexpired) session, if any.
    fn session_user(&self, session_id: &str) -> anyhow::Result<Option<String>>;
}

pub struct SessionVerifier<S> {
    store: S,
}

impl<S: SessionStore> SessionVerifier<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S: SessionStore> Verifier for SessionVerifier<S> {
    fn method(&self) -> AuthMethod {
        AuthMethod::Cookie
    }

    fn verify(&self, credentials: &Credentials) -> Option<Identity> {
        let session_id = credentials.session_id.as_deref()?;
        match self.store.session_user(session_id) {
            Ok(Some(user_id)) => Some(Identity::user(AuthMethod::Cookie, user_id)),
            Ok(None) => {
                debug!("Session cookie does not match a live session");
                None
            }
            Err(e) => {
                warn!("Session lookup failed: {}", e);
                None
            }
        }
    }
}

pub struct BearerVerifier {
    tokens: TokenService,
}

impl BearerVerifier {
    pub fn new(tokens: TokenService) -> Self {
        Self { tokens }
    }
}

impl Verifier for BearerVerifier {
    fn method(&self) -> AuthMethod {
        AuthMethod::Jwt
    }

    fn verify(&self, credentials: &Credentials) -> Option<Identity> {
        let token = credentials.bearer_token.as_deref()?;
        match self.tokens.verify(token) {
            Ok(payload) => Some(Identity::user(AuthMethod::Jwt, payload.user_id)),
            Err(e) => {
                debug!("Bearer token rejected: {}", e);
                None
            }
        }
    }
}

/// Matches the `X-API-Key` header against the configured service key.
/// Both sides are hashed first so the comparison never short-circuits on
/// a shared prefix of the secret.
pub struct ApiKeyVerifier {
    expected: [u8; 32],
}

impl ApiKeyVerifier {
    pub fn new(key: &str) -> Self {
        Self {
            expected: digest(key),
        }
    }
}

impl Verifier for ApiKeyVerifier {
    fn method(&self) -> AuthMethod {
        AuthMethod::ApiKey
    }

    fn verify(&self, credentials: &Credentials) -> Option<Identity> {
        let key = credentials.api_key.as_deref()?;
        if digest(key) == self.expected {
            Some(Identity::service())
        } else {
            warn!("Rejected request with an invalid API key");
            None
        }
    }
}

fn digest(value: &str) -> [u8; 32] {
    Sha256::digest(value.as_bytes()).into()
}
