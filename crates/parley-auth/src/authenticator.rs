use serde::{Serialize, Serializer, ser::SerializeStruct};
use tracing::debug;

use crate::credentials::Credentials;
use crate::token::TokenService;
use crate::verifier::{ApiKeyVerifier, BearerVerifier, SessionStore, SessionVerifier, Verifier};

/// Which credential proved the caller's identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthMethod {
    Cookie,
    Jwt,
    ApiKey,
}

/// A verified caller. Service callers (`ApiKey`) carry no user id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub method: AuthMethod,
    pub user_id: Option<String>,
}

impl Identity {
    pub fn user(method: AuthMethod, user_id: impl Into<String>) -> Self {
        Self {
            method,
            user_id: Some(user_id.into()),
        }
    }

    pub fn service() -> Self {
        Self {
            method: AuthMethod::ApiKey,
            user_id: None,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }
}

/// Result of running the authenticator over one request.
///
/// Serializes as `{ isAuthenticated, authenticationType, userId? }`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthOutcome {
    identity: Option<Identity>,
}

impl AuthOutcome {
    pub fn anonymous() -> Self {
        Self { identity: None }
    }

    pub fn authenticated(identity: Identity) -> Self {
        Self {
            identity: Some(identity),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    pub fn method(&self) -> Option<AuthMethod> {
        self.identity.as_ref().map(|i| i.method)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.identity.as_ref().and_then(Identity::user_id)
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }
}

impl Serialize for AuthOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let user_id = self.user_id();
        let len = if user_id.is_some() { 3 } else { 2 };
        let mut state = serializer.serialize_struct("AuthOutcome", len)?;
        state.serialize_field("isAuthenticated", &self.is_authenticated())?;
        state.serialize_field("authenticationType", &self.method())?;
        if let Some(id) = user_id {
            state.serialize_field("userId", id)?;
        }
        state.end()
    }
}

/// Ordered chain of verifiers. The first verifier that recognises the
/// request wins; later ones are not consulted.
#[derive(Default)]
pub struct Authenticator {
    verifiers: Vec<Box<dyn Verifier>>,
}

impl Authenticator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a verifier at the lowest precedence.
    pub fn with_verifier(mut self, verifier: impl Verifier + 'static) -> Self {
        self.verifiers.push(Box::new(verifier));
        self
    }

    /// The production chain: session cookie, then bearer token, then
    /// service key. Mechanisms without configuration are left out, so
    /// they can never succeed.
    pub fn standard<S>(sessions: S, tokens: Option<TokenService>, api_key: Option<&str>) -> Self
    where
        S: SessionStore + 'static,
    {
        let mut chain = Self::new().with_verifier(SessionVerifier::new(sessions));
        if let Some(tokens) = tokens {
            chain = chain.with_verifier(BearerVerifier::new(tokens));
        }
        if let Some(key) = api_key {
            chain = chain.with_verifier(ApiKeyVerifier::new(key));
        }
        chain
    }

    pub fn methods(&self) -> Vec<AuthMethod> {
        self.verifiers.iter().map(|v| v.method()).collect()
    }

    pub fn authenticate(&self, credentials: &Credentials) -> AuthOutcome {
        for verifier in &self.verifiers {
            if let Some(identity) = verifier.verify(credentials) {
                debug!(
                    method = ?identity.method,
                    user_id = ?identity.user_id,
                    "Request authenticated"
                );
                return AuthOutcome::authenticated(identity);
            }
        }
        AuthOutcome::anonymous()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::{Duration, Utc};

    use super::*;
    use crate::token::TokenPayload;

    const SECRET: &str = "test-signing-secret";
    const API_KEY: &str = "service-key-123";

    struct MemorySessions(HashMap<String, String>);

    impl SessionStore for MemorySessions {
        fn session_user(&self, session_id: &str) -> anyhow::Result<Option<String>> {
            Ok(self.0.get(session_id).cloned())
        }
    }

    struct BrokenSessions;

    impl SessionStore for BrokenSessions {
        fn session_user(&self, _session_id: &str) -> anyhow::Result<Option<String>> {
            anyhow::bail!("database unavailable")
        }
    }

    fn chain() -> Authenticator {
        let sessions =
            MemorySessions(HashMap::from([("sess-1".to_string(), "cookie-user".to_string())]));
        Authenticator::standard(sessions, Some(TokenService::new(SECRET)), Some(API_KEY))
    }

    fn token_for(user_id: &str, secret: &str, issued_days_ago: i64) -> String {
        let payload = TokenPayload {
            user_id: user_id.to_string(),
            email: "a@b.com".to_string(),
            issued_at: (Utc::now() - Duration::days(issued_days_ago)).timestamp(),
        };
        TokenService::new(secret).sign(&payload).unwrap()
    }

    fn creds(session: Option<&str>, bearer: Option<String>, key: Option<&str>) -> Credentials {
        Credentials {
            session_id: session.map(String::from),
            bearer_token: bearer,
            api_key: key.map(String::from),
        }
    }

    #[test]
    fn cookie_wins_over_everything_else() {
        let outcome = chain().authenticate(&creds(
            Some("sess-1"),
            Some(token_for("jwt-user", SECRET, 0)),
            Some(API_KEY),
        ));
        assert_eq!(outcome.method(), Some(AuthMethod::Cookie));
        assert_eq!(outcome.user_id(), Some("cookie-user"));
    }

    #[test]
    fn valid_token_without_session() {
        let outcome = chain().authenticate(&creds(
            Some("stale-session"),
            Some(token_for("jwt-user", SECRET, 1)),
            Some(API_KEY),
        ));
        assert_eq!(outcome.method(), Some(AuthMethod::Jwt));
        assert_eq!(outcome.user_id(), Some("jwt-user"));
    }

    #[test]
    fn wrong_secret_falls_through_to_api_key() {
        let outcome = chain().authenticate(&creds(
            None,
            Some(token_for("jwt-user", "some-other-secret", 0)),
            Some(API_KEY),
        ));
        assert_eq!(outcome.method(), Some(AuthMethod::ApiKey));
        assert_eq!(outcome.user_id(), None);
    }

    #[test]
    fn expired_token_falls_through_to_api_key() {
        let outcome = chain().authenticate(&creds(
            None,
            Some(token_for("jwt-user", SECRET, 8)),
            Some(API_KEY),
        ));
        assert_eq!(outcome.method(), Some(AuthMethod::ApiKey));
    }

    #[test]
    fn bad_token_and_no_key_is_anonymous() {
        let outcome = chain().authenticate(&creds(None, Some("not-a-jwt".into()), None));
        assert!(!outcome.is_authenticated());
    }

    #[test]
    fn api_key_alone() {
        let outcome = chain().authenticate(&creds(None, None, Some(API_KEY)));
        assert_eq!(outcome.method(), Some(AuthMethod::ApiKey));
        assert_eq!(outcome.user_id(), None);
    }

    #[test]
    fn wrong_api_key_is_rejected() {
        let outcome = chain().authenticate(&creds(None, None, Some("service-key-12")));
        assert!(!outcome.is_authenticated());
    }

    #[test]
    fn no_credentials() {
        let outcome = chain().authenticate(&Credentials::default());
        assert!(!outcome.is_authenticated());
        assert_eq!(outcome.method(), None);
    }

    #[test]
    fn store_failure_is_not_fatal() {
        let auth = Authenticator::standard(BrokenSessions, Some(TokenService::new(SECRET)), None);
        let outcome = auth.authenticate(&creds(
            Some("sess-1"),
            Some(token_for("jwt-user", SECRET, 0)),
            None,
        ));
        assert_eq!(outcome.method(), Some(AuthMethod::Jwt));
    }

    #[test]
    fn unconfigured_mechanisms_always_fail() {
        let auth = Authenticator::standard(MemorySessions(HashMap::new()), None, None);
        assert_eq!(auth.methods(), vec![AuthMethod::Cookie]);

        let outcome = auth.authenticate(&creds(
            None,
            Some(token_for("jwt-user", SECRET, 0)),
            Some(API_KEY),
        ));
        assert!(!outcome.is_authenticated());
    }

    #[test]
    fn outcome_wire_shape() {
        let anon = serde_json::to_value(AuthOutcome::anonymous()).unwrap();
        assert_eq!(
            anon,
            serde_json::json!({ "isAuthenticated": false, "authenticationType": null })
        );

        let user = Identity::user(AuthMethod::Jwt, "u1");
        let jwt = serde_json::to_value(AuthOutcome::authenticated(user)).unwrap();
        assert_eq!(
            jwt,
            serde_json::json!({
                "isAuthenticated": true,
                "authenticationType": "jwt",
                "userId": "u1"
            })
        );

        let svc = serde_json::to_value(AuthOutcome::authenticated(Identity::service())).unwrap();
        assert_eq!(
            svc,
            serde_json::json!({ "isAuthenticated": true, "authenticationType": "apiKey" })
        );
    }
}
