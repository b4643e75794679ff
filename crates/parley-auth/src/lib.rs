//! Parley request authentication.
//!
//! A request may carry a browser session cookie, a bearer token, a service
//! API key, or any mix of them. The `Authenticator` tries one `Verifier`
//! per credential kind in a fixed order and reports the first that
//! succeeds. Access to individual resources is then decided by
//! `policy::authorize`, the single place where ownership, visibility and
//! the service-key read bypass are combined.

pub mod authenticator;
pub mod credentials;
pub mod policy;
pub mod token;
pub mod verifier;

pub use authenticator::{AuthMethod, AuthOutcome, Authenticator, Identity};
pub use credentials::{API_KEY_HEADER, Credentials, SESSION_COOKIE};
pub use policy::{Access, AccessError, authorize};
pub use token::{TOKEN_LIFETIME_DAYS, TokenError, TokenPayload, TokenService};
pub use verifier::{ApiKeyVerifier, BearerVerifier, SessionStore, SessionVerifier, Verifier};
