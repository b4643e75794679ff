use axum::http::StatusCode;
use parley_types::models::Visibility;

use crate::authenticator::{AuthMethod, Identity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error("authentication required")]
    Unauthenticated,
    #[error("access denied")]
    Forbidden,
}

impl AccessError {
    pub fn status(self) -> StatusCode {
        match self {
            AccessError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AccessError::Forbidden => StatusCode::FORBIDDEN,
        }
    }
}

impl From<AccessError> for StatusCode {
    fn from(e: AccessError) -> Self {
        e.status()
    }
}

/// Decide whether `caller` may touch a resource owned by `owner_id`.
///
/// Every handler goes through here. Public resources are readable by
/// anyone. Private ones are readable by their owner and by service
/// callers. Writes are owner-only; the service key grants no write access.
pub fn authorize(
    caller: Option<&Identity>,
    owner_id: &str,
    visibility: Visibility,
    access: Access,
) -> Result<(), AccessError> {
    if access == Access::Read && visibility == Visibility::Public {
        return Ok(());
    }

    let identity = caller.ok_or(AccessError::Unauthenticated)?;

    if identity.user_id() == Some(owner_id) {
        return Ok(());
    }

    if access == Access::Read && identity.method == AuthMethod::ApiKey {
        return Ok(());
    }

    Err(AccessError::Forbidden)
}
