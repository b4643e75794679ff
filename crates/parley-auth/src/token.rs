use chrono::{Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};

/// Issued tokens are valid for exactly this long.
pub const TOKEN_LIFETIME_DAYS: i64 = 7;

/// What a bearer token asserts about its holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPayload {
    pub user_id: String,
    pub email: String,
    /// Unix seconds.
    pub issued_at: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    #[serde(flatten)]
    payload: TokenPayload,
    exp: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("invalid token: {0}")]
    Invalid(jsonwebtoken::errors::Error),
    #[error("failed to sign token: {0}")]
    Signing(jsonwebtoken::errors::Error),
}

/// HS256 signer/verifier over the shared server secret.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenService {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Issue a token for a user, stamped with the current time.
    pub fn issue(&self, user_id: &str, email: &str) -> Result<String, TokenError> {
        self.sign(&TokenPayload {
            user_id: user_id.to_string(),
            email: email.to_string(),
            issued_at: Utc::now().timestamp(),
        })
    }

    /// Sign an explicit payload. Expiry is derived from `issued_at`.
    pub fn sign(&self, payload: &TokenPayload) -> Result<String, TokenError> {
        let claims = Claims {
            payload: payload.clone(),
            exp: payload.issued_at + Duration::days(TOKEN_LIFETIME_DAYS).num_seconds(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(TokenError::Signing)
    }

    pub fn verify(&self, token: &str) -> Result<TokenPayload, TokenError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims.payload)
            .map_err(|e| {
                if matches!(e.kind(), ErrorKind::ExpiredSignature) {
                    TokenError::Expired
                } else {
                    TokenError::Invalid(e)
                }
            })
    }
}
