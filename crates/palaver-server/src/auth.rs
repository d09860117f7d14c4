//! Session authentication.
//!
//! Clients present a bearer access token at connection time. The token is an
//! HS256 JWT signed with the shared secret by the credential service; this
//! module only verifies signature and expiry and resolves the identity.
//! There is no fallback: a missing or invalid token rejects the connection
//! before any room or message logic runs.

use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use palaver_shared::types::UserId;

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub id: UserId,
    pub email: String,
    pub exp: i64,
}

/// Identity resolved for the lifetime of one session.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: UserId,
    pub email: String,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing access token")]
    Missing,

    #[error("invalid access token: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),
}

/// Verify an access token and resolve the user identity.
pub fn verify_token(secret: &str, token: &str) -> Result<AuthUser, AuthError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;

    Ok(AuthUser {
        id: data.claims.id,
        email: data.claims.email,
    })
}
