//! Bearer-credential claims.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Principal;

/// Claims carried inside an issued credential.
///
/// Wire names are fixed: `user_id`, `email`, `name`, `iat`, `exp` (unix seconds).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialClaims {
    /// Principal identifier (lowercase hyphenated UUID).
    pub user_id: String,
    pub email: String,
    pub name: String,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Expiry, unix seconds.
    pub exp: i64,
}

impl CredentialClaims {
    pub fn for_principal(principal: &Principal, issued_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            user_id: principal.id.to_string(),
            email: principal.email.clone(),
            name: principal.name.clone(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,
}

/// Check the validity window `[iat, exp)` of a credential at `now`.
///
/// Signature verification happens before this; it only looks at the times.
pub fn validate_claims(iat: i64, exp: i64, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if exp <= iat {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    let now = now.timestamp();
    if now < iat {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= exp {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}
