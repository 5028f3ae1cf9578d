use thiserror::Error;

/// Outcome taxonomy of the credential authority.
///
/// The HTTP layer is the single place that turns these into wire codes.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown email, missing verifier or wrong password (deliberately indistinguishable).
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("user account is inactive")]
    Inactive,

    #[error("token has expired")]
    Expired,

    #[error("token has been revoked")]
    Revoked,

    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("principal not found")]
    NotFound,

    #[error("principal with this email already exists")]
    Conflict,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
