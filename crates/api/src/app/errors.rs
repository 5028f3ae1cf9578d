//! Error envelope: the single translation point from internal outcomes to
//! `{code, message, details?}` plus an HTTP status.

use std::sync::atomic::{AtomicBool, Ordering};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use algoshield_auth::{AuthError, GuardError};
use algoshield_core::DomainError;

static EXPOSE_DETAILS: AtomicBool = AtomicBool::new(false);

/// Whether `details` is rendered on the wire. Enabled only in development.
pub fn set_expose_details(expose: bool) {
    EXPOSE_DETAILS.store(expose, Ordering::Relaxed);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidCredentials,
    TokenExpired,
    TokenRevoked,
    TokenInvalid,
    Unauthorized,
    UserInactive,
    InsufficientPermissions,
    Forbidden,
    NotFound,
    Conflict,
    BadRequest,
    ValidationError,
    RateLimitExceeded,
    InternalError,
}

impl ErrorCode {
    pub fn http_status(self) -> StatusCode {
        match self {
            ErrorCode::InvalidCredentials
            | ErrorCode::TokenExpired
            | ErrorCode::TokenRevoked
            | ErrorCode::TokenInvalid
            | ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::UserInactive | ErrorCode::InsufficientPermissions | ErrorCode::Forbidden => {
                StatusCode::FORBIDDEN
            }
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::BadRequest | ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiError {
    code: ErrorCode,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Replace the message of an `INTERNAL_ERROR`; other codes keep theirs.
    pub fn with_internal_message(mut self, message: impl Into<String>) -> Self {
        if self.code == ErrorCode::InternalError {
            self.message = message.into();
        }
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new(ErrorCode::NotFound, format!("{resource} not found"))
    }

    pub fn insufficient_permissions() -> Self {
        Self::new(
            ErrorCode::InsufficientPermissions,
            "You don't have permission to perform this action",
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(mut self) -> Response {
        if !EXPOSE_DETAILS.load(Ordering::Relaxed) {
            self.details = None;
        }
        (self.code.http_status(), axum::Json(self)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => {
                Self::new(ErrorCode::InvalidCredentials, "Invalid email or password")
            }
            AuthError::Inactive => Self::new(ErrorCode::UserInactive, "User account is inactive"),
            AuthError::Expired => Self::new(ErrorCode::TokenExpired, "Token has expired"),
            AuthError::Revoked => Self::new(ErrorCode::TokenRevoked, "Token has been revoked"),
            AuthError::Invalid(reason) => {
                Self::new(ErrorCode::TokenInvalid, "Invalid or malformed token").with_details(reason)
            }
            AuthError::NotFound => Self::not_found("User"),
            AuthError::Conflict => {
                Self::new(ErrorCode::Conflict, "User with this email already exists")
            }
            AuthError::Validation(reason) => Self::validation(reason),
            AuthError::Cancelled => {
                Self::internal("Internal server error").with_details("request cancelled")
            }
            AuthError::Internal(reason) => {
                tracing::error!(error = %reason, "internal error");
                Self::internal("Internal server error").with_details(reason)
            }
        }
    }
}

impl From<GuardError> for ApiError {
    fn from(err: GuardError) -> Self {
        match err {
            GuardError::Unauthenticated => Self::unauthorized("Authentication required"),
            GuardError::InsufficientPermissions(required) => {
                Self::insufficient_permissions().with_details(format!("requires one of: {}", required.join(", ")))
            }
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidId(msg) => Self::bad_request("Invalid identifier").with_details(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_serialize_as_screaming_snake_case() {
        let body = serde_json::to_value(ApiError::new(ErrorCode::TokenRevoked, "x")).unwrap();
        assert_eq!(body["code"], "TOKEN_REVOKED");
        assert!(body.get("details").is_none());

        let code = serde_json::to_value(ErrorCode::InsufficientPermissions).unwrap();
        assert_eq!(code, "INSUFFICIENT_PERMISSIONS");
    }

    #[test]
    fn status_table() {
        assert_eq!(ErrorCode::TokenExpired.http_status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::UserInactive.http_status(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorCode::NotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::Conflict.http_status(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::ValidationError.http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::RateLimitExceeded.http_status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ErrorCode::InternalError.http_status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn auth_errors_map_to_wire_codes() {
        let cases = [
            (AuthError::InvalidCredentials, ErrorCode::InvalidCredentials),
            (AuthError::Inactive, ErrorCode::UserInactive),
            (AuthError::Expired, ErrorCode::TokenExpired),
            (AuthError::Revoked, ErrorCode::TokenRevoked),
            (AuthError::invalid("bad mac"), ErrorCode::TokenInvalid),
            (AuthError::NotFound, ErrorCode::NotFound),
            (AuthError::Conflict, ErrorCode::Conflict),
            (AuthError::Cancelled, ErrorCode::InternalError),
            (AuthError::internal("db down"), ErrorCode::InternalError),
        ];
        for (err, code) in cases {
            assert_eq!(ApiError::from(err).code(), code);
        }
    }

    #[test]
    fn internal_message_override_only_touches_internal_errors() {
        let err = ApiError::from(AuthError::internal("boom")).with_internal_message("Login failed");
        assert_eq!(err.message(), "Login failed");
        assert_eq!(err.details(), Some("boom"));

        let err = ApiError::from(AuthError::Conflict).with_internal_message("Failed to register user");
        assert_eq!(err.message(), "User with this email already exists");
    }

    #[test]
    fn malformed_identifiers_are_bad_requests() {
        let err = ApiError::from("nope".parse::<algoshield_core::PrincipalId>().unwrap_err());
        assert_eq!(err.code(), ErrorCode::BadRequest);
        assert_eq!(err.message(), "Invalid identifier");
        assert!(err.details().is_some_and(|d| d.starts_with("PrincipalId")));
    }

    #[test]
    fn guard_errors_map_to_401_and_403() {
        assert_eq!(ApiError::from(GuardError::Unauthenticated).code(), ErrorCode::Unauthorized);
        let err = ApiError::from(GuardError::InsufficientPermissions(vec!["admin".into()]));
        assert_eq!(err.code(), ErrorCode::InsufficientPermissions);
        assert_eq!(err.message(), "You don't have permission to perform this action");
    }
}
