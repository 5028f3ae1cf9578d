use axum::{
    Router,
    routing::{get, post},
};

pub mod auth;
pub mod system;

/// Public auth endpoints (no credential required).
pub fn public_auth_router() -> Router {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
}

/// Auth endpoints that run behind the credential middleware.
pub fn protected_auth_router() -> Router {
    Router::new()
        .route("/me", get(auth::me))
        .route("/logout", post(auth::logout))
        .route("/password", post(auth::change_password))
}

/// Operator endpoints; callers must also pass a role requirement.
pub fn admin_auth_router() -> Router {
    Router::new().route("/users/:id/revoke-sessions", post(auth::revoke_sessions))
}

pub fn system_router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/ready", get(system::ready))
}
