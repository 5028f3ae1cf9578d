//! HTTP application wiring (axum router + middleware stack).
//!
//! - `services.rs`: collaborator wiring (store, side-channel, authority)
//! - `routes/`: handlers
//! - `dto.rs`: request/response bodies and input validation
//! - `errors.rs`: the error envelope

use std::sync::Arc;

use axum::{Extension, Router};
use tower::ServiceBuilder;

use crate::middleware::{self, RoleRequirement};

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Role allowed to revoke other principals' sessions.
pub const ADMIN_ROLE: &str = "admin";

/// Build the full HTTP router (public entrypoint used by `main.rs` and the tests).
pub fn build_app(services: services::AppServices) -> Router {
    let auth_state = middleware::AuthState {
        authority: services.authority.clone(),
        op_timeout: services.op_timeout,
    };
    let services = Arc::new(services);

    let protected = routes::protected_auth_router().route_layer(axum::middleware::from_fn_with_state(
        auth_state.clone(),
        middleware::auth_middleware,
    ));

    // Layers run outermost-last: authenticate first, then check roles.
    let admin = routes::admin_auth_router()
        .route_layer(axum::middleware::from_fn_with_state(
            RoleRequirement::role(ADMIN_ROLE),
            middleware::require_roles,
        ))
        .route_layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    let auth = routes::public_auth_router().merge(protected).merge(admin);

    Router::new()
        .merge(routes::system_router())
        .nest("/api/v1/auth", auth)
        .layer(Extension(services))
        .layer(ServiceBuilder::new())
}
