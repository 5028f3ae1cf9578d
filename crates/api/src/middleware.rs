use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use algoshield_auth::{CallContext, CredentialAuthority, require_any_role};

use crate::app::errors::ApiError;
use crate::context::{BearerCredential, PrincipalContext};

#[derive(Clone)]
pub struct AuthState {
    pub authority: Arc<CredentialAuthority>,
    pub op_timeout: Duration,
}

/// Validates the bearer credential and attaches the principal to the request.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer(req.headers())?.to_string();

    let ctx = CallContext::new(state.op_timeout);
    let principal = state.authority.validate(&ctx, &token).await?;

    req.extensions_mut().insert(PrincipalContext::new(principal));
    req.extensions_mut().insert(BearerCredential::new(token));

    Ok(next.run(req).await)
}

/// `Authorization: Bearer <credential>`, split on single spaces into exactly two parts.
fn extract_bearer(headers: &HeaderMap) -> Result<&str, ApiError> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or_else(|| ApiError::unauthorized("Authorization header required"))?;

    let malformed = || ApiError::unauthorized("Invalid authorization header format");
    let header = header.to_str().map_err(|_| malformed())?;

    let parts: Vec<&str> = header.split(' ').collect();
    match parts.as_slice() {
        ["Bearer", token] => Ok(*token),
        _ => Err(malformed()),
    }
}

/// Role precondition for a group of routes: the principal must hold at least
/// one of the listed roles.
#[derive(Debug, Clone)]
pub struct RoleRequirement {
    names: Arc<BTreeSet<String>>,
}

impl RoleRequirement {
    pub fn role(name: impl Into<String>) -> Self {
        Self::any_of([name.into()])
    }

    pub fn any_of<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: Arc::new(names.into_iter().map(Into::into).collect()),
        }
    }
}

/// Must run after [`auth_middleware`].
pub async fn require_roles(
    State(requirement): State<RoleRequirement>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal = req.extensions().get::<PrincipalContext>().map(PrincipalContext::principal);
    require_any_role(principal, requirement.names.iter().map(String::as_str))?;
    Ok(next.run(req).await)
}
