use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, rejection::JsonRejection},
};

use algoshield_auth::{AuthError, Principal, PrincipalId};

use crate::app::dto::{AuthResponse, ChangePasswordRequest, LoginRequest, MessageResponse, RegisterRequest};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::context::{BearerCredential, PrincipalContext};

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::bad_request("Invalid request body").with_details(rejection.body_text()))
}

pub async fn register(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, ApiError> {
    let req = body(payload)?;
    req.validate()?;

    let ctx = services.call_context();
    let (user, token) = services
        .authority
        .register(&ctx, &req.email, req.name.trim(), &req.password)
        .await
        .map_err(|e| ApiError::from(e).with_internal_message("Failed to register user"))?;

    tracing::info!(principal_id = %user.id, "user registered");
    Ok(Json(AuthResponse { token, user }))
}

pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, ApiError> {
    let req = body(payload)?;
    req.validate()?;

    let ctx = services.call_context();
    let (user, token) = services
        .authority
        .authenticate(&ctx, &req.email, &req.password)
        .await
        .map_err(|e| ApiError::from(e).with_internal_message("Login failed"))?;

    tracing::info!(principal_id = %user.id, "user logged in");
    Ok(Json(AuthResponse { token, user }))
}

pub async fn me(Extension(principal): Extension<PrincipalContext>) -> Json<Principal> {
    Json(principal.principal().clone())
}

pub async fn logout(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Extension(credential): Extension<BearerCredential>,
) -> Result<Json<MessageResponse>, ApiError> {
    let ctx = services.call_context();
    services
        .authority
        .logout(&ctx, credential.as_str())
        .await
        .map_err(|e| ApiError::from(e).with_internal_message("Failed to logout"))?;

    tracing::info!(principal_id = %principal.principal_id(), "user logged out");
    Ok(Json(MessageResponse::new("Logged out successfully")))
}

pub async fn change_password(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let req = body(payload)?;
    req.validate()?;

    let ctx = services.call_context();
    services
        .authority
        .change_password(&ctx, principal.principal_id(), &req.current_password, &req.new_password)
        .await
        .map_err(|e| ApiError::from(e).with_internal_message("Failed to change password"))?;

    Ok(Json(MessageResponse::new("Password changed successfully")))
}

pub async fn revoke_sessions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(operator): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let target: PrincipalId = id.parse().map_err(ApiError::from)?;

    let ctx = services.call_context();
    let found = ctx
        .run("store.find_by_id", services.authority.store().find_by_id(target))
        .await
        .map_err(|e| {
            tracing::error!(principal_id = %target, error = %e, "failed to load principal");
            ApiError::internal("Failed to revoke sessions").with_details(e.to_string())
        })?;
    if found.is_none() {
        return Err(AuthError::NotFound.into());
    }

    services
        .authority
        .invalidate_all_for(&ctx, target)
        .await
        .map_err(|e| ApiError::from(e).with_internal_message("Failed to revoke sessions"))?;

    tracing::info!(operator = %operator.principal_id(), principal_id = %target, "sessions revoked");
    Ok(Json(MessageResponse::new("All sessions revoked")))
}
