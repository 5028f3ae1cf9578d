use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use serde::Serialize;

use algoshield_auth::CallContext;

use crate::app::services::AppServices;

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub timestamp: i64,
    pub postgres: &'static str,
    pub redis: &'static str,
}

fn probe_label(healthy: bool) -> &'static str {
    if healthy { "healthy" } else { "unhealthy" }
}

/// Liveness plus dependency probes; 503 when any dependency is down.
pub async fn health(Extension(services): Extension<Arc<AppServices>>) -> impl IntoResponse {
    let ctx = CallContext::new(services.health_timeout);

    let store_ok = match ctx.run("store.ping", services.authority.store().ping()).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "principal store health check failed");
            false
        }
    };
    let channel_ok = match services.authority.revocations().probe(&ctx).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "side-channel health check failed");
            false
        }
    };

    let healthy = store_ok && channel_ok;
    let report = HealthReport {
        status: if healthy { "ok" } else { "degraded" },
        timestamp: chrono::Utc::now().timestamp(),
        postgres: probe_label(store_ok),
        redis: probe_label(channel_ok),
    };
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

pub async fn ready() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ready" }))
}
