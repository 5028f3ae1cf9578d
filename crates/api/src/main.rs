use anyhow::Context;

use algoshield_api::app::{self, errors, services};
use algoshield_infra::{AppConfig, TlsConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;

    algoshield_observability::init_with(&config.log_level, config.log_format);
    errors::set_expose_details(config.is_development());

    if let Some(tls) = &config.tls {
        check_tls_material(tls)?;
    }

    let services = services::build_services(&config).await?;
    let router = app::build_app(services);

    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr()))?;

    tracing::info!(
        environment = config.environment.as_str(),
        addr = %listener.local_addr()?,
        "listening"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("server stopped");
    Ok(())
}

/// The listener speaks plain HTTP; TLS terminates at the ingress, which is
/// handed the same cert/key pair. Fail fast if that pair is unreadable.
fn check_tls_material(tls: &TlsConfig) -> anyhow::Result<()> {
    for path in [&tls.cert_path, &tls.key_path] {
        std::fs::File::open(path).with_context(|| format!("cannot read TLS file {path}"))?;
    }
    tracing::info!(cert = %tls.cert_path, "TLS material present; expecting termination upstream");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
