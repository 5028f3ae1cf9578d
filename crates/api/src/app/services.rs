use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use secrecy::ExposeSecret;

use algoshield_auth::context::{DEFAULT_OP_TIMEOUT, DEFAULT_PROBE_TIMEOUT};
use algoshield_auth::memory::{InMemoryPrincipalStore, InMemorySideChannel};
use algoshield_auth::{AuthError, AuthorityConfig, CallContext, CredentialAuthority, PrincipalStore, SideChannel};
use algoshield_infra::{AppConfig, PostgresPrincipalStore, RedisSideChannel, StoreBackend};

/// Shared application services.
#[derive(Clone)]
pub struct AppServices {
    pub authority: Arc<CredentialAuthority>,
    /// Deadline for each collaborator call made while serving a request.
    pub op_timeout: Duration,
    /// Deadline for each dependency probe of `/health`.
    pub health_timeout: Duration,
}

impl AppServices {
    pub fn new(
        secret: &[u8],
        config: AuthorityConfig,
        store: Arc<dyn PrincipalStore>,
        channel: Arc<dyn SideChannel>,
    ) -> Result<Self, AuthError> {
        let authority = CredentialAuthority::new(secret, config, store, channel)?;
        Ok(Self {
            authority: Arc::new(authority),
            op_timeout: DEFAULT_OP_TIMEOUT,
            health_timeout: DEFAULT_PROBE_TIMEOUT,
        })
    }

    /// Services backed by the in-memory store and side-channel.
    pub fn in_memory(secret: &[u8], config: AuthorityConfig) -> Result<Self, AuthError> {
        Self::new(
            secret,
            config,
            Arc::new(InMemoryPrincipalStore::new()),
            Arc::new(InMemorySideChannel::new()),
        )
    }

    pub fn with_timeouts(mut self, op_timeout: Duration, health_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self.health_timeout = health_timeout;
        self
    }

    /// A fresh call context for one request.
    pub fn call_context(&self) -> CallContext {
        CallContext::new(self.op_timeout)
    }
}

/// Wire the collaborators selected by `STORE_BACKEND`.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let (store, channel): (Arc<dyn PrincipalStore>, Arc<dyn SideChannel>) = match config.store_backend {
        StoreBackend::Memory => {
            tracing::warn!("using in-memory principal store and side-channel; state is lost on restart");
            (
                Arc::new(InMemoryPrincipalStore::new()) as Arc<dyn PrincipalStore>,
                Arc::new(InMemorySideChannel::new()) as Arc<dyn SideChannel>,
            )
        }
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_ref()
                .context("database url is not configured")?;
            let store = PostgresPrincipalStore::connect(url.expose_secret(), config.db_timeout)
                .await
                .context("failed to connect to postgres")?;
            let channel = RedisSideChannel::connect(&config.redis_url)
                .await
                .context("failed to connect to redis")?;
            tracing::info!("connected to postgres and redis");
            (
                Arc::new(store) as Arc<dyn PrincipalStore>,
                Arc::new(channel) as Arc<dyn SideChannel>,
            )
        }
    };

    let services = AppServices::new(config.jwt_secret_bytes(), config.authority_config(), store, channel)
        .context("failed to build credential authority")?;
    Ok(services.with_timeouts(config.db_timeout, config.health_timeout))
}
