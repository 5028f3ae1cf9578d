//! Redis-backed side-channel.
//!
//! Keys are written with `PSETEX` (millisecond TTL) so sub-second remainders
//! of a credential's lifetime are not rounded away. Existence is `EXISTS`,
//! liveness is `PING`.

use std::time::Duration;

use redis::aio::ConnectionManager;
use tracing::instrument;

use algoshield_auth::{SideChannel, SideChannelError};

#[derive(Clone)]
pub struct RedisSideChannel {
    manager: ConnectionManager,
}

impl RedisSideChannel {
    /// Connect to `redis_url` (e.g. `redis://localhost:6379`).
    ///
    /// The connection manager reconnects on its own after transient failures.
    pub async fn connect(redis_url: impl AsRef<str>) -> Result<Self, SideChannelError> {
        let client =
            redis::Client::open(redis_url.as_ref()).map_err(|e| SideChannelError::Unreachable(e.to_string()))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| SideChannelError::Unreachable(e.to_string()))?;
        Ok(Self { manager })
    }
}

fn map_redis_error(err: redis::RedisError) -> SideChannelError {
    if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() || err.is_timeout() {
        SideChannelError::Unreachable(err.to_string())
    } else {
        SideChannelError::Command(err.to_string())
    }
}

#[async_trait::async_trait]
impl SideChannel for RedisSideChannel {
    #[instrument(skip(self, value), err)]
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), SideChannelError> {
        // PSETEX rejects a zero TTL.
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let mut conn = self.manager.clone();
        redis::cmd("PSETEX")
            .arg(key)
            .arg(millis)
            .arg(value)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(map_redis_error)
    }

    #[instrument(skip(self), err)]
    async fn exists(&self, key: &str) -> Result<bool, SideChannelError> {
        let mut conn = self.manager.clone();
        redis::cmd("EXISTS")
            .arg(key)
            .query_async::<_, bool>(&mut conn)
            .await
            .map_err(map_redis_error)
    }

    async fn ping(&self) -> Result<(), SideChannelError> {
        let mut conn = self.manager.clone();
        let pong = redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(map_redis_error)?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(SideChannelError::Command(format!("unexpected PING reply: {pong}")))
        }
    }
}
