//! Expiring key/value side-channel contract.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SideChannelError {
    #[error("side-channel unreachable: {0}")]
    Unreachable(String),

    #[error("side-channel command failed: {0}")]
    Command(String),
}

/// Minimal expiring key/value store.
///
/// Implementations must give read-after-write consistency for a single key;
/// expiry is owned entirely by the store.
#[async_trait::async_trait]
pub trait SideChannel: Send + Sync {
    /// Write `key` with `value`, expiring after `ttl`. Overwrites (and re-arms) an existing key.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), SideChannelError>;

    /// Whether `key` is present and not yet expired.
    async fn exists(&self, key: &str) -> Result<bool, SideChannelError>;

    /// Liveness probe.
    async fn ping(&self) -> Result<(), SideChannelError>;
}
