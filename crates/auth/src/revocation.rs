//! Revocation registry: the negative side of stateless credentials.
//!
//! Two disjoint keyspaces live in the side-channel:
//!
//! - `blacklist/<sha256-hex>`: one revoked credential, expiring with the credential.
//! - `blacklist/principal/<id>`: every credential of a principal, for one maximum lifetime.
//!
//! Only the digest of a credential is ever sent to the side-channel. Both
//! checks are O(1) existence lookups; expiry is the side-channel's job.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use algoshield_core::PrincipalId;

use crate::{CallContext, CallError, SideChannel, SideChannelError};

pub const CREDENTIAL_KEY_PREFIX: &str = "blacklist/";
pub const PRINCIPAL_KEY_PREFIX: &str = "blacklist/principal/";

const MARKER: &str = "1";

#[derive(Debug, Error)]
pub enum RevocationError {
    #[error("operation cancelled")]
    Cancelled,

    #[error("side-channel {op} exceeded its {after:?} deadline")]
    DeadlineExceeded { op: &'static str, after: Duration },

    #[error(transparent)]
    SideChannel(#[from] SideChannelError),
}

impl From<CallError<SideChannelError>> for RevocationError {
    fn from(value: CallError<SideChannelError>) -> Self {
        match value {
            CallError::Cancelled => Self::Cancelled,
            CallError::DeadlineExceeded { op, after } => Self::DeadlineExceeded { op, after },
            CallError::Failed(e) => Self::SideChannel(e),
        }
    }
}

#[derive(Clone)]
pub struct RevocationRegistry {
    channel: Arc<dyn SideChannel>,
}

impl RevocationRegistry {
    pub fn new(channel: Arc<dyn SideChannel>) -> Self {
        Self { channel }
    }

    /// Record a single-credential entry that lives until `expires_at`.
    ///
    /// Already-expired credentials are not stored.
    pub async fn record_single(
        &self,
        ctx: &CallContext,
        carrier: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RevocationError> {
        self.record_single_at(ctx, carrier, expires_at, Utc::now()).await
    }

    pub async fn record_single_at(
        &self,
        ctx: &CallContext,
        carrier: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), RevocationError> {
        let ttl = match (expires_at - now).to_std() {
            Ok(ttl) if !ttl.is_zero() => ttl,
            _ => {
                debug!("credential already expired; nothing to revoke");
                return Ok(());
            }
        };

        let key = credential_key(carrier);
        ctx.run("revocation.record_single", self.channel.set_with_ttl(&key, MARKER, ttl))
            .await?;
        Ok(())
    }

    pub async fn contains_single(&self, ctx: &CallContext, carrier: &str) -> Result<bool, RevocationError> {
        let key = credential_key(carrier);
        Ok(ctx.run("revocation.contains_single", self.channel.exists(&key)).await?)
    }

    /// Revoke every credential of `principal_id` for `horizon`.
    ///
    /// Re-recording overwrites the entry, so the horizon restarts from now.
    pub async fn record_all(
        &self,
        ctx: &CallContext,
        principal_id: PrincipalId,
        horizon: Duration,
    ) -> Result<(), RevocationError> {
        let key = principal_key(principal_id);
        ctx.run("revocation.record_all", self.channel.set_with_ttl(&key, MARKER, horizon))
            .await?;
        Ok(())
    }

    pub async fn contains_all(&self, ctx: &CallContext, principal_id: PrincipalId) -> Result<bool, RevocationError> {
        let key = principal_key(principal_id);
        Ok(ctx.run("revocation.contains_all", self.channel.exists(&key)).await?)
    }

    pub async fn probe(&self, ctx: &CallContext) -> Result<(), RevocationError> {
        ctx.run("revocation.probe", self.channel.ping()).await?;
        Ok(())
    }
}

/// SHA-256 of the carrier, lowercase hex (64 chars).
pub fn credential_digest(carrier: &str) -> String {
    hex::encode(Sha256::digest(carrier.as_bytes()))
}

pub fn credential_key(carrier: &str) -> String {
    format!("{CREDENTIAL_KEY_PREFIX}{}", credential_digest(carrier))
}

pub fn principal_key(principal_id: PrincipalId) -> String {
    format!("{PRINCIPAL_KEY_PREFIX}{principal_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemorySideChannel;
    use chrono::Duration as ChronoDuration;
    use proptest::prelude::*;

    fn registry() -> (Arc<InMemorySideChannel>, RevocationRegistry) {
        let channel = Arc::new(InMemorySideChannel::new());
        (channel.clone(), RevocationRegistry::new(channel))
    }

    #[tokio::test]
    async fn single_entry_is_keyed_by_digest() {
        let (channel, registry) = registry();
        let ctx = CallContext::default();
        let carrier = "header.claims.mac";

        registry
            .record_single(&ctx, carrier, Utc::now() + ChronoDuration::hours(1))
            .await
            .unwrap();

        assert!(registry.contains_single(&ctx, carrier).await.unwrap());
        assert!(!registry.contains_single(&ctx, "other.claims.mac").await.unwrap());

        let keys = channel.keys();
        assert_eq!(keys, vec![credential_key(carrier)]);
        assert!(!keys[0].contains(carrier));
    }

    #[tokio::test]
    async fn expired_credential_is_not_stored() {
        let (channel, registry) = registry();
        let ctx = CallContext::default();

        registry
            .record_single(&ctx, "a.b.c", Utc::now() - ChronoDuration::seconds(1))
            .await
            .unwrap();

        assert!(channel.keys().is_empty());
    }

    #[tokio::test]
    async fn re_revoking_is_idempotent() {
        let (channel, registry) = registry();
        let ctx = CallContext::default();
        let exp = Utc::now() + ChronoDuration::minutes(5);

        registry.record_single(&ctx, "a.b.c", exp).await.unwrap();
        registry.record_single(&ctx, "a.b.c", exp).await.unwrap();

        assert_eq!(channel.keys().len(), 1);
    }

    #[tokio::test]
    async fn principal_entry_is_independent_of_single_entries() {
        let (channel, registry) = registry();
        let ctx = CallContext::default();
        let id = PrincipalId::new();

        registry
            .record_all(&ctx, id, Duration::from_secs(3600))
            .await
            .unwrap();

        assert!(registry.contains_all(&ctx, id).await.unwrap());
        assert!(!registry.contains_all(&ctx, PrincipalId::new()).await.unwrap());
        assert_eq!(channel.keys(), vec![format!("blacklist/principal/{id}")]);
    }

    #[tokio::test]
    async fn side_channel_failure_surfaces() {
        let (channel, registry) = registry();
        let ctx = CallContext::default();
        channel.set_failing(true);

        let err = registry.contains_single(&ctx, "a.b.c").await.unwrap_err();
        assert!(matches!(err, RevocationError::SideChannel(_)));
        assert!(registry.probe(&ctx).await.is_err());
    }

    proptest! {
        #[test]
        fn digest_is_64_lowercase_hex(carrier in ".{0,256}") {
            let d = credential_digest(&carrier);
            prop_assert_eq!(d.len(), 64);
            prop_assert!(d.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        }
    }
}
