//! Principal repository contract.

use chrono::{DateTime, Utc};
use thiserror::Error;

use algoshield_core::PrincipalId;

use crate::{NewPrincipal, PasswordVerifier, Principal, PrincipalWithVerifier};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("principal with this email already exists")]
    Conflict,

    #[error("principal not found")]
    NotFound,

    #[error("storage error: {0}")]
    Backend(String),
}

/// Principal lookups and the few writes the authentication layer needs.
///
/// Email arguments are compared case-insensitively.
#[async_trait::async_trait]
pub trait PrincipalStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, StoreError>;

    /// Password-verifying lookup. Principals without a verifier (e.g. SSO
    /// accounts) are reported as absent.
    async fn find_by_email_with_verifier(&self, email: &str) -> Result<Option<PrincipalWithVerifier>, StoreError>;

    async fn find_by_id(&self, id: PrincipalId) -> Result<Option<Principal>, StoreError>;

    async fn find_by_id_with_verifier(&self, id: PrincipalId) -> Result<Option<PrincipalWithVerifier>, StoreError>;

    /// Create an active principal. Fails with [`StoreError::Conflict`] on a duplicate email.
    async fn create(&self, new: NewPrincipal) -> Result<Principal, StoreError>;

    async fn update_last_login(&self, id: PrincipalId, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn update_password_verifier(&self, id: PrincipalId, verifier: PasswordVerifier) -> Result<(), StoreError>;

    /// Liveness probe.
    async fn ping(&self) -> Result<(), StoreError>;
}
