//! Credential Authority: issuance and validation of bearer credentials.
//!
//! Credentials are HS256-signed JWTs carrying the claims in
//! [`CredentialClaims`]. Validation runs a fixed sequence:
//!
//! 1. header `alg` must be HS256 (checked before any key is touched)
//! 2. MAC verification
//! 3. validity window (`iat`, `exp`)
//! 4. `user_id` claim parses as a principal id
//! 5. single-credential revocation lookup
//! 6. principal-wide revocation lookup
//! 7. principal lookup and `active` check
//!
//! Revocation reads follow [`RevocationReadPolicy`]; revocation writes always
//! hard-fail.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, decode_header, encode};
use serde_json::{Map, Value};

use algoshield_core::PrincipalId;

use crate::principal::normalize_email;
use crate::{
    AuthError, CallContext, CallError, CredentialClaims, NewPrincipal, PasswordHasher, PasswordHasherConfig,
    Principal, PrincipalStore, RevocationError, RevocationRegistry, SideChannel, StoreError, TokenValidationError,
    validate_claims,
};

const ALGORITHM: Algorithm = Algorithm::HS256;

/// What to do when a revocation lookup fails with an infrastructure error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RevocationReadPolicy {
    /// Log and treat the lookup as negative.
    #[default]
    FailOpen,
    /// Treat the lookup as a hit.
    FailClosed,
}

#[derive(Debug, Clone)]
pub struct AuthorityConfig {
    /// Credential lifetime; also the horizon of principal-wide revocations.
    pub lifetime: Duration,
    pub read_policy: RevocationReadPolicy,
    pub hasher: PasswordHasherConfig,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            lifetime: Duration::hours(24),
            read_policy: RevocationReadPolicy::FailOpen,
            hasher: PasswordHasherConfig::default(),
        }
    }
}

/// Issues and validates credentials, and records revocations.
///
/// Stateless beyond configuration; share one instance behind an `Arc`.
#[derive(Clone)]
pub struct CredentialAuthority {
    store: Arc<dyn PrincipalStore>,
    revocations: RevocationRegistry,
    hasher: PasswordHasher,
    encoding: EncodingKey,
    decoding: DecodingKey,
    lifetime: Duration,
    read_policy: RevocationReadPolicy,
}

impl CredentialAuthority {
    pub fn new(
        secret: &[u8],
        config: AuthorityConfig,
        store: Arc<dyn PrincipalStore>,
        channel: Arc<dyn SideChannel>,
    ) -> Result<Self, AuthError> {
        if config.lifetime <= Duration::zero() {
            return Err(AuthError::Validation("credential lifetime must be positive".to_string()));
        }
        let hasher = PasswordHasher::new(config.hasher).map_err(|e| AuthError::internal(e.to_string()))?;
        Ok(Self {
            store,
            revocations: RevocationRegistry::new(channel),
            hasher,
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            lifetime: config.lifetime,
            read_policy: config.read_policy,
        })
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    pub fn revocations(&self) -> &RevocationRegistry {
        &self.revocations
    }

    pub fn store(&self) -> &Arc<dyn PrincipalStore> {
        &self.store
    }

    /// Create a principal and issue its first credential.
    pub async fn register(
        &self,
        ctx: &CallContext,
        email: &str,
        name: &str,
        password: &str,
    ) -> Result<(Principal, String), AuthError> {
        let email = normalize_email(email);
        if email.is_empty() || name.trim().is_empty() || password.is_empty() {
            return Err(AuthError::Validation("email, name and password are required".to_string()));
        }

        let existing = ctx
            .run("store.find_by_email", self.store.find_by_email(&email))
            .await
            .map_err(store_failure)?;
        if existing.is_some() {
            return Err(AuthError::Conflict);
        }

        let verifier = self.hasher.hash(password).await.map_err(|e| {
            tracing::error!("failed to derive password verifier: {e}");
            AuthError::internal("failed to hash password")
        })?;

        let new = NewPrincipal {
            email,
            name: name.trim().to_string(),
            verifier,
        };
        let principal = ctx
            .run("store.create", self.store.create(new))
            .await
            .map_err(store_failure)?;

        tracing::info!(principal_id = %principal.id, "principal registered");

        let credential = self.issue(&principal)?;
        Ok((principal, credential))
    }

    /// Check a password and issue a credential.
    ///
    /// Unknown email, missing verifier and wrong password all yield the same
    /// [`AuthError::InvalidCredentials`] after one password verification.
    pub async fn authenticate(
        &self,
        ctx: &CallContext,
        email: &str,
        password: &str,
    ) -> Result<(Principal, String), AuthError> {
        let email = normalize_email(email);
        let found = ctx
            .run(
                "store.find_by_email_with_verifier",
                self.store.find_by_email_with_verifier(&email),
            )
            .await
            .map_err(store_failure)?;

        let Some(found) = found else {
            self.hasher.verify_decoy(password).await;
            return Err(AuthError::InvalidCredentials);
        };

        let matches = self.hasher.verify(password, &found.verifier).await.map_err(|e| {
            tracing::error!(principal_id = %found.principal.id, "password verification failed: {e}");
            AuthError::internal("failed to verify password")
        })?;
        if !matches {
            return Err(AuthError::InvalidCredentials);
        }

        let mut principal = found.principal;
        if !principal.active {
            return Err(AuthError::Inactive);
        }

        let now = Utc::now();
        match ctx
            .run("store.update_last_login", self.store.update_last_login(principal.id, now))
            .await
        {
            Ok(()) => principal.last_login_at = Some(now),
            Err(CallError::Cancelled) => return Err(AuthError::Cancelled),
            Err(e) => {
                tracing::warn!(principal_id = %principal.id, "failed to update last login: {e}");
            }
        }

        let credential = self.issue(&principal)?;
        Ok((principal, credential))
    }

    pub fn issue(&self, principal: &Principal) -> Result<String, AuthError> {
        self.issue_at(principal, Utc::now())
    }

    /// Sign a credential for `principal` issued at `now`.
    pub fn issue_at(&self, principal: &Principal, now: DateTime<Utc>) -> Result<String, AuthError> {
        let expires_at = now
            .checked_add_signed(self.lifetime)
            .ok_or_else(|| AuthError::internal("credential expiry is out of range"))?;
        let claims = CredentialClaims::for_principal(principal, now, expires_at);
        encode(&Header::new(ALGORITHM), &claims, &self.encoding)
            .map_err(|e| AuthError::internal(format!("failed to sign credential: {e}")))
    }

    pub async fn validate(&self, ctx: &CallContext, carrier: &str) -> Result<Principal, AuthError> {
        self.validate_at(ctx, carrier, Utc::now()).await
    }

    pub async fn validate_at(
        &self,
        ctx: &CallContext,
        carrier: &str,
        now: DateTime<Utc>,
    ) -> Result<Principal, AuthError> {
        let principal_id = self.verify_carrier(carrier, now)?;

        let single = self.revocations.contains_single(ctx, carrier).await;
        if self.revocation_hit(single, principal_id, "credential")? {
            return Err(AuthError::Revoked);
        }

        let all = self.revocations.contains_all(ctx, principal_id).await;
        if self.revocation_hit(all, principal_id, "principal")? {
            return Err(AuthError::Revoked);
        }

        let principal = match ctx
            .run("store.find_by_id", self.store.find_by_id(principal_id))
            .await
        {
            Ok(Some(principal)) => principal,
            Ok(None) => return Err(AuthError::NotFound),
            Err(CallError::Cancelled) => return Err(AuthError::Cancelled),
            Err(e) => {
                tracing::error!(%principal_id, "principal lookup failed during validation: {e}");
                return Err(AuthError::NotFound);
            }
        };

        if !principal.active {
            return Err(AuthError::Inactive);
        }
        Ok(principal)
    }

    /// Revoke a single credential until its own expiry.
    ///
    /// Unparsable credentials and credentials without `exp` succeed silently.
    pub async fn logout(&self, ctx: &CallContext, carrier: &str) -> Result<(), AuthError> {
        self.logout_at(ctx, carrier, Utc::now()).await
    }

    pub async fn logout_at(&self, ctx: &CallContext, carrier: &str, now: DateTime<Utc>) -> Result<(), AuthError> {
        let mut validation = Validation::new(ALGORITHM);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let claims = match decode::<Map<String, Value>>(carrier, &self.decoding, &validation) {
            Ok(data) => data.claims,
            Err(e) => {
                tracing::debug!("logout with unparsable credential: {e}");
                return Ok(());
            }
        };
        let Some(expires_at) = claims
            .get("exp")
            .and_then(Value::as_i64)
            .and_then(|exp| DateTime::from_timestamp(exp, 0))
        else {
            return Ok(());
        };

        self.revocations
            .record_single_at(ctx, carrier, expires_at, now)
            .await
            .map_err(revocation_write_failure)
    }

    /// Revoke every outstanding credential of `principal_id` for one lifetime.
    pub async fn invalidate_all_for(&self, ctx: &CallContext, principal_id: PrincipalId) -> Result<(), AuthError> {
        let horizon = self
            .lifetime
            .to_std()
            .map_err(|e| AuthError::internal(format!("invalid revocation horizon: {e}")))?;
        self.revocations
            .record_all(ctx, principal_id, horizon)
            .await
            .map_err(revocation_write_failure)?;
        tracing::info!(%principal_id, "all credentials revoked");
        Ok(())
    }

    /// Replace the password after checking the current one, then revoke every
    /// outstanding credential of the principal.
    pub async fn change_password(
        &self,
        ctx: &CallContext,
        principal_id: PrincipalId,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        if new_password.is_empty() {
            return Err(AuthError::Validation("new password is required".to_string()));
        }

        let found = ctx
            .run(
                "store.find_by_id_with_verifier",
                self.store.find_by_id_with_verifier(principal_id),
            )
            .await
            .map_err(store_failure)?
            .ok_or(AuthError::InvalidCredentials)?;

        let matches = self
            .hasher
            .verify(current_password, &found.verifier)
            .await
            .map_err(|e| AuthError::internal(format!("failed to verify password: {e}")))?;
        if !matches {
            return Err(AuthError::InvalidCredentials);
        }

        let verifier = self
            .hasher
            .hash(new_password)
            .await
            .map_err(|e| AuthError::internal(format!("failed to hash password: {e}")))?;
        ctx.run(
            "store.update_password_verifier",
            self.store.update_password_verifier(principal_id, verifier),
        )
        .await
        .map_err(store_failure)?;

        self.invalidate_all_for(ctx, principal_id).await
    }

    /// Signature, algorithm and time checks. Returns the principal id claim.
    fn verify_carrier(&self, carrier: &str, now: DateTime<Utc>) -> Result<PrincipalId, AuthError> {
        let header = decode_header(carrier).map_err(|_| AuthError::invalid("malformed credential header"))?;
        if header.alg != ALGORITHM {
            return Err(AuthError::invalid("unexpected signing algorithm"));
        }

        let mut validation = Validation::new(ALGORITHM);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.required_spec_claims.clear();

        let claims = decode::<Map<String, Value>>(carrier, &self.decoding, &validation)
            .map_err(|e| AuthError::invalid(e.to_string()))?
            .claims;

        let iat = claims
            .get("iat")
            .and_then(Value::as_i64)
            .ok_or_else(|| AuthError::invalid("missing iat claim"))?;
        let exp = claims
            .get("exp")
            .and_then(Value::as_i64)
            .ok_or_else(|| AuthError::invalid("missing exp claim"))?;
        validate_claims(iat, exp, now).map_err(|e| match e {
            TokenValidationError::Expired => AuthError::Expired,
            other => AuthError::invalid(other.to_string()),
        })?;

        claims
            .get("user_id")
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse::<PrincipalId>().ok())
            .ok_or_else(|| AuthError::invalid("missing or malformed user_id claim"))
    }

    fn revocation_hit(
        &self,
        result: Result<bool, RevocationError>,
        principal_id: PrincipalId,
        scope: &'static str,
    ) -> Result<bool, AuthError> {
        match result {
            Ok(hit) => Ok(hit),
            Err(RevocationError::Cancelled) => Err(AuthError::Cancelled),
            Err(e) => {
                tracing::warn!(
                    %principal_id,
                    scope,
                    policy = ?self.read_policy,
                    "revocation lookup failed: {e}"
                );
                Ok(self.read_policy == RevocationReadPolicy::FailClosed)
            }
        }
    }
}

fn store_failure(err: CallError<StoreError>) -> AuthError {
    match err {
        CallError::Cancelled => AuthError::Cancelled,
        CallError::Failed(StoreError::Conflict) => AuthError::Conflict,
        CallError::Failed(StoreError::NotFound) => AuthError::NotFound,
        other => {
            tracing::error!("principal store failure: {other}");
            AuthError::internal(other.to_string())
        }
    }
}

fn revocation_write_failure(err: RevocationError) -> AuthError {
    match err {
        RevocationError::Cancelled => AuthError::Cancelled,
        other => {
            tracing::error!("failed to record revocation: {other}");
            AuthError::internal(other.to_string())
        }
    }
}
