//! In-memory collaborators.
//!
//! Intended for tests/dev. Both carry a failure switch so degraded paths can
//! be exercised without real infrastructure.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use algoshield_core::{PrincipalId, RoleId};

use crate::principal::normalize_email;
use crate::{
    NewPrincipal, PasswordVerifier, Principal, PrincipalStore, PrincipalWithVerifier, Role, SideChannel,
    SideChannelError, StoreError,
};

/// Role granted to every newly created principal when the catalogue has it.
pub const DEFAULT_ROLE: &str = "viewer";

/// Expiring key/value map. Expiry follows the tokio clock, so paused-time
/// tests can advance past a TTL.
#[derive(Debug, Default)]
pub struct InMemorySideChannel {
    entries: RwLock<HashMap<String, Instant>>,
    failing: AtomicBool,
}

impl InMemorySideChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail as if the store were unreachable.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Live keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = match self.entries.read() {
            Ok(entries) => entries
                .iter()
                .filter(|(_, expires)| **expires > now)
                .map(|(k, _)| k.clone())
                .collect(),
            Err(_) => Vec::new(),
        };
        keys.sort();
        keys
    }

    /// Remaining time-to-live of `key`, if live.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.entries.read().ok()?;
        entries
            .get(key)
            .filter(|expires| **expires > now)
            .map(|expires| *expires - now)
    }

    fn check(&self) -> Result<(), SideChannelError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SideChannelError::Unreachable("in-memory side-channel switched off".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl SideChannel for InMemorySideChannel {
    async fn set_with_ttl(&self, key: &str, _value: &str, ttl: Duration) -> Result<(), SideChannelError> {
        self.check()?;
        let mut entries = self
            .entries
            .write()
            .map_err(|_| SideChannelError::Command("lock poisoned".to_string()))?;
        let now = Instant::now();
        entries.retain(|_, expires| *expires > now);
        entries.insert(key.to_string(), now + ttl);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, SideChannelError> {
        self.check()?;
        let entries = self
            .entries
            .read()
            .map_err(|_| SideChannelError::Command("lock poisoned".to_string()))?;
        Ok(entries.get(key).is_some_and(|expires| *expires > Instant::now()))
    }

    async fn ping(&self) -> Result<(), SideChannelError> {
        self.check()
    }
}

#[derive(Debug, Clone)]
struct StoredPrincipal {
    principal: Principal,
    verifier: Option<PasswordVerifier>,
}

/// Principal store over a map, with a role catalogue.
#[derive(Debug)]
pub struct InMemoryPrincipalStore {
    principals: RwLock<HashMap<PrincipalId, StoredPrincipal>>,
    roles: RwLock<HashMap<String, Role>>,
    failing: AtomicBool,
}

impl Default for InMemoryPrincipalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPrincipalStore {
    /// Store whose catalogue already contains the default `viewer` role.
    pub fn new() -> Self {
        let store = Self::without_default_role();
        if let Ok(mut roles) = store.roles.write() {
            roles.insert(DEFAULT_ROLE.to_string(), Role::new(RoleId::new(), DEFAULT_ROLE));
        }
        store
    }

    pub fn without_default_role() -> Self {
        Self {
            principals: RwLock::new(HashMap::new()),
            roles: RwLock::new(HashMap::new()),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Assign the named role, adding it to the catalogue if unknown.
    pub fn grant_role(&self, id: PrincipalId, name: &str) -> Result<(), StoreError> {
        let role = {
            let mut roles = self.roles.write().map_err(poisoned)?;
            roles
                .entry(name.to_string())
                .or_insert_with(|| Role::new(RoleId::new(), name))
                .clone()
        };
        self.modify(id, |p| {
            p.principal.roles.insert(role);
        })
    }

    pub fn set_active(&self, id: PrincipalId, active: bool) -> Result<(), StoreError> {
        self.modify(id, |p| p.principal.active = active)
    }

    /// Insert a principal with no password verifier (e.g. an SSO account).
    pub fn insert_without_verifier(&self, email: &str, name: &str) -> Result<Principal, StoreError> {
        self.insert(email, name, None)
    }

    fn insert(&self, email: &str, name: &str, verifier: Option<PasswordVerifier>) -> Result<Principal, StoreError> {
        self.check()?;
        let email = normalize_email(email);
        let default_role = self.roles.read().map_err(poisoned)?.get(DEFAULT_ROLE).cloned();

        let mut principals = self.principals.write().map_err(poisoned)?;
        if principals.values().any(|p| p.principal.email == email) {
            return Err(StoreError::Conflict);
        }

        let now = Utc::now();
        let principal = Principal {
            id: PrincipalId::new(),
            email,
            name: name.to_string(),
            active: true,
            roles: default_role.into_iter().collect(),
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };
        principals.insert(
            principal.id,
            StoredPrincipal {
                principal: principal.clone(),
                verifier,
            },
        );
        Ok(principal)
    }

    fn modify(&self, id: PrincipalId, f: impl FnOnce(&mut StoredPrincipal)) -> Result<(), StoreError> {
        self.check()?;
        let mut principals = self.principals.write().map_err(poisoned)?;
        let stored = principals.get_mut(&id).ok_or(StoreError::NotFound)?;
        f(stored);
        stored.principal.updated_at = Utc::now();
        Ok(())
    }

    fn find(&self, pred: impl Fn(&StoredPrincipal) -> bool) -> Result<Option<StoredPrincipal>, StoreError> {
        self.check()?;
        let principals = self.principals.read().map_err(poisoned)?;
        Ok(principals.values().find(|p| pred(p)).cloned())
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("in-memory store switched off".to_string()));
        }
        Ok(())
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Backend("lock poisoned".to_string())
}

fn with_verifier(stored: StoredPrincipal) -> Option<PrincipalWithVerifier> {
    let verifier = stored.verifier?;
    Some(PrincipalWithVerifier {
        principal: stored.principal,
        verifier,
    })
}

#[async_trait::async_trait]
impl PrincipalStore for InMemoryPrincipalStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, StoreError> {
        let email = normalize_email(email);
        Ok(self.find(|p| p.principal.email == email)?.map(|p| p.principal))
    }

    async fn find_by_email_with_verifier(&self, email: &str) -> Result<Option<PrincipalWithVerifier>, StoreError> {
        let email = normalize_email(email);
        Ok(self.find(|p| p.principal.email == email)?.and_then(with_verifier))
    }

    async fn find_by_id(&self, id: PrincipalId) -> Result<Option<Principal>, StoreError> {
        Ok(self.find(|p| p.principal.id == id)?.map(|p| p.principal))
    }

    async fn find_by_id_with_verifier(&self, id: PrincipalId) -> Result<Option<PrincipalWithVerifier>, StoreError> {
        Ok(self.find(|p| p.principal.id == id)?.and_then(with_verifier))
    }

    async fn create(&self, new: NewPrincipal) -> Result<Principal, StoreError> {
        self.insert(&new.email, &new.name, Some(new.verifier))
    }

    async fn update_last_login(&self, id: PrincipalId, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.modify(id, |p| p.principal.last_login_at = Some(at))
    }

    async fn update_password_verifier(&self, id: PrincipalId, verifier: PasswordVerifier) -> Result<(), StoreError> {
        self.modify(id, |p| p.verifier = Some(verifier))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_principal(email: &str) -> NewPrincipal {
        NewPrincipal {
            email: email.to_string(),
            name: "Test".to_string(),
            verifier: PasswordVerifier::new("$argon2id$placeholder"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn side_channel_entries_expire() {
        let channel = InMemorySideChannel::new();
        channel
            .set_with_ttl("k", "1", Duration::from_secs(10))
            .await
            .unwrap();
        assert!(channel.exists("k").await.unwrap());

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(!channel.exists("k").await.unwrap());
        assert!(channel.keys().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rewrite_rearms_ttl() {
        let channel = InMemorySideChannel::new();
        channel.set_with_ttl("k", "1", Duration::from_secs(10)).await.unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;
        channel.set_with_ttl("k", "1", Duration::from_secs(10)).await.unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(channel.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn failing_side_channel_reports_unreachable() {
        let channel = InMemorySideChannel::new();
        channel.set_failing(true);
        assert!(matches!(channel.ping().await, Err(SideChannelError::Unreachable(_))));
    }

    #[tokio::test]
    async fn create_assigns_viewer_and_normalises_email() {
        let store = InMemoryPrincipalStore::new();
        let p = store.create(new_principal(" Bob@X.io ")).await.unwrap();
        assert_eq!(p.email, "bob@x.io");
        assert!(p.has_role(DEFAULT_ROLE));

        let found = store.find_by_email("BOB@x.io").await.unwrap().unwrap();
        assert_eq!(found.id, p.id);
    }

    #[tokio::test]
    async fn missing_default_role_is_not_an_error() {
        let store = InMemoryPrincipalStore::without_default_role();
        let p = store.create(new_principal("c@x.io")).await.unwrap();
        assert!(p.roles.is_empty());
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let store = InMemoryPrincipalStore::new();
        store.create(new_principal("d@x.io")).await.unwrap();
        let err = store.create(new_principal("D@x.io")).await.unwrap_err();
        assert_eq!(err, StoreError::Conflict);
    }

    #[tokio::test]
    async fn principal_without_verifier_is_hidden_from_verifying_lookup() {
        let store = InMemoryPrincipalStore::new();
        let p = store.insert_without_verifier("sso@x.io", "Sso").unwrap();
        assert!(store.find_by_email_with_verifier("sso@x.io").await.unwrap().is_none());
        assert!(store.find_by_id_with_verifier(p.id).await.unwrap().is_none());
        assert!(store.find_by_id(p.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn grant_role_is_idempotent() {
        let store = InMemoryPrincipalStore::new();
        let p = store.create(new_principal("e@x.io")).await.unwrap();
        store.grant_role(p.id, "admin").unwrap();
        store.grant_role(p.id, "admin").unwrap();
        let p = store.find_by_id(p.id).await.unwrap().unwrap();
        assert_eq!(p.roles.len(), 2);
        assert!(p.has_role("admin"));
    }
}
