//! Principal model: the identified subject behind every credential.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use algoshield_core::{PrincipalId, RoleId};

/// A named role assigned to a principal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
}

impl Role {
    pub fn new(id: RoleId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Role assignments with set semantics.
///
/// Membership is keyed by role identity (duplicates collapse, insertion order
/// is irrelevant); lookups are by exact, case-sensitive name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Role>", into = "Vec<Role>")]
pub struct RoleSet(BTreeMap<RoleId, Role>);

impl RoleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a role. Returns `false` if a role with the same id was already present.
    pub fn insert(&mut self, role: Role) -> bool {
        self.0.insert(role.id, role).is_none()
    }

    pub fn remove(&mut self, id: &RoleId) -> Option<Role> {
        self.0.remove(id)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.0.values().any(|r| r.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.values().map(|r| r.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Role> {
        self.0.values()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        Self(iter.into_iter().map(|r| (r.id, r)).collect())
    }
}

impl From<Vec<Role>> for RoleSet {
    fn from(value: Vec<Role>) -> Self {
        value.into_iter().collect()
    }
}

impl From<RoleSet> for Vec<Role> {
    fn from(value: RoleSet) -> Self {
        value.0.into_values().collect()
    }
}

/// A principal record as seen by everything except password verification.
///
/// # Invariants
/// - `id` never changes after creation.
/// - `email` is stored normalised (trimmed, lowercase) and is unique.
/// - An inactive principal is rejected at credential-validation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub email: String,
    pub name: String,
    pub active: bool,
    pub roles: RoleSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Principal {
    pub fn has_role(&self, name: &str) -> bool {
        self.roles.contains_name(name)
    }
}

/// Stored password verifier (PHC string). Never rendered by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordVerifier(String);

impl PasswordVerifier {
    pub fn new(phc: impl Into<String>) -> Self {
        Self(phc.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Debug for PasswordVerifier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("PasswordVerifier(<redacted>)")
    }
}

/// A principal fetched through the password-verifying capability.
///
/// Only principals that actually carry a verifier can be represented, so a
/// comparison against a missing verifier is unrepresentable.
#[derive(Debug, Clone)]
pub struct PrincipalWithVerifier {
    pub principal: Principal,
    pub verifier: PasswordVerifier,
}

/// Input for creating a principal in the store.
#[derive(Debug, Clone)]
pub struct NewPrincipal {
    pub email: String,
    pub name: String,
    pub verifier: PasswordVerifier,
}

/// Canonical form used for email storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
