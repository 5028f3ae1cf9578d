use algoshield_auth::{Principal, PrincipalId, RoleSet};

/// Principal context for a request (validated principal + its id).
///
/// Inserted by the authentication middleware; present on every protected route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal_id: PrincipalId,
    principal: Principal,
}

impl PrincipalContext {
    pub fn new(principal: Principal) -> Self {
        Self {
            principal_id: principal.id,
            principal,
        }
    }

    pub fn principal_id(&self) -> PrincipalId {
        self.principal_id
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn roles(&self) -> &RoleSet {
        &self.principal.roles
    }
}

/// The raw bearer credential of the current request (needed by logout).
#[derive(Clone)]
pub struct BearerCredential(String);

impl BearerCredential {
    pub fn new(carrier: impl Into<String>) -> Self {
        Self(carrier.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Debug for BearerCredential {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("BearerCredential(<redacted>)")
    }
}
