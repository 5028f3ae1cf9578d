//! Role preconditions for already-authenticated principals.
//!
//! - No IO
//! - No panics
//! - Exact, case-sensitive name comparison

use std::collections::BTreeSet;

use thiserror::Error;

use crate::Principal;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GuardError {
    #[error("no authenticated principal in request context")]
    Unauthenticated,

    #[error("insufficient permissions: requires one of {0:?}")]
    InsufficientPermissions(Vec<String>),
}

/// Require that the principal holds a role named `name`.
pub fn require_role(principal: Option<&Principal>, name: &str) -> Result<(), GuardError> {
    require_any_role(principal, [name])
}

/// Require that the principal holds at least one of `names`.
///
/// Duplicate names collapse into a set before the check. An empty `names`
/// can never be satisfied.
pub fn require_any_role<'a, I>(principal: Option<&Principal>, names: I) -> Result<(), GuardError>
where
    I: IntoIterator<Item = &'a str>,
{
    let principal = principal.ok_or(GuardError::Unauthenticated)?;
    let wanted: BTreeSet<&str> = names.into_iter().collect();

    if principal.roles.names().any(|held| wanted.contains(held)) {
        Ok(())
    } else {
        Err(GuardError::InsufficientPermissions(
            wanted.into_iter().map(str::to_string).collect(),
        ))
    }
}
