//! `algoshield-auth`: credential issuance, validation and revocation.
//!
//! This crate is intentionally decoupled from HTTP and storage: the principal
//! repository and the expiring key/value side-channel are consumed through
//! the [`PrincipalStore`] and [`SideChannel`] traits.

pub mod authority;
pub mod claims;
pub mod context;
pub mod error;
pub mod guard;
pub mod memory;
pub mod password;
pub mod principal;
pub mod revocation;
pub mod side_channel;
pub mod store;

pub use authority::{AuthorityConfig, CredentialAuthority, RevocationReadPolicy};
pub use claims::{CredentialClaims, TokenValidationError, validate_claims};
pub use context::{CallContext, CallError};
pub use error::AuthError;
pub use guard::{GuardError, require_any_role, require_role};
pub use password::{PasswordError, PasswordHasher, PasswordHasherConfig};
pub use principal::{NewPrincipal, PasswordVerifier, Principal, PrincipalWithVerifier, Role, RoleSet};
pub use revocation::{RevocationError, RevocationRegistry};
pub use side_channel::{SideChannel, SideChannelError};
pub use store::{PrincipalStore, StoreError};

pub use algoshield_core::{PrincipalId, RoleId};
