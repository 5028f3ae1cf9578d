//! Principal store adapters.
//!
//! The contract lives in `algoshield-auth`; an in-memory implementation for
//! tests/dev is `algoshield_auth::memory::InMemoryPrincipalStore`.

pub mod postgres;

pub use postgres::PostgresPrincipalStore;
