//! Side-channel adapters.
//!
//! The contract lives in `algoshield-auth`; an in-memory implementation for
//! tests/dev is `algoshield_auth::memory::InMemorySideChannel`.

#[cfg(feature = "redis")]
pub mod redis;

#[cfg(feature = "redis")]
pub use self::redis::RedisSideChannel;
