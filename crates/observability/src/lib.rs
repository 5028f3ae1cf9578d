//! Logging setup shared by the binaries.

/// Subscriber construction (filters, formatting).
pub mod logging;

pub use logging::{LogFormat, init, init_with};
