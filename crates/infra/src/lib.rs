//! Infrastructure layer: principal storage, side-channel adapters, config.

pub mod config;
pub mod principal_store;
pub mod side_channel;

pub use config::{AppConfig, ConfigError, Environment, StoreBackend, TlsConfig};
pub use principal_store::PostgresPrincipalStore;
#[cfg(feature = "redis")]
pub use side_channel::RedisSideChannel;
