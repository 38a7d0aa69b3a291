//! Configuration: the toml process config and the per-account property
//! store.

mod store;
mod types;

pub use store::PropertyStore;
pub use types::{Config, ConfigError, ServerConfig, SystemConfig};
