//! Shared types and configuration for the worldvault engine.

pub mod config;
pub mod types;

pub use config::{ConfigError, VaultConfig};
pub use types::{MANIFEST_SUFFIX, UnitName};

pub fn crate_info() -> &'static str {
    concat!("worldvault-common v", env!("CARGO_PKG_VERSION"))
}
