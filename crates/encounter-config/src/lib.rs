//! Configuration for the encounter backend.
//!
//! Settings persist to disk as `config.ron`. Every section defaults field by
//! field, so older files keep loading as new settings are added, and CLI
//! arguments override whatever was loaded.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    AdminConfig, CacheConfig, Config, DebugConfig, EncounterConfig, NetworkConfig, RegionConfig,
    RegionPoolConfig, SchedulerConfig, CONFIG_FILE_NAME, default_config_dir,
};
pub use error::ConfigError;
