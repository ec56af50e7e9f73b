//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Behavior loop timing.
    pub scheduler: SchedulerConfig,
    /// Behavior context cache.
    pub cache: CacheConfig,
    /// Region pools and their lifecycle timers.
    pub region: RegionConfig,
    /// Connection to the world service.
    pub network: NetworkConfig,
    /// Administrative HTTP surface.
    pub admin: AdminConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Behavior loop timing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Tick rate of the high priority (aliveness) loop.
    pub high_priority_fps: u32,
    /// Tick rate of the movement loop.
    pub movement_fps: u32,
    /// Roster refresh period in milliseconds.
    pub roster_refresh_ms: u64,
    /// Feature flag refresh period in milliseconds.
    pub feature_refresh_ms: u64,
    /// Feature flag that gates every behavior loop.
    pub feature_key: String,
}

/// Behavior context cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Idle time after which an entity's context is dropped.
    pub context_ttl_secs: u64,
    /// How often expired contexts are swept.
    pub sweep_interval_secs: u64,
}

/// Region lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegionConfig {
    /// Period of the generate/load/activate cycle.
    pub cycle_interval_secs: u64,
    /// Period of the expiration check.
    pub cleanup_interval_secs: u64,
    /// Pools maintained by the region manager.
    pub pools: Vec<RegionPoolConfig>,
}

/// One pool of encounter regions sharing a tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegionPoolConfig {
    pub tag: String,
    pub faction_id: i64,
    /// Number of regions to keep alive under this tag.
    pub quantity: usize,
    /// Minimum spacing between regions, as a multiple of the sector grid
    /// snap (1.0 keeps regions in distinct sectors).
    pub minimum_gap: f64,
    pub encounters: Vec<EncounterConfig>,
}

/// A placeable encounter: where it may spawn and which scripts drive it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EncounterConfig {
    pub name: String,
    /// Sampling center in world meters.
    pub center: [f64; 3],
    pub min_radius: f64,
    pub max_radius: f64,
    pub expiration_minutes: u64,
    pub on_load_script: String,
    pub on_enter_script: String,
}

/// World service connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// World service address.
    pub world_address: String,
    /// World service port.
    pub world_port: u16,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Reconnect backoff after the first failure, in milliseconds.
    pub initial_delay_ms: u64,
    /// Upper bound of the reconnect backoff, in milliseconds.
    pub max_delay_ms: u64,
}

/// Administrative HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AdminConfig {
    pub enabled: bool,
    pub port: u16,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Directory for JSON log files in debug builds.
    pub log_dir: Option<PathBuf>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            high_priority_fps: 10,
            movement_fps: 20,
            roster_refresh_ms: 2_000,
            feature_refresh_ms: 10_000,
            feature_key: "ConstructBehaviorLoop".to_string(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            context_ttl_secs: 60,
            sweep_interval_secs: 30,
        }
    }
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            cycle_interval_secs: 5,
            cleanup_interval_secs: 30,
            pools: vec![RegionPoolConfig::default()],
        }
    }
}

impl Default for RegionPoolConfig {
    fn default() -> Self {
        Self {
            tag: "pirate-ambush".to_string(),
            faction_id: 4,
            quantity: 3,
            minimum_gap: 1.0,
            encounters: vec![EncounterConfig::default()],
        }
    }
}

impl Default for EncounterConfig {
    fn default() -> Self {
        Self {
            name: "pirate-ambush".to_string(),
            center: [0.0, 0.0, 0.0],
            min_radius: 20_000_000.0,
            max_radius: 60_000_000.0,
            expiration_minutes: 180,
            on_load_script: "spawn-pirates".to_string(),
            on_enter_script: "pirate-intro".to_string(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            world_address: "127.0.0.1".to_string(),
            world_port: 7777,
            connect_timeout_secs: 5,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 9998,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

/// Platform config directory for the server, e.g. `~/.config/encounter`.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("encounter"))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// File name of the persisted configuration inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.ron";

fn read_config(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    ron::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

impl Config {
    /// Read `config.ron` from `config_dir`, writing the defaults there first
    /// if the file does not exist yet.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = config_dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Wrote default encounter config to {}", path.display());
            return Ok(config);
        }

        let config = read_config(&path)?;
        log::info!(
            "Loaded encounter config from {} ({} region pools)",
            path.display(),
            config.region.pools.len()
        );
        Ok(config)
    }

    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        let path = config_dir.join(CONFIG_FILE_NAME);
        let write_err = |source| ConfigError::Write {
            path: path.clone(),
            source,
        };
        std::fs::create_dir_all(config_dir).map_err(write_err)?;

        // Pools nest encounters two levels deep; keep those expanded.
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(5)
            .enumerate_arrays(false);
        let text = ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::Serialize)?;
        std::fs::write(&path, text).map_err(write_err)
    }

    /// Re-read the file. `None` means it still matches `self`.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let fresh = read_config(&config_dir.join(CONFIG_FILE_NAME))?;
        if fresh == *self {
            return Ok(None);
        }
        log::info!("Encounter config changed on disk");
        Ok(Some(fresh))
    }
}
