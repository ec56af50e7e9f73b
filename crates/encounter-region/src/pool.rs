//! Pool definitions, built from configuration.

use std::time::Duration;

use encounter_config::{EncounterConfig, RegionPoolConfig};
use encounter_world::{FactionId, SECTOR_GRID_SNAP};
use glam::DVec3;

/// Where an encounter may be placed and which scripts drive it.
#[derive(Debug, Clone, PartialEq)]
pub struct EncounterDefinition {
    pub name: String,
    pub center: DVec3,
    pub min_radius: f64,
    pub max_radius: f64,
    /// Base lifetime of a region running this encounter.
    pub expiration: Duration,
    pub on_load_script: String,
    pub on_enter_script: String,
}

impl From<&EncounterConfig> for EncounterDefinition {
    fn from(config: &EncounterConfig) -> Self {
        let (min_radius, max_radius) = if config.min_radius <= config.max_radius {
            (config.min_radius, config.max_radius)
        } else {
            (config.max_radius, config.min_radius)
        };
        Self {
            name: config.name.clone(),
            center: DVec3::from_array(config.center),
            min_radius,
            max_radius,
            expiration: Duration::from_secs(config.expiration_minutes * 60),
            on_load_script: config.on_load_script.clone(),
            on_enter_script: config.on_enter_script.clone(),
        }
    }
}

/// A tagged set of regions kept at a target quantity.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionPool {
    pub tag: String,
    pub faction_id: FactionId,
    pub quantity: usize,
    /// Two regions may not share a grid cell of this size, in meters.
    /// Configured as a multiple of [`SECTOR_GRID_SNAP`].
    pub minimum_gap: f64,
    pub encounters: Vec<EncounterDefinition>,
}

impl From<&RegionPoolConfig> for RegionPool {
    fn from(config: &RegionPoolConfig) -> Self {
        Self {
            tag: config.tag.clone(),
            faction_id: FactionId(config.faction_id),
            quantity: config.quantity,
            minimum_gap: SECTOR_GRID_SNAP * config.minimum_gap,
            encounters: config.encounters.iter().map(EncounterDefinition::from).collect(),
        }
    }
}
