//! Entity handles: the scheduler-visible registration of a spawned entity.

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::ids::{EntityId, FactionId};

/// Flight characteristics of a spawned entity's prefab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDefinition {
    /// Rated acceleration in g.
    pub acceleration_g: f64,
    /// Hard speed cap in km/h.
    pub max_speed_kph: f64,
    /// Turn rate factor; multiplied by delta-time to get the slerp fraction per tick.
    pub rotation_speed: f64,
}

impl Default for EntityDefinition {
    fn default() -> Self {
        Self {
            acceleration_g: 15.0,
            max_speed_kph: 20_000.0,
            rotation_speed: 0.5,
        }
    }
}

/// Serialized per-handle settings. Stored as JSON next to the handle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandleProperties {
    /// Ordered behavior kind names to run for this entity.
    pub behaviors: Vec<String>,
    /// Entity to pursue, seeded into the behavior context when it is created.
    pub target: Option<EntityId>,
}

impl HandleProperties {
    /// Decode properties from their stored JSON form.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// A spawned, behavior-driven entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityHandle {
    /// Entity this handle drives.
    pub entity_id: EntityId,
    /// Owning faction.
    pub faction_id: FactionId,
    /// Snapped location of the region that spawned it.
    pub region: DVec3,
    /// Prefab definition. Handles without one are never ticked.
    pub definition: Option<EntityDefinition>,
    /// Behavior configuration.
    pub properties: HandleProperties,
}
