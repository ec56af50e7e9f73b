//! World-state snapshots and transform updates.

use std::time::{SystemTime, UNIX_EPOCH};

use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};

use crate::ids::{EntityId, PlayerId};

/// Live state of an entity as reported by the world service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityInfo {
    pub entity_id: EntityId,
    pub position: DVec3,
    pub rotation: DQuat,
    /// Current pilot, if a player is seated.
    pub pilot_id: Option<PlayerId>,
    /// The entity has been abandoned by its owner.
    pub abandoned: bool,
}

/// State of an entity's core unit element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CoreUnitStatus {
    pub destroyed: bool,
}

/// A transform push to the world service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformUpdate {
    pub entity_id: EntityId,
    pub position: DVec3,
    pub rotation: DQuat,
    /// World-absolute velocity in m/s.
    pub velocity: DVec3,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
