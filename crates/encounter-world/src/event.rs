//! Notifications published to the rest of the backend.

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::ids::{EntityId, FactionId, PlayerId};

/// An encounter lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EncounterEvent {
    /// A behavior-driven entity lost its core unit or was abandoned.
    EntityDestroyed {
        entity_id: EntityId,
        faction_id: FactionId,
        region: DVec3,
    },
    /// Players arrived at a region and its on-enter script ran.
    RegionActivated {
        /// All resolved pilots, sorted.
        player_ids: Vec<PlayerId>,
        /// One pilot picked at random, if any resolved.
        representative_player: Option<PlayerId>,
        location: DVec3,
        /// One of the player entities found nearby, picked at random.
        nearby_entity: Option<EntityId>,
        player_count: usize,
    },
}

impl EncounterEvent {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            EncounterEvent::EntityDestroyed { .. } => "EntityDestroyed",
            EncounterEvent::RegionActivated { .. } => "RegionActivated",
        }
    }
}
