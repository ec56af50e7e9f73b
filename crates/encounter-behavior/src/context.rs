//! Mutable per-entity state shared by the behaviors of one entity.

use std::collections::{HashMap, HashSet};

use encounter_world::{EntityHandle, EntityId, FactionId, TerritoryId};
use glam::{DQuat, DVec3};

use crate::behavior::BehaviorKind;

/// A value in the context property bag.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Vec3(DVec3),
    Number(f64),
    Flag(bool),
    Text(String),
}

/// State carried between ticks for one entity.
///
/// Behaviors receive it by `&mut` for the duration of one tick.
#[derive(Debug, Clone)]
pub struct BehaviorContext {
    pub faction_id: FactionId,
    pub territory_id: Option<TerritoryId>,
    /// Location of the region that spawned the entity.
    pub region: DVec3,
    /// Seconds since this category's previous cycle.
    pub delta_time: f64,
    /// Cleared once by the aliveness check; never set back.
    pub alive: bool,
    /// `None` until a motion behavior first observes the entity.
    pub position: Option<DVec3>,
    pub velocity: DVec3,
    pub rotation: DQuat,
    pub target_entity: Option<EntityId>,
    /// Point to move toward. Falls back to the target entity's position.
    pub target_move_position: Option<DVec3>,
    properties: HashMap<String, PropertyValue>,
    deactivated: HashSet<BehaviorKind>,
}

impl BehaviorContext {
    pub fn new(faction_id: FactionId, territory_id: Option<TerritoryId>, region: DVec3) -> Self {
        Self {
            faction_id,
            territory_id,
            region,
            delta_time: 0.0,
            alive: true,
            position: None,
            velocity: DVec3::ZERO,
            rotation: DQuat::IDENTITY,
            target_entity: None,
            target_move_position: None,
            properties: HashMap::new(),
            deactivated: HashSet::new(),
        }
    }

    /// Fresh context for a handle's first tick.
    pub fn for_handle(handle: &EntityHandle) -> Self {
        let mut context = Self::new(handle.faction_id, None, handle.region);
        context.target_entity = handle.properties.target;
        context
    }

    pub fn is_active(&self, kind: BehaviorKind) -> bool {
        !self.deactivated.contains(&kind)
    }

    pub fn deactivate(&mut self, kind: BehaviorKind) {
        self.deactivated.insert(kind);
    }

    pub fn activate(&mut self, kind: BehaviorKind) {
        self.deactivated.remove(&kind);
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: PropertyValue) {
        self.properties.insert(name.into(), value);
    }

    /// Vector property, or `None` if missing or of another type.
    pub fn vec3_property(&self, name: &str) -> Option<DVec3> {
        match self.properties.get(name) {
            Some(PropertyValue::Vec3(v)) => Some(*v),
            _ => None,
        }
    }
}
