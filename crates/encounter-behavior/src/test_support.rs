use std::sync::Arc;

use encounter_world::memory::{
    MemoryEventBus, MemoryFeatureFlags, MemoryHandleStore, MemoryWorld,
};
use encounter_world::{EntityDefinition, EntityHandle, EntityId, FactionId, HandleProperties};
use glam::DVec3;

use crate::behavior::BehaviorServices;

pub(crate) struct Fixture {
    pub world: Arc<MemoryWorld>,
    pub handles: Arc<MemoryHandleStore>,
    pub events: Arc<MemoryEventBus>,
    pub flags: Arc<MemoryFeatureFlags>,
    pub services: BehaviorServices,
}

impl Fixture {
    pub fn new() -> Self {
        let world = Arc::new(MemoryWorld::new());
        let handles = Arc::new(MemoryHandleStore::new());
        let events = Arc::new(MemoryEventBus::new());
        let flags = Arc::new(MemoryFeatureFlags::new());
        let services = BehaviorServices {
            entities: world.clone(),
            elements: world.clone(),
            world: world.clone(),
            handles: handles.clone(),
            events: events.clone(),
            flags: flags.clone(),
        };
        Self {
            world,
            handles,
            events,
            flags,
            services,
        }
    }
}

pub(crate) fn handle(id: u64, behaviors: &[&str]) -> EntityHandle {
    EntityHandle {
        entity_id: EntityId(id),
        faction_id: FactionId(1),
        region: DVec3::ZERO,
        definition: Some(EntityDefinition::default()),
        properties: HandleProperties {
            behaviors: behaviors.iter().map(|b| b.to_string()).collect(),
            target: None,
        },
    }
}
