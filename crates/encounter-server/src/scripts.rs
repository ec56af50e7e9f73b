//! Built-in encounter scripts.
//!
//! `spawn-pirates` places a pirate wing in the world when a region loads.
//! `pirate-intro` hands the wing to the behavior loops once players arrive,
//! each pirate pursuing one of the player entities found nearby.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use encounter_math::{GridCell, grid_cell};
use encounter_world::memory::{MemoryHandleStore, MemoryWorld, WorldEntity};
use encounter_world::{
    EntityDefinition, EntityHandle, EntityId, HandleProperties, SECTOR_GRID_SNAP, ScriptContext,
    ScriptError, ScriptRegistry, SpatialQuery,
};
use glam::DVec3;

pub const SPAWN_PIRATES: &str = "spawn-pirates";
pub const PIRATE_INTRO: &str = "pirate-intro";

const WING_SIZE: u64 = 3;
const WING_SPACING_M: f64 = 2_000.0;
const FIRST_PIRATE_ID: u64 = 1_000_000;

pub struct EncounterScripts {
    world: Arc<MemoryWorld>,
    handles: Arc<MemoryHandleStore>,
    next_id: AtomicU64,
    wings: Mutex<HashMap<GridCell, Vec<EntityId>>>,
}

impl EncounterScripts {
    pub fn new(world: Arc<MemoryWorld>, handles: Arc<MemoryHandleStore>) -> Arc<Self> {
        Arc::new(Self {
            world,
            handles,
            next_id: AtomicU64::new(FIRST_PIRATE_ID),
            wings: Mutex::new(HashMap::new()),
        })
    }

    pub fn register(self: &Arc<Self>, registry: &mut ScriptRegistry) {
        let scripts = Arc::clone(self);
        registry.register(SPAWN_PIRATES, move |ctx| {
            let scripts = Arc::clone(&scripts);
            Box::pin(async move { scripts.spawn_pirates(ctx).await })
        });

        let scripts = Arc::clone(self);
        registry.register(PIRATE_INTRO, move |ctx| {
            let scripts = Arc::clone(&scripts);
            Box::pin(async move { scripts.pirate_intro(ctx).await })
        });
    }

    async fn spawn_pirates(&self, ctx: ScriptContext) -> Result<(), ScriptError> {
        let wing: Vec<EntityId> = (0..WING_SIZE)
            .map(|_| EntityId(self.next_id.fetch_add(1, Ordering::Relaxed)))
            .collect();

        for (i, &id) in wing.iter().enumerate() {
            let position = ctx.location + DVec3::X * WING_SPACING_M * i as f64;
            self.world.insert(WorldEntity::npc(id, position)).await;
        }
        tracing::info!(location = ?ctx.location, pirates = wing.len(), "pirate wing spawned");

        self.wings
            .lock()
            .map_err(|_| failed(SPAWN_PIRATES, "wing registry poisoned"))?
            .insert(grid_cell(ctx.location, SECTOR_GRID_SNAP), wing);
        Ok(())
    }

    async fn pirate_intro(&self, ctx: ScriptContext) -> Result<(), ScriptError> {
        let cell = grid_cell(ctx.location, SECTOR_GRID_SNAP);
        let wing = self
            .wings
            .lock()
            .map_err(|_| failed(PIRATE_INTRO, "wing registry poisoned"))?
            .get(&cell)
            .cloned()
            .ok_or_else(|| failed(PIRATE_INTRO, "no pirate wing in this region"))?;

        let players = self
            .world
            .find_player_entities_near(ctx.location)
            .await
            .map_err(|e| failed(PIRATE_INTRO, &e.to_string()))?;

        for (i, &pirate) in wing.iter().enumerate() {
            let target = (!players.is_empty()).then(|| players[i % players.len()]);
            self.handles
                .insert(EntityHandle {
                    entity_id: pirate,
                    faction_id: ctx.faction_id,
                    region: ctx.location,
                    definition: Some(EntityDefinition::default()),
                    properties: HandleProperties {
                        behaviors: vec!["alive-check".into(), "follow-target".into()],
                        target,
                    },
                })
                .await;
        }
        tracing::info!(
            location = ?ctx.location,
            pirates = wing.len(),
            players = ctx.player_ids.len(),
            "pirates engaging"
        );
        Ok(())
    }
}

fn failed(script: &str, reason: &str) -> ScriptError {
    ScriptError::Failed {
        script: script.to_string(),
        reason: reason.to_string(),
    }
}
