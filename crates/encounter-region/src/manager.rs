//! Region placement and lifecycle.
//!
//! A region moves through four phases, each run by one method here:
//!
//! 1. [`generate`](RegionPoolManager::generate) places new regions until the
//!    pool reaches its target quantity.
//! 2. [`load_unloaded`](RegionPoolManager::load_unloaded) runs each new
//!    region's on-load script once.
//! 3. [`activate_entered`](RegionPoolManager::activate_entered) runs the
//!    on-enter script once players show up.
//! 4. [`execute_cleanup`](RegionPoolManager::execute_cleanup) extends occupied
//!    regions past their expiry and removes the rest.
//!
//! Script failures in phases 2 and 3 are returned to the caller after the
//! region has been left in a state that retries on the next cycle.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use encounter_math::{GridCell, grid_cell, grid_snap, lerp, random_direction};
use encounter_world::{
    EncounterEvent, EntityId, EntityInfoService, EventPublisher, HandleStore, PlayerId,
    RegionInstance, RegionStore, SECTOR_GRID_SNAP, ScriptContext, ScriptRunner, SpatialQuery,
};
use glam::DVec3;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

use crate::error::RegionError;
use crate::pool::RegionPool;

/// Samples tried per region before accepting an occupied cell.
pub const MAX_PLACEMENT_ATTEMPTS: u32 = 100;

/// How far an occupied region's expiry is pushed on each cleanup pass.
pub const EXPIRATION_EXTENSION: Duration = Duration::from_secs(60 * 60);

/// Collaborators the region manager talks to.
#[derive(Clone)]
pub struct RegionServices {
    pub regions: Arc<dyn RegionStore>,
    pub scripts: Arc<dyn ScriptRunner>,
    pub spatial: Arc<dyn SpatialQuery>,
    pub entities: Arc<dyn EntityInfoService>,
    pub handles: Arc<dyn HandleStore>,
    pub events: Arc<dyn EventPublisher>,
}

/// Outcome of one expiration pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Expired regions kept alive because players were present.
    pub extended: usize,
    /// Entity handles released from removed regions.
    pub released_handles: usize,
    /// Region records deleted from the store.
    pub deleted: usize,
}

pub struct RegionPoolManager {
    services: RegionServices,
    rng: Mutex<StdRng>,
}

impl RegionPoolManager {
    pub fn new(services: RegionServices) -> Self {
        Self::with_rng(services, StdRng::from_os_rng())
    }

    /// Use a caller-provided generator, e.g. a seeded one in tests.
    pub fn with_rng(services: RegionServices, rng: StdRng) -> Self {
        Self {
            services,
            rng: Mutex::new(rng),
        }
    }

    fn rng(&self) -> MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add regions until `pool` holds its target quantity. Returns how many
    /// were added.
    pub async fn generate(&self, pool: &RegionPool) -> Result<usize, RegionError> {
        let existing = self.services.regions.count_by_tag(&pool.tag).await?;
        let missing = pool.quantity.saturating_sub(existing);
        if missing == 0 {
            return Ok(0);
        }
        if pool.encounters.is_empty() {
            tracing::warn!(tag = %pool.tag, missing, "region pool has no encounters to place");
            return Ok(0);
        }

        let mut occupied: HashSet<GridCell> = self
            .services
            .regions
            .get_all()
            .await?
            .iter()
            .map(|r| grid_cell(r.location, pool.minimum_gap))
            .collect();

        let placed = self.place(pool, missing, &mut occupied, SystemTime::now());
        let count = placed.len();
        for region in placed {
            tracing::info!(
                tag = %region.tag,
                region = %region.id,
                location = ?region.location,
                "generated region"
            );
            self.services.regions.add(region).await?;
        }
        Ok(count)
    }

    fn place(
        &self,
        pool: &RegionPool,
        missing: usize,
        occupied: &mut HashSet<GridCell>,
        now: SystemTime,
    ) -> Vec<RegionInstance> {
        let mut rng = self.rng();
        let stagger_minutes: u64 = rng.random_range(0..60);

        let mut placed = Vec::with_capacity(missing);
        for i in 0..missing {
            let encounter = &pool.encounters[rng.random_range(0..pool.encounters.len())];
            let radius = lerp(encounter.min_radius, encounter.max_radius, rng.random());

            let mut attempts = 0;
            let (location, cell) = loop {
                attempts += 1;
                let sample = encounter.center + random_direction(&mut *rng) * radius;
                let location = grid_snap(sample, SECTOR_GRID_SNAP);
                let cell = grid_cell(location, pool.minimum_gap);
                if !occupied.contains(&cell) || attempts >= MAX_PLACEMENT_ATTEMPTS {
                    break (location, cell);
                }
            };
            if !occupied.insert(cell) {
                tracing::warn!(
                    tag = %pool.tag,
                    encounter = %encounter.name,
                    attempts,
                    "no free cell found, region overlaps an existing one"
                );
            }

            let stagger = Duration::from_secs(stagger_minutes * i as u64 * 60);
            placed.push(RegionInstance {
                id: Uuid::new_v4(),
                location,
                faction_id: pool.faction_id,
                tag: pool.tag.clone(),
                created_at: now,
                expires_at: now + encounter.expiration + stagger,
                force_expires_at: None,
                on_load_script: encounter.on_load_script.clone(),
                on_enter_script: encounter.on_enter_script.clone(),
                loaded: false,
                started: false,
            });
        }
        placed
    }

    /// Run the on-load script of every unloaded region. Stops at the first
    /// script failure, leaving that region unloaded.
    pub async fn load_unloaded(&self) -> Result<usize, RegionError> {
        let unloaded = self.services.regions.find_unloaded().await?;
        if unloaded.is_empty() {
            tracing::debug!("no regions need loading");
            return Ok(0);
        }

        let mut loaded = 0;
        for region in unloaded {
            let context = ScriptContext::new(region.faction_id, region.location);
            let result = self
                .services
                .scripts
                .execute(&region.on_load_script, context)
                .await;

            if let Err(source) = result {
                tracing::error!(
                    region = %region.id,
                    location = ?region.location,
                    script = %region.on_load_script,
                    error = %source,
                    "failed to load region"
                );
                if let Err(e) = self.services.regions.set_loaded(region.id, false).await {
                    tracing::warn!(region = %region.id, error = %e, "could not reset loaded flag");
                }
                return Err(RegionError::Script {
                    region: region.id,
                    script: region.on_load_script,
                    source,
                });
            }

            self.services.regions.set_loaded(region.id, true).await?;
            tracing::info!(region = %region.id, location = ?region.location, "loaded region");
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Start every loaded region that has players nearby. Returns how many
    /// regions were started.
    pub async fn activate_entered(&self) -> Result<usize, RegionError> {
        let pending = self.services.regions.find_pending_startup().await?;
        if pending.is_empty() {
            tracing::debug!("no regions need startup");
            return Ok(0);
        }

        let mut started = 0;
        for region in pending {
            let nearby = self
                .services
                .spatial
                .find_player_entities_near(region.location)
                .await?;
            if nearby.is_empty() {
                continue;
            }

            let player_ids = self.resolve_pilots(&nearby).await;
            tracing::info!(
                region = %region.id,
                location = ?region.location,
                script = %region.on_enter_script,
                players = player_ids.len(),
                "starting region encounter"
            );

            let context = ScriptContext::new(region.faction_id, region.location)
                .with_players(player_ids.clone());
            let result = self
                .services
                .scripts
                .execute(&region.on_enter_script, context)
                .await;
            if let Err(source) = result {
                tracing::error!(
                    region = %region.id,
                    script = %region.on_enter_script,
                    error = %source,
                    "failed to start region encounter"
                );
                return Err(RegionError::Script {
                    region: region.id,
                    script: region.on_enter_script,
                    source,
                });
            }
            self.services.regions.tag_as_started(region.id).await?;
            started += 1;

            self.publish_activation(region.location, player_ids, &nearby)
                .await;
        }
        Ok(started)
    }

    /// Pilots of `nearby`. Any lookup failure yields an empty set.
    async fn resolve_pilots(&self, nearby: &[EntityId]) -> BTreeSet<PlayerId> {
        let mut pilots = BTreeSet::new();
        for &entity_id in nearby {
            match self.services.entities.get(entity_id).await {
                Ok(info) => pilots.extend(info.and_then(|i| i.pilot_id)),
                Err(e) => {
                    tracing::error!(
                        entity = %entity_id,
                        error = %e,
                        "pilot lookup failed, region starts without pilot information"
                    );
                    return BTreeSet::new();
                }
            }
        }
        pilots
    }

    async fn publish_activation(
        &self,
        location: DVec3,
        player_ids: BTreeSet<PlayerId>,
        nearby: &[EntityId],
    ) {
        let player_ids: Vec<PlayerId> = player_ids.into_iter().collect();
        let (representative_player, nearby_entity) = {
            let mut rng = self.rng();
            (
                player_ids.choose(&mut *rng).copied(),
                nearby.choose(&mut *rng).copied(),
            )
        };

        let event = EncounterEvent::RegionActivated {
            player_count: player_ids.len(),
            player_ids,
            representative_player,
            location,
            nearby_entity,
        };
        if let Err(e) = self.services.events.publish(event).await {
            tracing::error!(location = ?location, error = %e, "failed to publish region activation");
        }
    }

    pub async fn execute_cleanup(&self) -> Result<CleanupReport, RegionError> {
        self.execute_cleanup_at(SystemTime::now()).await
    }

    /// Expiration pass as of `now`: occupied regions get
    /// [`EXPIRATION_EXTENSION`] more time unless force-expired; the rest have
    /// their handles released and are deleted.
    pub async fn execute_cleanup_at(&self, now: SystemTime) -> Result<CleanupReport, RegionError> {
        let expired = self.services.regions.find_expired(now).await?;
        let mut report = CleanupReport::default();

        for region in expired {
            if !region.is_force_expired(now) {
                let players = self
                    .services
                    .spatial
                    .find_player_entities_near(region.location)
                    .await?;
                if !players.is_empty() {
                    self.services
                        .regions
                        .set_expiration(region.id, now + EXPIRATION_EXTENSION)
                        .await?;
                    tracing::info!(
                        region = %region.id,
                        location = ?region.location,
                        players = players.len(),
                        "players nearby, extended region expiration"
                    );
                    report.extended += 1;
                    continue;
                }
            }

            let released = self
                .services
                .handles
                .remove_in_region(region.location)
                .await?;
            tracing::info!(region = %region.id, released, "released region handles");
            report.released_handles += released;
        }

        report.deleted = self.services.regions.delete_expired(now).await?;
        tracing::debug!(?report, "region cleanup done");
        Ok(report)
    }

    /// Set the expiry of the region at `location` to now + `span`. Returns
    /// `false` when no region is there.
    pub async fn set_expiration_from_now(
        &self,
        location: DVec3,
        span: Duration,
    ) -> Result<bool, RegionError> {
        let Some(region) = self.services.regions.find_by_location(location).await? else {
            return Ok(false);
        };
        self.services
            .regions
            .set_expiration(region.id, SystemTime::now() + span)
            .await?;
        tracing::info!(
            region = %region.id,
            location = ?region.location,
            minutes = span.as_secs() / 60,
            "set region expiration"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::EncounterDefinition;
    use encounter_world::memory::{
        MemoryEventBus, MemoryHandleStore, MemoryRegionStore, MemoryWorld, WorldEntity,
    };
    use encounter_world::{
        BoxFuture, EntityDefinition, EntityHandle, EntityInfo, FactionId, HandleProperties,
        ScriptError, ScriptRegistry, ServiceError,
    };

    type ScriptLog = Arc<Mutex<Vec<(String, ScriptContext)>>>;

    struct Fixture {
        regions: Arc<MemoryRegionStore>,
        world: Arc<MemoryWorld>,
        handles: Arc<MemoryHandleStore>,
        events: Arc<MemoryEventBus>,
        scripts: ScriptLog,
        manager: RegionPoolManager,
    }

    fn recording(log: &ScriptLog, registry: &mut ScriptRegistry, name: &'static str) {
        let log = Arc::clone(log);
        registry.register(name, move |ctx: ScriptContext| {
            let log = Arc::clone(&log);
            Box::pin(async move {
                log.lock().unwrap().push((name.to_string(), ctx));
                Ok(())
            })
        });
    }

    fn registry(log: &ScriptLog) -> ScriptRegistry {
        let mut registry = ScriptRegistry::new();
        recording(log, &mut registry, "load");
        recording(log, &mut registry, "enter");
        registry.register("broken", |_ctx| {
            Box::pin(async {
                Err(ScriptError::Failed {
                    script: "broken".into(),
                    reason: "spawn table missing".into(),
                })
            })
        });
        registry
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_entities(None)
        }

        fn with_entities(entities: Option<Arc<dyn EntityInfoService>>) -> Self {
            let regions = Arc::new(MemoryRegionStore::new());
            let world = Arc::new(MemoryWorld::new());
            let handles = Arc::new(MemoryHandleStore::new());
            let events = Arc::new(MemoryEventBus::new());
            let scripts: ScriptLog = Arc::default();
            let services = RegionServices {
                regions: regions.clone(),
                scripts: Arc::new(registry(&scripts)),
                spatial: world.clone(),
                entities: entities.unwrap_or_else(|| world.clone() as Arc<dyn EntityInfoService>),
                handles: handles.clone(),
                events: events.clone(),
            };
            Self {
                regions,
                world,
                handles,
                events,
                scripts,
                manager: RegionPoolManager::with_rng(services, StdRng::seed_from_u64(7)),
            }
        }

        fn script_calls(&self) -> Vec<(String, ScriptContext)> {
            self.scripts.lock().unwrap().clone()
        }
    }

    fn pool(tag: &str, quantity: usize) -> RegionPool {
        RegionPool {
            tag: tag.into(),
            faction_id: FactionId(4),
            quantity,
            minimum_gap: SECTOR_GRID_SNAP,
            encounters: vec![EncounterDefinition {
                name: "ambush".into(),
                center: DVec3::ZERO,
                min_radius: 20_000_000.0,
                max_radius: 60_000_000.0,
                expiration: Duration::from_secs(3 * 3600),
                on_load_script: "load".into(),
                on_enter_script: "enter".into(),
            }],
        }
    }

    fn region(location: DVec3, tag: &str, created_at: SystemTime, ttl: Duration) -> RegionInstance {
        RegionInstance {
            id: Uuid::new_v4(),
            location: grid_snap(location, SECTOR_GRID_SNAP),
            faction_id: FactionId(4),
            tag: tag.into(),
            created_at,
            expires_at: created_at + ttl,
            force_expires_at: None,
            on_load_script: "load".into(),
            on_enter_script: "enter".into(),
            loaded: false,
            started: false,
        }
    }

    fn far(n: f64) -> DVec3 {
        DVec3::new(n * 500_000_000.0, 0.0, 0.0)
    }

    /// A region whose expiry passed an hour ago.
    fn expired(location: DVec3) -> (RegionInstance, SystemTime) {
        let now = SystemTime::now();
        let r = region(
            location,
            "X",
            now - Duration::from_secs(2 * 3600),
            Duration::from_secs(3600),
        );
        (r, now)
    }

    fn handle_in(id: u64, location: DVec3) -> EntityHandle {
        EntityHandle {
            entity_id: EntityId(id),
            faction_id: FactionId(4),
            region: location,
            definition: Some(EntityDefinition::default()),
            properties: HandleProperties::default(),
        }
    }

    #[tokio::test]
    async fn test_generation_fills_missing_slots_without_collisions() {
        let fixture = Fixture::new();
        let now = SystemTime::now();
        for n in 1..=3 {
            fixture
                .regions
                .add(region(far(n as f64), "X", now, Duration::from_secs(3600)))
                .await
                .unwrap();
        }

        let added = fixture.manager.generate(&pool("X", 5)).await.unwrap();
        assert_eq!(added, 2);
        assert_eq!(fixture.regions.count_by_tag("X").await.unwrap(), 5);

        let all = fixture.regions.get_all().await.unwrap();
        let cells: HashSet<GridCell> = all
            .iter()
            .map(|r| grid_cell(r.location, SECTOR_GRID_SNAP))
            .collect();
        assert_eq!(cells.len(), 5, "every region should own its own cell");
    }

    #[tokio::test]
    async fn test_generation_at_target_is_noop() {
        let fixture = Fixture::new();
        fixture
            .regions
            .add(region(far(1.0), "X", SystemTime::now(), Duration::from_secs(60)))
            .await
            .unwrap();

        assert_eq!(fixture.manager.generate(&pool("X", 1)).await.unwrap(), 0);
        assert_eq!(fixture.regions.len().await, 1);
    }

    #[tokio::test]
    async fn test_generation_counts_only_its_own_tag() {
        let fixture = Fixture::new();
        fixture
            .regions
            .add(region(far(1.0), "other", SystemTime::now(), Duration::from_secs(60)))
            .await
            .unwrap();

        assert_eq!(fixture.manager.generate(&pool("X", 2)).await.unwrap(), 2);
        assert_eq!(fixture.regions.count_by_tag("X").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_generation_without_encounters_adds_nothing() {
        let fixture = Fixture::new();
        let mut empty = pool("X", 3);
        empty.encounters.clear();
        assert_eq!(fixture.manager.generate(&empty).await.unwrap(), 0);
        assert!(fixture.regions.is_empty().await);
    }

    #[tokio::test]
    async fn test_generated_regions_are_snapped_and_staggered() {
        let fixture = Fixture::new();
        let pool = pool("X", 4);
        fixture.manager.generate(&pool).await.unwrap();

        let base = pool.encounters[0].expiration;
        for r in fixture.regions.get_all().await.unwrap() {
            assert_eq!(r.location, grid_snap(r.location, SECTOR_GRID_SNAP));
            assert!(!r.loaded && !r.started);
            assert_eq!(r.faction_id, FactionId(4));

            let lifetime = r.expires_at.duration_since(r.created_at).unwrap();
            assert!(lifetime >= base, "expiry must not precede the base lifetime");
            assert_eq!((lifetime - base).as_secs() % 60, 0, "stagger is whole minutes");
            assert!(lifetime - base < Duration::from_secs(60 * 60 * 4));
        }
    }

    #[tokio::test]
    async fn test_load_runs_script_and_marks_loaded() {
        let fixture = Fixture::new();
        let r = region(far(1.0), "X", SystemTime::now(), Duration::from_secs(60));
        let id = r.id;
        fixture.regions.add(r).await.unwrap();

        assert_eq!(fixture.manager.load_unloaded().await.unwrap(), 1);
        assert!(fixture.regions.get(id).await.unwrap().loaded);

        let calls = fixture.script_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "load");
        assert!(calls[0].1.initiators.is_empty());
        assert_eq!(calls[0].1.faction_id, FactionId(4));

        assert_eq!(fixture.manager.load_unloaded().await.unwrap(), 0, "loads once");
    }

    #[tokio::test]
    async fn test_load_failure_leaves_region_unloaded_and_raises() {
        let fixture = Fixture::new();
        let mut r = region(far(1.0), "X", SystemTime::now(), Duration::from_secs(60));
        r.on_load_script = "broken".into();
        let id = r.id;
        fixture.regions.add(r).await.unwrap();

        let result = fixture.manager.load_unloaded().await;
        assert!(matches!(result, Err(RegionError::Script { region, .. }) if region == id));
        assert!(!fixture.regions.get(id).await.unwrap().loaded);
        assert_eq!(fixture.regions.find_unloaded().await.unwrap().len(), 1, "retried next cycle");
    }

    async fn loaded_region(fixture: &Fixture, location: DVec3) -> Uuid {
        let mut r = region(location, "X", SystemTime::now(), Duration::from_secs(3600));
        r.loaded = true;
        let id = r.id;
        fixture.regions.add(r).await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_activation_waits_for_players() {
        let fixture = Fixture::new();
        let id = loaded_region(&fixture, far(1.0)).await;

        assert_eq!(fixture.manager.activate_entered().await.unwrap(), 0);
        assert!(!fixture.regions.get(id).await.unwrap().started);
        assert!(fixture.script_calls().is_empty());
    }

    #[tokio::test]
    async fn test_activation_runs_enter_script_once_with_pilots() {
        let fixture = Fixture::new();
        let location = grid_snap(far(1.0), SECTOR_GRID_SNAP);
        let id = loaded_region(&fixture, location).await;
        fixture
            .world
            .insert(WorldEntity::player(EntityId(50), PlayerId(7), location))
            .await;

        assert_eq!(fixture.manager.activate_entered().await.unwrap(), 1);
        assert!(fixture.regions.get(id).await.unwrap().started);

        let calls = fixture.script_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "enter");
        assert_eq!(calls[0].1.player_ids, BTreeSet::from([PlayerId(7)]));

        let events = fixture.events.events();
        assert_eq!(
            events,
            vec![EncounterEvent::RegionActivated {
                player_ids: vec![PlayerId(7)],
                representative_player: Some(PlayerId(7)),
                location,
                nearby_entity: Some(EntityId(50)),
                player_count: 1,
            }]
        );

        assert_eq!(fixture.manager.activate_entered().await.unwrap(), 0);
        assert_eq!(fixture.script_calls().len(), 1, "on-enter never re-runs");
    }

    #[tokio::test]
    async fn test_publish_failure_does_not_undo_startup() {
        let fixture = Fixture::new();
        let location = grid_snap(far(1.0), SECTOR_GRID_SNAP);
        let id = loaded_region(&fixture, location).await;
        fixture
            .world
            .insert(WorldEntity::player(EntityId(50), PlayerId(7), location))
            .await;
        fixture.events.set_failing(true);

        assert_eq!(fixture.manager.activate_entered().await.unwrap(), 1);
        assert!(fixture.regions.get(id).await.unwrap().started);
    }

    #[tokio::test]
    async fn test_enter_script_failure_keeps_region_pending() {
        let fixture = Fixture::new();
        let location = grid_snap(far(1.0), SECTOR_GRID_SNAP);
        let mut r = region(location, "X", SystemTime::now(), Duration::from_secs(3600));
        r.loaded = true;
        r.on_enter_script = "broken".into();
        let id = r.id;
        fixture.regions.add(r).await.unwrap();
        fixture
            .world
            .insert(WorldEntity::player(EntityId(50), PlayerId(7), location))
            .await;

        assert!(matches!(
            fixture.manager.activate_entered().await,
            Err(RegionError::Script { .. })
        ));
        assert!(!fixture.regions.get(id).await.unwrap().started);
        assert!(fixture.events.events().is_empty());
    }

    /// Entity info that is always down.
    struct Unreachable;

    impl EntityInfoService for Unreachable {
        fn get(&self, _id: EntityId) -> BoxFuture<'_, Result<Option<EntityInfo>, ServiceError>> {
            Box::pin(async { Err(ServiceError::Unavailable("grain timeout".into())) })
        }

        fn get_velocity(&self, _id: EntityId) -> BoxFuture<'_, Result<(DVec3, DVec3), ServiceError>> {
            Box::pin(async { Err(ServiceError::Unavailable("grain timeout".into())) })
        }

        fn activate_shields(&self, _id: EntityId) -> BoxFuture<'_, Result<(), ServiceError>> {
            Box::pin(async { Err(ServiceError::Unavailable("grain timeout".into())) })
        }
    }

    #[tokio::test]
    async fn test_pilot_lookup_failure_starts_without_pilots() {
        let fixture = Fixture::with_entities(Some(Arc::new(Unreachable)));
        let location = grid_snap(far(1.0), SECTOR_GRID_SNAP);
        let id = loaded_region(&fixture, location).await;
        fixture
            .world
            .insert(WorldEntity::player(EntityId(50), PlayerId(7), location))
            .await;

        assert_eq!(fixture.manager.activate_entered().await.unwrap(), 1);
        assert!(fixture.regions.get(id).await.unwrap().started);
        assert!(fixture.script_calls()[0].1.player_ids.is_empty());

        match &fixture.events.events()[0] {
            EncounterEvent::RegionActivated {
                representative_player,
                nearby_entity,
                player_count,
                ..
            } => {
                assert_eq!(*representative_player, None);
                assert_eq!(*nearby_entity, Some(EntityId(50)));
                assert_eq!(*player_count, 0);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cleanup_removes_unoccupied_region_and_its_handles() {
        let fixture = Fixture::new();
        let (r, now) = expired(far(1.0));
        let id = r.id;
        let location = r.location;
        fixture.regions.add(r).await.unwrap();
        fixture.handles.insert(handle_in(1, location)).await;
        fixture.handles.insert(handle_in(2, far(2.0))).await;

        let report = fixture.manager.execute_cleanup_at(now).await.unwrap();
        assert_eq!(
            report,
            CleanupReport {
                extended: 0,
                released_handles: 1,
                deleted: 1
            }
        );
        assert!(fixture.regions.get(id).await.is_none());
        assert!(!fixture.handles.contains(EntityId(1)).await);
        assert!(fixture.handles.contains(EntityId(2)).await);
    }

    #[tokio::test]
    async fn test_cleanup_extends_occupied_region() {
        let fixture = Fixture::new();
        let (r, now) = expired(far(1.0));
        let id = r.id;
        let old_expiry = r.expires_at;
        let location = r.location;
        fixture.regions.add(r).await.unwrap();
        fixture.handles.insert(handle_in(1, location)).await;
        fixture
            .world
            .insert(WorldEntity::player(EntityId(50), PlayerId(7), location))
            .await;

        let report = fixture.manager.execute_cleanup_at(now).await.unwrap();
        assert_eq!(report.extended, 1);
        assert_eq!(report.deleted, 0);

        let kept = fixture.regions.get(id).await.expect("region kept");
        assert_eq!(kept.expires_at, now + EXPIRATION_EXTENSION);
        assert!(kept.expires_at > old_expiry);
        assert!(fixture.handles.contains(EntityId(1)).await);
    }

    #[tokio::test]
    async fn test_repeated_extension_only_moves_forward() {
        let fixture = Fixture::new();
        let (r, now) = expired(far(1.0));
        let id = r.id;
        let location = r.location;
        fixture.regions.add(r).await.unwrap();
        fixture
            .world
            .insert(WorldEntity::player(EntityId(50), PlayerId(7), location))
            .await;

        fixture.manager.execute_cleanup_at(now).await.unwrap();
        let first = fixture.regions.get(id).await.unwrap().expires_at;

        let later = first + Duration::from_secs(1);
        fixture.manager.execute_cleanup_at(later).await.unwrap();
        let second = fixture.regions.get(id).await.unwrap().expires_at;
        assert!(second > first);
    }

    #[tokio::test]
    async fn test_force_expired_region_is_removed_even_when_occupied() {
        let fixture = Fixture::new();
        let (mut r, now) = expired(far(1.0));
        r.force_expires_at = Some(now - Duration::from_secs(1));
        let id = r.id;
        let location = r.location;
        fixture.regions.add(r).await.unwrap();
        fixture
            .world
            .insert(WorldEntity::player(EntityId(50), PlayerId(7), location))
            .await;

        let report = fixture.manager.execute_cleanup_at(now).await.unwrap();
        assert_eq!(report.extended, 0);
        assert_eq!(report.deleted, 1);
        assert!(fixture.regions.get(id).await.is_none());
    }

    #[tokio::test]
    async fn test_set_expiration_from_now() {
        let fixture = Fixture::new();
        let location = grid_snap(far(1.0), SECTOR_GRID_SNAP);
        let id = loaded_region(&fixture, location).await;

        let before = SystemTime::now();
        let span = Duration::from_secs(2 * 3600);
        assert!(fixture.manager.set_expiration_from_now(location, span).await.unwrap());
        assert!(fixture.regions.get(id).await.unwrap().expires_at >= before + span);

        assert!(
            !fixture
                .manager
                .set_expiration_from_now(far(3.0), span)
                .await
                .unwrap(),
            "no region at that location"
        );
    }
}
