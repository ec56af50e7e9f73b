//! In-process collaborator implementations.
//!
//! The server binary uses these as its local world mirror and stores; tests
//! use them as fakes, with switches to inject the failures each error path
//! needs.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::SystemTime;

use encounter_math::grid_cell;
use glam::{DQuat, DVec3};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{ConnectionError, PublishError, ServiceError, TransportError};
use crate::event::EncounterEvent;
use crate::handle::EntityHandle;
use crate::ids::{ElementId, EntityId, PlayerId};
use crate::region::{RegionInstance, SECTOR_GRID_SNAP};
use crate::services::{
    BoxFuture, ElementService, EntityInfoService, EventPublisher, FeatureFlags, HandleStore,
    RegionStore, SpatialQuery, WorldClient,
};
use crate::transform::{CoreUnitStatus, EntityInfo, TransformUpdate};

fn same_region(a: DVec3, b: DVec3) -> bool {
    grid_cell(a, SECTOR_GRID_SNAP) == grid_cell(b, SECTOR_GRID_SNAP)
}

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Handle store backed by a map.
#[derive(Default)]
pub struct MemoryHandleStore {
    handles: RwLock<HashMap<EntityId, EntityHandle>>,
}

impl MemoryHandleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a spawned entity.
    pub async fn insert(&self, handle: EntityHandle) {
        self.handles.write().await.insert(handle.entity_id, handle);
    }

    pub async fn contains(&self, id: EntityId) -> bool {
        self.handles.read().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.handles.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.handles.read().await.is_empty()
    }
}

impl HandleStore for MemoryHandleStore {
    fn find_active(&self) -> BoxFuture<'_, Result<Vec<EntityHandle>, ServiceError>> {
        Box::pin(async move {
            let mut handles: Vec<_> = self.handles.read().await.values().cloned().collect();
            handles.sort_by_key(|h| h.entity_id);
            Ok(handles)
        })
    }

    fn remove(&self, id: EntityId) -> BoxFuture<'_, Result<(), ServiceError>> {
        Box::pin(async move {
            self.handles.write().await.remove(&id);
            Ok(())
        })
    }

    fn remove_in_region(&self, location: DVec3) -> BoxFuture<'_, Result<usize, ServiceError>> {
        Box::pin(async move {
            let mut handles = self.handles.write().await;
            let before = handles.len();
            handles.retain(|_, h| !same_region(h.region, location));
            Ok(before - handles.len())
        })
    }
}

// ---------------------------------------------------------------------------
// Regions
// ---------------------------------------------------------------------------

/// Region store backed by a map.
#[derive(Default)]
pub struct MemoryRegionStore {
    regions: RwLock<HashMap<Uuid, RegionInstance>>,
}

impl MemoryRegionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: Uuid) -> Option<RegionInstance> {
        self.regions.read().await.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.regions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.regions.read().await.is_empty()
    }

    async fn update<F: FnOnce(&mut RegionInstance)>(
        &self,
        id: Uuid,
        f: F,
    ) -> Result<(), ServiceError> {
        let mut regions = self.regions.write().await;
        let region = regions
            .get_mut(&id)
            .ok_or_else(|| ServiceError::Unavailable(format!("region {id} not found")))?;
        f(region);
        Ok(())
    }

    async fn filtered<F: Fn(&RegionInstance) -> bool>(&self, pred: F) -> Vec<RegionInstance> {
        let mut out: Vec<_> = self
            .regions
            .read()
            .await
            .values()
            .filter(|r| pred(r))
            .cloned()
            .collect();
        out.sort_by_key(|r| r.created_at);
        out
    }
}

impl RegionStore for MemoryRegionStore {
    fn count_by_tag<'a>(&'a self, tag: &'a str) -> BoxFuture<'a, Result<usize, ServiceError>> {
        Box::pin(async move {
            Ok(self
                .regions
                .read()
                .await
                .values()
                .filter(|r| r.tag == tag)
                .count())
        })
    }

    fn get_all(&self) -> BoxFuture<'_, Result<Vec<RegionInstance>, ServiceError>> {
        Box::pin(async move { Ok(self.filtered(|_| true).await) })
    }

    fn add(&self, region: RegionInstance) -> BoxFuture<'_, Result<(), ServiceError>> {
        Box::pin(async move {
            self.regions.write().await.insert(region.id, region);
            Ok(())
        })
    }

    fn find_unloaded(&self) -> BoxFuture<'_, Result<Vec<RegionInstance>, ServiceError>> {
        Box::pin(async move { Ok(self.filtered(|r| !r.loaded).await) })
    }

    fn find_expired(
        &self,
        now: SystemTime,
    ) -> BoxFuture<'_, Result<Vec<RegionInstance>, ServiceError>> {
        Box::pin(async move { Ok(self.filtered(|r| r.is_expired(now)).await) })
    }

    fn find_pending_startup(&self) -> BoxFuture<'_, Result<Vec<RegionInstance>, ServiceError>> {
        Box::pin(async move { Ok(self.filtered(RegionInstance::is_pending_startup).await) })
    }

    fn set_loaded(&self, id: Uuid, loaded: bool) -> BoxFuture<'_, Result<(), ServiceError>> {
        Box::pin(async move { self.update(id, |r| r.loaded = loaded).await })
    }

    fn tag_as_started(&self, id: Uuid) -> BoxFuture<'_, Result<(), ServiceError>> {
        Box::pin(async move { self.update(id, |r| r.started = true).await })
    }

    fn set_expiration(
        &self,
        id: Uuid,
        expires_at: SystemTime,
    ) -> BoxFuture<'_, Result<(), ServiceError>> {
        Box::pin(async move {
            self.update(id, |r| r.expires_at = expires_at.max(r.created_at))
                .await
        })
    }

    fn delete_expired(&self, now: SystemTime) -> BoxFuture<'_, Result<usize, ServiceError>> {
        Box::pin(async move {
            let mut regions = self.regions.write().await;
            let before = regions.len();
            regions.retain(|_, r| !r.is_expired(now));
            Ok(before - regions.len())
        })
    }

    fn find_by_location(
        &self,
        location: DVec3,
    ) -> BoxFuture<'_, Result<Option<RegionInstance>, ServiceError>> {
        Box::pin(async move {
            Ok(self
                .regions
                .read()
                .await
                .values()
                .find(|r| same_region(r.location, location))
                .cloned())
        })
    }
}

// ---------------------------------------------------------------------------
// World mirror
// ---------------------------------------------------------------------------

/// One entity tracked by [`MemoryWorld`].
#[derive(Debug, Clone)]
pub struct WorldEntity {
    pub info: EntityInfo,
    pub velocity: DVec3,
    pub angular_velocity: DVec3,
    pub engine_power: f64,
    pub weapon_count: u32,
    pub core_unit: ElementId,
    pub core_destroyed: bool,
    /// Counted by [`SpatialQuery`] when it also has a pilot.
    pub player_controlled: bool,
    pub shields_active: bool,
}

impl WorldEntity {
    /// An unpiloted NPC entity at `position` with full engine power.
    pub fn npc(id: EntityId, position: DVec3) -> Self {
        Self {
            info: EntityInfo {
                entity_id: id,
                position,
                rotation: DQuat::IDENTITY,
                pilot_id: None,
                abandoned: false,
            },
            velocity: DVec3::ZERO,
            angular_velocity: DVec3::ZERO,
            engine_power: 1.0,
            weapon_count: 0,
            core_unit: ElementId(1),
            core_destroyed: false,
            player_controlled: false,
            shields_active: false,
        }
    }

    /// A player-piloted entity at `position`.
    pub fn player(id: EntityId, pilot: PlayerId, position: DVec3) -> Self {
        let mut entity = Self::npc(id, position);
        entity.info.pilot_id = Some(pilot);
        entity.player_controlled = true;
        entity
    }
}

/// In-memory stand-in for the world service.
///
/// Implements every world-facing trait. Transform updates are applied to the
/// mirrored state and recorded for inspection.
pub struct MemoryWorld {
    entities: RwLock<HashMap<EntityId, WorldEntity>>,
    updates: Mutex<Vec<TransformUpdate>>,
    region_radius: f64,
    info_unavailable: AtomicBool,
    probes_unavailable: AtomicBool,
    fail_updates: AtomicU32,
    fail_reconnect: AtomicBool,
    reconnects: AtomicU32,
}

impl Default for MemoryWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryWorld {
    /// Empty world; regions span half a sector grid cell around their location.
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
            updates: Mutex::new(Vec::new()),
            region_radius: SECTOR_GRID_SNAP / 2.0,
            info_unavailable: AtomicBool::new(false),
            probes_unavailable: AtomicBool::new(false),
            fail_updates: AtomicU32::new(0),
            fail_reconnect: AtomicBool::new(false),
            reconnects: AtomicU32::new(0),
        }
    }

    pub async fn insert(&self, entity: WorldEntity) {
        self.entities
            .write()
            .await
            .insert(entity.info.entity_id, entity);
    }

    pub async fn entity(&self, id: EntityId) -> Option<WorldEntity> {
        self.entities.read().await.get(&id).cloned()
    }

    /// Mutate a tracked entity. Returns `false` if unknown.
    pub async fn modify<F: FnOnce(&mut WorldEntity)>(&self, id: EntityId, f: F) -> bool {
        match self.entities.write().await.get_mut(&id) {
            Some(entity) => {
                f(entity);
                true
            }
            None => false,
        }
    }

    /// Make entity-info queries fail.
    pub fn set_info_unavailable(&self, unavailable: bool) {
        self.info_unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make engine-power and weapon-count probes fail.
    pub fn set_probes_unavailable(&self, unavailable: bool) {
        self.probes_unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fail the next `count` transform updates with a transport error.
    pub fn fail_next_updates(&self, count: u32) {
        self.fail_updates.store(count, Ordering::SeqCst);
    }

    /// Make reconnect attempts fail.
    pub fn set_fail_reconnect(&self, fail: bool) {
        self.fail_reconnect.store(fail, Ordering::SeqCst);
    }

    /// Number of reconnect attempts seen.
    pub fn reconnect_count(&self) -> u32 {
        self.reconnects.load(Ordering::SeqCst)
    }

    /// Every successfully applied transform update, oldest first.
    pub fn updates(&self) -> Vec<TransformUpdate> {
        self.updates
            .lock()
            .map(|u| u.clone())
            .unwrap_or_default()
    }

    /// The most recent applied update for `id`.
    pub fn last_update(&self, id: EntityId) -> Option<TransformUpdate> {
        self.updates().into_iter().rev().find(|u| u.entity_id == id)
    }

    fn check_info(&self) -> Result<(), ServiceError> {
        if self.info_unavailable.load(Ordering::SeqCst) {
            return Err(ServiceError::Unavailable("entity info offline".into()));
        }
        Ok(())
    }

    fn check_probes(&self) -> Result<(), ServiceError> {
        if self.probes_unavailable.load(Ordering::SeqCst) {
            return Err(ServiceError::Unavailable("element probes offline".into()));
        }
        Ok(())
    }

    async fn read_entity<T, F: FnOnce(&WorldEntity) -> T>(
        &self,
        id: EntityId,
        f: F,
    ) -> Result<T, ServiceError> {
        self.entities
            .read()
            .await
            .get(&id)
            .map(f)
            .ok_or(ServiceError::EntityNotFound(id))
    }
}

impl EntityInfoService for MemoryWorld {
    fn get(&self, id: EntityId) -> BoxFuture<'_, Result<Option<EntityInfo>, ServiceError>> {
        Box::pin(async move {
            self.check_info()?;
            Ok(self.entities.read().await.get(&id).map(|e| e.info.clone()))
        })
    }

    fn get_velocity(&self, id: EntityId) -> BoxFuture<'_, Result<(DVec3, DVec3), ServiceError>> {
        Box::pin(async move {
            self.check_info()?;
            self.read_entity(id, |e| (e.velocity, e.angular_velocity))
                .await
        })
    }

    fn activate_shields(&self, id: EntityId) -> BoxFuture<'_, Result<(), ServiceError>> {
        Box::pin(async move {
            if self.modify(id, |e| e.shields_active = true).await {
                Ok(())
            } else {
                Err(ServiceError::EntityNotFound(id))
            }
        })
    }
}

impl ElementService for MemoryWorld {
    fn core_unit(&self, id: EntityId) -> BoxFuture<'_, Result<ElementId, ServiceError>> {
        Box::pin(async move { self.read_entity(id, |e| e.core_unit).await })
    }

    fn core_unit_status(
        &self,
        id: EntityId,
        core_unit: ElementId,
    ) -> BoxFuture<'_, Result<CoreUnitStatus, ServiceError>> {
        Box::pin(async move {
            self.read_entity(id, |e| CoreUnitStatus {
                destroyed: e.core_destroyed || e.core_unit != core_unit,
            })
            .await
        })
    }

    fn engine_power(&self, id: EntityId) -> BoxFuture<'_, Result<f64, ServiceError>> {
        Box::pin(async move {
            self.check_probes()?;
            self.read_entity(id, |e| e.engine_power).await
        })
    }

    fn functional_weapon_count(&self, id: EntityId) -> BoxFuture<'_, Result<u32, ServiceError>> {
        Box::pin(async move {
            self.check_probes()?;
            self.read_entity(id, |e| e.weapon_count).await
        })
    }

    fn set_engine_power(
        &self,
        id: EntityId,
        _element: ElementId,
        power: f64,
    ) -> BoxFuture<'_, Result<(), ServiceError>> {
        Box::pin(async move {
            if self.modify(id, |e| e.engine_power = power).await {
                Ok(())
            } else {
                Err(ServiceError::EntityNotFound(id))
            }
        })
    }
}

impl WorldClient for MemoryWorld {
    fn update(&self, update: TransformUpdate) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            let remaining = self.fail_updates.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_updates.store(remaining - 1, Ordering::SeqCst);
                return Err(TransportError::NotConnected);
            }

            self.modify(update.entity_id, |e| {
                e.info.position = update.position;
                e.info.rotation = update.rotation;
                e.velocity = update.velocity;
            })
            .await;

            if let Ok(mut updates) = self.updates.lock() {
                updates.push(update);
            }
            Ok(())
        })
    }

    fn reconnect(&self) -> BoxFuture<'_, Result<(), ConnectionError>> {
        Box::pin(async move {
            self.reconnects.fetch_add(1, Ordering::SeqCst);
            if self.fail_reconnect.load(Ordering::SeqCst) {
                return Err(ConnectionError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "world service refused connection",
                )));
            }
            Ok(())
        })
    }
}

impl SpatialQuery for MemoryWorld {
    fn find_player_entities_near(
        &self,
        location: DVec3,
    ) -> BoxFuture<'_, Result<Vec<EntityId>, ServiceError>> {
        Box::pin(async move {
            self.check_info()?;
            let mut ids: Vec<_> = self
                .entities
                .read()
                .await
                .values()
                .filter(|e| e.player_controlled && e.info.pilot_id.is_some())
                .filter(|e| e.info.position.distance(location) <= self.region_radius)
                .map(|e| e.info.entity_id)
                .collect();
            ids.sort();
            Ok(ids)
        })
    }
}

// ---------------------------------------------------------------------------
// Events and feature flags
// ---------------------------------------------------------------------------

/// Event publisher that records everything it is given.
#[derive(Default)]
pub struct MemoryEventBus {
    events: Mutex<Vec<EncounterEvent>>,
    failing: AtomicBool,
}

impl MemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every publish fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<EncounterEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl EventPublisher for MemoryEventBus {
    fn publish(&self, event: EncounterEvent) -> BoxFuture<'_, Result<(), PublishError>> {
        Box::pin(async move {
            if self.failing.load(Ordering::SeqCst) {
                return Err(PublishError(format!("bus rejected {}", event.name())));
            }
            tracing::debug!(event = event.name(), "event published");
            if let Ok(mut events) = self.events.lock() {
                events.push(event);
            }
            Ok(())
        })
    }
}

/// Feature flags held in memory; unknown keys fall back to the caller's default.
#[derive(Default)]
pub struct MemoryFeatureFlags {
    flags: RwLock<HashMap<String, bool>>,
    unavailable: AtomicBool,
}

impl MemoryFeatureFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, key: impl Into<String>, enabled: bool) {
        self.flags.write().await.insert(key.into(), enabled);
    }

    /// Make reads fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

impl FeatureFlags for MemoryFeatureFlags {
    fn get_enabled<'a>(
        &'a self,
        key: &'a str,
        default: bool,
    ) -> BoxFuture<'a, Result<bool, ServiceError>> {
        Box::pin(async move {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(ServiceError::Unavailable("feature store offline".into()));
            }
            Ok(self.flags.read().await.get(key).copied().unwrap_or(default))
        })
    }
}
