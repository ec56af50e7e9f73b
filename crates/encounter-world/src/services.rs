//! Collaborator interfaces.
//!
//! All methods return a [`BoxFuture`] so implementations can be shared as
//! `Arc<dyn Trait>` across tasks.

use std::future::Future;
use std::pin::Pin;
use std::time::SystemTime;

use glam::DVec3;
use uuid::Uuid;

use crate::error::{ConnectionError, PublishError, ScriptError, ServiceError, TransportError};
use crate::event::EncounterEvent;
use crate::handle::EntityHandle;
use crate::ids::{ElementId, EntityId};
use crate::region::RegionInstance;
use crate::script::ScriptContext;
use crate::transform::{CoreUnitStatus, EntityInfo, TransformUpdate};

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Live entity state queries.
pub trait EntityInfoService: Send + Sync {
    /// Position, rotation and pilot of an entity. `None` if it no longer exists.
    fn get(&self, id: EntityId) -> BoxFuture<'_, Result<Option<EntityInfo>, ServiceError>>;

    /// `(velocity, angular_velocity)` of an entity.
    fn get_velocity(&self, id: EntityId) -> BoxFuture<'_, Result<(DVec3, DVec3), ServiceError>>;

    /// Turn on the entity's shield generator.
    fn activate_shields(&self, id: EntityId) -> BoxFuture<'_, Result<(), ServiceError>>;
}

/// Element (part) level queries.
pub trait ElementService: Send + Sync {
    /// Element id of the entity's core unit.
    fn core_unit(&self, id: EntityId) -> BoxFuture<'_, Result<ElementId, ServiceError>>;

    /// Fresh, uncached status of the core unit.
    fn core_unit_status(
        &self,
        id: EntityId,
        core_unit: ElementId,
    ) -> BoxFuture<'_, Result<CoreUnitStatus, ServiceError>>;

    /// Combined space-engine power, nominally in `[0, 1]`.
    fn engine_power(&self, id: EntityId) -> BoxFuture<'_, Result<f64, ServiceError>>;

    /// Number of weapons still able to deal damage.
    fn functional_weapon_count(&self, id: EntityId) -> BoxFuture<'_, Result<u32, ServiceError>>;

    /// Force the power of one engine element.
    fn set_engine_power(
        &self,
        id: EntityId,
        element: ElementId,
        power: f64,
    ) -> BoxFuture<'_, Result<(), ServiceError>>;
}

/// Outbound transform channel into the simulated world.
pub trait WorldClient: Send + Sync {
    /// Push one transform update.
    fn update(&self, update: TransformUpdate) -> BoxFuture<'_, Result<(), TransportError>>;

    /// Re-establish the underlying connection.
    fn reconnect(&self) -> BoxFuture<'_, Result<(), ConnectionError>>;
}

/// Registry of active entity handles.
pub trait HandleStore: Send + Sync {
    /// All handles that should currently be ticked.
    fn find_active(&self) -> BoxFuture<'_, Result<Vec<EntityHandle>, ServiceError>>;

    /// Remove one handle. Removing an unknown id is not an error.
    fn remove(&self, id: EntityId) -> BoxFuture<'_, Result<(), ServiceError>>;

    /// Remove every handle spawned by the region at `location`. Returns how many.
    fn remove_in_region(&self, location: DVec3) -> BoxFuture<'_, Result<usize, ServiceError>>;
}

/// Persistence of region instances.
pub trait RegionStore: Send + Sync {
    fn count_by_tag<'a>(&'a self, tag: &'a str) -> BoxFuture<'a, Result<usize, ServiceError>>;

    fn get_all(&self) -> BoxFuture<'_, Result<Vec<RegionInstance>, ServiceError>>;

    fn add(&self, region: RegionInstance) -> BoxFuture<'_, Result<(), ServiceError>>;

    /// Regions whose on-load script has not run successfully.
    fn find_unloaded(&self) -> BoxFuture<'_, Result<Vec<RegionInstance>, ServiceError>>;

    /// Regions whose expiration is at or before `now`.
    fn find_expired(
        &self,
        now: SystemTime,
    ) -> BoxFuture<'_, Result<Vec<RegionInstance>, ServiceError>>;

    /// Loaded regions whose on-enter script has not run.
    fn find_pending_startup(&self) -> BoxFuture<'_, Result<Vec<RegionInstance>, ServiceError>>;

    fn set_loaded(&self, id: Uuid, loaded: bool) -> BoxFuture<'_, Result<(), ServiceError>>;

    /// Mark the on-enter script as done. Idempotent.
    fn tag_as_started(&self, id: Uuid) -> BoxFuture<'_, Result<(), ServiceError>>;

    fn set_expiration(
        &self,
        id: Uuid,
        expires_at: SystemTime,
    ) -> BoxFuture<'_, Result<(), ServiceError>>;

    /// Delete every region expired at `now`. Returns how many.
    fn delete_expired(&self, now: SystemTime) -> BoxFuture<'_, Result<usize, ServiceError>>;

    fn find_by_location(
        &self,
        location: DVec3,
    ) -> BoxFuture<'_, Result<Option<RegionInstance>, ServiceError>>;
}

/// Executes encounter scripts by name.
pub trait ScriptRunner: Send + Sync {
    fn execute<'a>(
        &'a self,
        script: &'a str,
        context: ScriptContext,
    ) -> BoxFuture<'a, Result<(), ScriptError>>;
}

/// Outbound event bus.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: EncounterEvent) -> BoxFuture<'_, Result<(), PublishError>>;
}

/// Runtime feature switches.
pub trait FeatureFlags: Send + Sync {
    fn get_enabled<'a>(
        &'a self,
        key: &'a str,
        default: bool,
    ) -> BoxFuture<'a, Result<bool, ServiceError>>;
}

/// Spatial lookups over live entities.
pub trait SpatialQuery: Send + Sync {
    /// Live, player-piloted entities inside the region at `location`.
    fn find_player_entities_near(
        &self,
        location: DVec3,
    ) -> BoxFuture<'_, Result<Vec<EntityId>, ServiceError>>;
}
