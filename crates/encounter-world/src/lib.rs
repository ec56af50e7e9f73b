//! Shared records and collaborator interfaces for the encounter backend.
//!
//! Everything the scheduler and region manager talk to lives behind a narrow
//! trait in [`services`]; the [`memory`] module provides in-process
//! implementations used by the server binary and by tests.

pub mod error;
pub mod event;
pub mod handle;
pub mod ids;
pub mod memory;
pub mod region;
pub mod script;
pub mod services;
pub mod transform;

pub use error::{ConnectionError, PublishError, ScriptError, ServiceError, TransportError};
pub use event::EncounterEvent;
pub use handle::{EntityDefinition, EntityHandle, HandleProperties};
pub use ids::{ElementId, EntityId, FactionId, PlayerId, TerritoryId};
pub use region::{RegionInstance, SECTOR_GRID_SNAP};
pub use script::{ScriptContext, ScriptFn, ScriptRegistry};
pub use services::{
    BoxFuture, ElementService, EntityInfoService, EventPublisher, FeatureFlags, HandleStore,
    RegionStore, ScriptRunner, SpatialQuery, WorldClient,
};
pub use transform::{CoreUnitStatus, EntityInfo, TransformUpdate, now_millis};
