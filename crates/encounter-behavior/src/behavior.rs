//! Behavior kinds, categories and the per-entity behavior factory.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use encounter_world::{
    ElementService, EntityDefinition, EntityId, EntityInfoService, EventPublisher, FeatureFlags,
    HandleStore, ServiceError, WorldClient,
};

use crate::alive_check::AliveCheckBehavior;
use crate::context::BehaviorContext;
use crate::follow_target::FollowTargetBehavior;

/// Scheduling class. Each category is driven by its own loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BehaviorCategory {
    HighPriority,
    MovementPriority,
}

impl BehaviorCategory {
    pub const ALL: [BehaviorCategory; 2] = [Self::HighPriority, Self::MovementPriority];

    pub fn name(self) -> &'static str {
        match self {
            Self::HighPriority => "high-priority",
            Self::MovementPriority => "movement-priority",
        }
    }
}

impl fmt::Display for BehaviorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Every behavior an entity can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BehaviorKind {
    AliveCheck,
    FollowTarget,
}

impl BehaviorKind {
    pub fn category(self) -> BehaviorCategory {
        match self {
            Self::AliveCheck => BehaviorCategory::HighPriority,
            Self::FollowTarget => BehaviorCategory::MovementPriority,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::AliveCheck => "alive-check",
            Self::FollowTarget => "follow-target",
        }
    }

    /// Parse a handle's configured names, skipping unknown ones.
    pub fn parse_list<'a>(
        entity_id: EntityId,
        names: &'a [String],
    ) -> impl Iterator<Item = BehaviorKind> + 'a {
        names.iter().filter_map(move |name| match name.parse() {
            Ok(kind) => Some(kind),
            Err(e) => {
                tracing::debug!(entity = %entity_id, error = %e, "ignoring behavior");
                None
            }
        })
    }
}

impl fmt::Display for BehaviorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown behavior '{0}'")]
pub struct UnknownBehavior(pub String);

impl FromStr for BehaviorKind {
    type Err = UnknownBehavior;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "alive-check" | "AliveCheckBehavior" => Ok(Self::AliveCheck),
            "follow-target" | "FollowTargetBehaviorV2" => Ok(Self::FollowTarget),
            other => Err(UnknownBehavior(other.to_string())),
        }
    }
}

/// Failure inside one entity's behavior set. Stops at the loop's task boundary.
#[derive(Debug, thiserror::Error)]
pub enum BehaviorError {
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Collaborators available to behaviors.
#[derive(Clone)]
pub struct BehaviorServices {
    pub entities: Arc<dyn EntityInfoService>,
    pub elements: Arc<dyn ElementService>,
    pub world: Arc<dyn WorldClient>,
    pub handles: Arc<dyn HandleStore>,
    pub events: Arc<dyn EventPublisher>,
    pub flags: Arc<dyn FeatureFlags>,
}

/// One behavior instance bound to one entity.
pub enum Behavior {
    AliveCheck(AliveCheckBehavior),
    FollowTarget(FollowTargetBehavior),
}

impl Behavior {
    pub fn new(
        kind: BehaviorKind,
        entity_id: EntityId,
        definition: &EntityDefinition,
        services: &BehaviorServices,
    ) -> Self {
        match kind {
            BehaviorKind::AliveCheck => {
                Self::AliveCheck(AliveCheckBehavior::new(entity_id, services.clone()))
            }
            BehaviorKind::FollowTarget => Self::FollowTarget(FollowTargetBehavior::new(
                entity_id,
                definition.clone(),
                services.clone(),
            )),
        }
    }

    pub fn kind(&self) -> BehaviorKind {
        match self {
            Self::AliveCheck(_) => BehaviorKind::AliveCheck,
            Self::FollowTarget(_) => BehaviorKind::FollowTarget,
        }
    }

    pub fn category(&self) -> BehaviorCategory {
        self.kind().category()
    }

    /// Idempotent setup, run before every tick.
    pub async fn initialize(&mut self, context: &mut BehaviorContext) -> Result<(), BehaviorError> {
        match self {
            Self::AliveCheck(b) => b.initialize(context).await,
            Self::FollowTarget(b) => b.initialize(context).await,
        }
    }

    /// One frame of logic.
    pub async fn tick(&mut self, context: &mut BehaviorContext) -> Result<(), BehaviorError> {
        match self {
            Self::AliveCheck(b) => b.tick(context).await,
            Self::FollowTarget(b) => b.tick(context).await,
        }
    }
}

/// Instantiate the behaviors configured for `entity_id` that belong to `category`,
/// in configuration order.
pub fn build_behaviors(
    entity_id: EntityId,
    definition: &EntityDefinition,
    names: &[String],
    category: BehaviorCategory,
    services: &BehaviorServices,
) -> Vec<Behavior> {
    BehaviorKind::parse_list(entity_id, names)
        .filter(|kind| kind.category() == category)
        .map(|kind| Behavior::new(kind, entity_id, definition, services))
        .collect()
}
