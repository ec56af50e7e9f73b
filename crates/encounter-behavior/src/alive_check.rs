//! Aliveness monitor: detects destroyed or abandoned entities and retires them.

use encounter_world::{ElementId, EncounterEvent, EntityId};

use crate::behavior::{BehaviorError, BehaviorKind, BehaviorServices};
use crate::context::BehaviorContext;

pub struct AliveCheckBehavior {
    entity_id: EntityId,
    core_unit: Option<ElementId>,
    services: BehaviorServices,
}

impl AliveCheckBehavior {
    pub fn new(entity_id: EntityId, services: BehaviorServices) -> Self {
        Self {
            entity_id,
            core_unit: None,
            services,
        }
    }

    /// Resolve the core unit element once.
    pub async fn initialize(&mut self, _context: &mut BehaviorContext) -> Result<(), BehaviorError> {
        if self.core_unit.is_none() {
            self.core_unit = Some(self.services.elements.core_unit(self.entity_id).await?);
        }
        Ok(())
    }

    pub async fn tick(&mut self, context: &mut BehaviorContext) -> Result<(), BehaviorError> {
        let id = self.entity_id;

        if !context.alive {
            self.services.handles.remove(id).await?;
            return Ok(());
        }

        if !context.is_active(BehaviorKind::AliveCheck) {
            return Ok(());
        }

        self.warm_probes().await;

        let core_unit = match self.core_unit {
            Some(core_unit) => core_unit,
            None => self.services.elements.core_unit(id).await?,
        };
        let status = self.services.elements.core_unit_status(id, core_unit).await?;
        let Some(info) = self.services.entities.get(id).await? else {
            tracing::debug!(entity = %id, "entity info unavailable, skipping alive check");
            return Ok(());
        };

        if status.destroyed || info.abandoned {
            let event = EncounterEvent::EntityDestroyed {
                entity_id: id,
                faction_id: context.faction_id,
                region: context.region,
            };
            if let Err(e) = self.services.events.publish(event).await {
                tracing::error!(entity = %id, error = %e, "failed to publish destruction");
            }

            context.deactivate(BehaviorKind::AliveCheck);
            context.alive = false;
            self.services.handles.remove(id).await?;

            tracing::info!(
                entity = %id,
                core_destroyed = status.destroyed,
                abandoned = info.abandoned,
                "entity retired"
            );
            return Ok(());
        }

        self.services.entities.activate_shields(id).await?;
        Ok(())
    }

    /// Touch engine and weapon state so downstream caches stay warm.
    async fn warm_probes(&self) {
        let elements = &self.services.elements;
        let (engines, weapons) = tokio::join!(
            elements.engine_power(self.entity_id),
            elements.functional_weapon_count(self.entity_id),
        );
        if let Err(e) = engines {
            tracing::warn!(entity = %self.entity_id, error = %e, "engine probe failed");
        }
        if let Err(e) = weapons {
            tracing::warn!(entity = %self.entity_id, error = %e, "weapon probe failed");
        }
    }
}
