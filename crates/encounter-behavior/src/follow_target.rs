//! Target pursuit: steers an entity toward its target under thrust,
//! speed and turn-rate limits, and pushes the result to the world.

use encounter_math::{
    GRAVITY_M_S2, METERS_PER_SU, clamp_velocity_change, forward, kph_to_mps,
    linear_interpolate_with_velocity, look_rotation, safe_normalize, slerp_towards,
};
use encounter_world::{
    EntityDefinition, EntityId, TransformUpdate, TransportError, now_millis,
};
use glam::DVec3;

use crate::behavior::{BehaviorError, BehaviorServices};
use crate::context::{BehaviorContext, PropertyValue};

/// Property holding the velocity at the end of the previous tick.
pub const PREVIOUS_VELOCITY: &str = "V0";

/// Share of thrust applied along the current heading; the rest points at the target.
const HEADING_THRUST_SHARE: f64 = 0.25;

/// How far ahead along the movement direction the nose is aimed.
const LOOK_AHEAD_M: f64 = METERS_PER_SU;

pub struct FollowTargetBehavior {
    entity_id: EntityId,
    definition: EntityDefinition,
    services: BehaviorServices,
}

impl FollowTargetBehavior {
    pub fn new(entity_id: EntityId, definition: EntityDefinition, services: BehaviorServices) -> Self {
        Self {
            entity_id,
            definition,
            services,
        }
    }

    pub async fn initialize(&mut self, _context: &mut BehaviorContext) -> Result<(), BehaviorError> {
        Ok(())
    }

    pub async fn tick(&mut self, context: &mut BehaviorContext) -> Result<(), BehaviorError> {
        if !context.alive {
            return Ok(());
        }
        let Some(target) = context.target_entity.filter(|t| t.0 != 0) else {
            return Ok(());
        };

        let entities = &self.services.entities;
        let (target_info, own_info) = tokio::join!(entities.get(target), entities.get(self.entity_id));
        let (Some(target_info), Some(own_info)) = (target_info?, own_info?) else {
            return Ok(());
        };

        let position = *context.position.get_or_insert(own_info.position);
        let destination = context
            .target_move_position
            .unwrap_or(target_info.position);
        let heading = forward(context.rotation);
        let move_direction = safe_normalize(destination - position);

        let power = self.services.elements.engine_power(self.entity_id).await?;
        let power = if power.is_finite() { power.clamp(0.0, 1.0) } else { 0.0 };
        tracing::trace!(entity = %self.entity_id, power, "engine power");

        if power <= f64::EPSILON {
            self.publish(context, position, DVec3::ZERO).await;
            return Ok(());
        }

        let mut acceleration = self.definition.acceleration_g * GRAVITY_M_S2 * power;
        let alignment = safe_normalize(context.velocity).dot(heading);
        if alignment < 0.0 {
            acceleration *= 1.0 + alignment.abs();
        }

        let thrust = heading * acceleration * HEADING_THRUST_SHARE
            + move_direction * acceleration * (1.0 - HEADING_THRUST_SHARE);

        let dt = context.delta_time;
        let mut velocity = context.velocity;
        let mut next_position = linear_interpolate_with_velocity(
            position,
            destination,
            &mut velocity,
            thrust,
            kph_to_mps(self.definition.max_speed_kph),
            dt,
        );

        let previous = context
            .vec3_property(PREVIOUS_VELOCITY)
            .unwrap_or(context.velocity);
        let (clamped, was_clamped) = clamp_velocity_change(previous, velocity, acceleration * dt);
        if was_clamped {
            tracing::debug!(
                entity = %self.entity_id,
                excess = (velocity - previous).length() - acceleration * dt,
                "velocity change clamped"
            );
            velocity = clamped;
            next_position = position + velocity * dt;
        }

        context.set_property(PREVIOUS_VELOCITY, PropertyValue::Vec3(velocity));
        context.velocity = velocity;

        if move_direction != DVec3::ZERO {
            let aim = look_rotation(position, position + move_direction * LOOK_AHEAD_M);
            context.rotation =
                slerp_towards(context.rotation, aim, self.definition.rotation_speed * dt);
        }

        context.position = Some(next_position);
        self.publish(context, next_position, velocity).await;
        Ok(())
    }

    /// Push a transform with the context's rotation. Transport failures get
    /// one reconnect.
    async fn publish(&self, context: &BehaviorContext, position: DVec3, velocity: DVec3) {
        let update = TransformUpdate {
            entity_id: self.entity_id,
            position,
            rotation: context.rotation,
            velocity,
            timestamp_ms: now_millis(),
        };

        match self.services.world.update(update).await {
            Ok(()) => {}
            Err(e @ (TransportError::NotConnected | TransportError::Io(_))) => {
                tracing::warn!(entity = %self.entity_id, error = %e, "transform update failed, reconnecting");
                if let Err(e) = self.services.world.reconnect().await {
                    tracing::error!(entity = %self.entity_id, error = %e, "reconnect failed");
                }
            }
            Err(e) => {
                tracing::error!(entity = %self.entity_id, error = %e, "transform update rejected");
            }
        }
    }
}
