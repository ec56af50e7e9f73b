//! Request routing and handlers.

use encounter_math::look_rotation;
use encounter_world::{ElementId, EntityId, ServiceError, TransformUpdate, TransportError, now_millis};
use glam::DVec3;
use serde::Serialize;
use serde_json::{Value, json};
use tiny_http::Method;

use crate::server::AdminState;

/// Distance a nudge moves an entity along +X, in meters.
pub const NUDGE_DISTANCE: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Health,
    Stats,
    Entity(EntityId),
    Velocity(EntityId),
    EnginePower(EntityId, ElementId),
    Nudge(EntityId),
    LookAt(EntityId, EntityId),
    BadRequest,
    NotFound,
}

impl Route {
    pub fn parse(method: &Method, url: &str) -> Self {
        let path = url.split('?').next().unwrap_or(url);
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

        let parsed = match (method, segments.as_slice()) {
            (Method::Get, ["health"]) => Some(Route::Health),
            (Method::Get, ["stats"]) => Some(Route::Stats),
            (Method::Get, ["entity", entity]) => parse_id(entity).map(|e| Route::Entity(EntityId(e))),
            (Method::Get, ["entity", entity, "velocity"]) => {
                parse_id(entity).map(|e| Route::Velocity(EntityId(e)))
            }
            (Method::Post, ["entity", entity, "engine-power", element]) => parse_id(entity)
                .zip(parse_id(element))
                .map(|(e, el)| Route::EnginePower(EntityId(e), ElementId(el))),
            (Method::Post, ["entity", entity, "nudge"]) => {
                parse_id(entity).map(|e| Route::Nudge(EntityId(e)))
            }
            (Method::Post, ["entity", from, "look-at", to]) => parse_id(from)
                .zip(parse_id(to))
                .map(|(f, t)| Route::LookAt(EntityId(f), EntityId(t))),
            _ => return Route::NotFound,
        };
        parsed.unwrap_or(Route::BadRequest)
    }
}

fn parse_id(segment: &str) -> Option<u64> {
    segment.parse().ok()
}

/// Status code and JSON body.
#[derive(Debug)]
pub(crate) struct Reply {
    pub status: u16,
    pub body: Value,
}

impl Reply {
    fn ok(body: impl Serialize) -> Self {
        match serde_json::to_value(body) {
            Ok(body) => Self { status: 200, body },
            Err(e) => Self::error(500, e.to_string()),
        }
    }

    fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": message.into() }),
        }
    }
}

impl From<ServiceError> for Reply {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::EntityNotFound(_) => Reply::error(404, e.to_string()),
            _ => Reply::error(503, e.to_string()),
        }
    }
}

impl From<TransportError> for Reply {
    fn from(e: TransportError) -> Self {
        Reply::error(502, e.to_string())
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_seconds: f64,
}

#[derive(Serialize)]
struct VelocityResponse {
    entity_id: EntityId,
    velocity: DVec3,
    angular_velocity: DVec3,
}

#[derive(Serialize)]
struct EnginePowerResponse {
    entity_id: EntityId,
    element_id: ElementId,
    power: f64,
}

pub(crate) async fn dispatch(state: &AdminState, route: Route) -> Reply {
    let result = match route {
        Route::Health => Ok(Reply::ok(HealthResponse {
            status: "ok",
            uptime_seconds: state.started_at.elapsed().as_secs_f64(),
        })),
        Route::Stats => Ok(stats(state)),
        Route::Entity(id) => entity(state, id).await,
        Route::Velocity(id) => velocity(state, id).await,
        Route::EnginePower(id, element) => engine_power(state, id, element).await,
        Route::Nudge(id) => nudge(state, id).await,
        Route::LookAt(from, to) => look_at(state, from, to).await,
        Route::BadRequest => Ok(Reply::error(400, "malformed id")),
        Route::NotFound => Ok(Reply::error(404, "not found")),
    };
    result.unwrap_or_else(|reply| reply)
}

fn stats(state: &AdminState) -> Reply {
    let mut loops = serde_json::Map::new();
    for (category, stats) in &state.loops {
        let snapshot = match stats.lock() {
            Ok(stats) => stats.snapshot(),
            Err(_) => return Reply::error(500, "stats lock poisoned"),
        };
        match serde_json::to_value(snapshot) {
            Ok(value) => {
                loops.insert(category.name().to_string(), value);
            }
            Err(e) => return Reply::error(500, e.to_string()),
        }
    }
    Reply::ok(Value::Object(loops))
}

async fn entity(state: &AdminState, id: EntityId) -> Result<Reply, Reply> {
    match state.entities.get(id).await? {
        Some(info) => Ok(Reply::ok(info)),
        None => Err(ServiceError::EntityNotFound(id).into()),
    }
}

async fn velocity(state: &AdminState, id: EntityId) -> Result<Reply, Reply> {
    let (velocity, angular_velocity) = state.entities.get_velocity(id).await?;
    Ok(Reply::ok(VelocityResponse {
        entity_id: id,
        velocity,
        angular_velocity,
    }))
}

async fn engine_power(state: &AdminState, id: EntityId, element: ElementId) -> Result<Reply, Reply> {
    state.elements.set_engine_power(id, element, 1.0).await?;
    tracing::info!(entity = %id, element = %element, "forced engine power");
    Ok(Reply::ok(EnginePowerResponse {
        entity_id: id,
        element_id: element,
        power: 1.0,
    }))
}

async fn nudge(state: &AdminState, id: EntityId) -> Result<Reply, Reply> {
    let info = state
        .entities
        .get(id)
        .await?
        .ok_or(ServiceError::EntityNotFound(id))?;
    let update = TransformUpdate {
        entity_id: id,
        position: info.position + DVec3::X * NUDGE_DISTANCE,
        rotation: info.rotation,
        velocity: DVec3::ZERO,
        timestamp_ms: now_millis(),
    };
    state.world.update(update.clone()).await?;
    tracing::info!(entity = %id, position = ?update.position, "nudged entity");
    Ok(Reply::ok(update))
}

async fn look_at(state: &AdminState, from: EntityId, to: EntityId) -> Result<Reply, Reply> {
    let (source, target) = tokio::join!(state.entities.get(from), state.entities.get(to));
    let source = source?.ok_or(ServiceError::EntityNotFound(from))?;
    let target = target?.ok_or(ServiceError::EntityNotFound(to))?;

    let update = TransformUpdate {
        entity_id: from,
        position: source.position,
        rotation: look_rotation(source.position, target.position),
        velocity: DVec3::ZERO,
        timestamp_ms: now_millis(),
    };
    state.world.update(update.clone()).await?;
    tracing::info!(entity = %from, target = %to, "rotated entity");
    Ok(Reply::ok(update))
}
