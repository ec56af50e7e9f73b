//! Script execution context and a name-keyed registry of script callables.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use glam::DVec3;

use crate::error::ScriptError;
use crate::ids::{EntityId, FactionId, PlayerId};
use crate::services::{BoxFuture, ScriptRunner};

/// Inputs handed to an encounter script.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptContext {
    pub faction_id: FactionId,
    /// Entities that triggered the script. Empty for lifecycle scripts.
    pub initiators: Vec<EntityId>,
    /// Region location the script acts on.
    pub location: DVec3,
    /// Pilots present when the script was triggered.
    pub player_ids: BTreeSet<PlayerId>,
}

impl ScriptContext {
    /// Context with no initiators and no players.
    pub fn new(faction_id: FactionId, location: DVec3) -> Self {
        Self {
            faction_id,
            initiators: Vec::new(),
            location,
            player_ids: BTreeSet::new(),
        }
    }

    /// Attach the pilot set.
    pub fn with_players(mut self, player_ids: BTreeSet<PlayerId>) -> Self {
        self.player_ids = player_ids;
        self
    }
}

/// A registered script body.
pub type ScriptFn =
    Arc<dyn Fn(ScriptContext) -> BoxFuture<'static, Result<(), ScriptError>> + Send + Sync>;

/// Runs scripts registered by name.
#[derive(Default)]
pub struct ScriptRegistry {
    scripts: HashMap<String, ScriptFn>,
}

impl ScriptRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a script under `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, script: F)
    where
        F: Fn(ScriptContext) -> BoxFuture<'static, Result<(), ScriptError>> + Send + Sync + 'static,
    {
        self.scripts.insert(name.into(), Arc::new(script));
    }

    /// Whether a script is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.scripts.contains_key(name)
    }

    /// Registered script names (useful for startup logging).
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scripts.keys().map(String::as_str)
    }
}

impl ScriptRunner for ScriptRegistry {
    fn execute<'a>(
        &'a self,
        script: &'a str,
        context: ScriptContext,
    ) -> BoxFuture<'a, Result<(), ScriptError>> {
        Box::pin(async move {
            let body = self
                .scripts
                .get(script)
                .cloned()
                .ok_or_else(|| ScriptError::NotFound(script.to_string()))?;
            tracing::debug!(script, location = ?context.location, "executing script");
            body(context).await
        })
    }
}
