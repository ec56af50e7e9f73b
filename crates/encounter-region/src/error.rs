use encounter_world::{ScriptError, ServiceError};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RegionError {
    #[error("script '{script}' failed for region {region}: {source}")]
    Script {
        region: Uuid,
        script: String,
        #[source]
        source: ScriptError,
    },

    #[error(transparent)]
    Service(#[from] ServiceError),
}
