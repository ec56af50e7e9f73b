//! Error types returned by collaborator interfaces.

use std::time::Duration;

use crate::ids::EntityId;

/// Failure of a world-state query or command (entity info, elements, stores).
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The backing service could not be reached or answered with an error.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The entity is unknown to the service.
    #[error("entity {0} not found")]
    EntityNotFound(EntityId),

    /// The stored record could not be decoded.
    #[error("malformed record: {0}")]
    Malformed(String),
}

/// Failure while pushing a transform update to the world.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// There is no open connection to push through.
    #[error("not connected to the world service")]
    NotConnected,

    /// The update could not be encoded for the wire.
    #[error("failed to encode update: {0}")]
    Encode(String),

    /// The world service refused the update.
    #[error("update rejected: {0}")]
    Rejected(String),

    /// The underlying socket failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure while re-establishing the world connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// A previous attempt failed recently; retry after the given delay.
    #[error("reconnect suppressed, backing off for {0:?}")]
    Backoff(Duration),

    /// The connect attempt did not complete in time.
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    /// The connect attempt failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a named encounter script.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// No script is registered under that name.
    #[error("script '{0}' not found")]
    NotFound(String),

    /// The script ran and failed.
    #[error("script '{script}' failed: {reason}")]
    Failed {
        /// Script name.
        script: String,
        /// Failure description.
        reason: String,
    },
}

/// Failure while publishing an [`EncounterEvent`](crate::EncounterEvent).
#[derive(Debug, thiserror::Error)]
#[error("failed to publish event: {0}")]
pub struct PublishError(pub String);
