//! Messages exchanged with the world service.
//!
//! Every payload is `[version: u8] [postcard-encoded WorldMessage]`.

use encounter_world::{EntityId, TransformUpdate};
use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};

/// Current wire-protocol version. Prepended to every encoded message.
pub const PROTOCOL_VERSION: u8 = 1;

/// Top-level wire message. The enum discriminant is the type tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum WorldMessage {
    /// New transform for one entity.
    TransformUpdate(TransformFrame),
    /// Keepalive.
    Ping(Ping),
}

/// Flat wire form of a [`TransformUpdate`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransformFrame {
    pub entity_id: u64,
    pub position: [f64; 3],
    /// Quaternion as `[x, y, z, w]`.
    pub rotation: [f64; 4],
    pub velocity: [f64; 3],
    pub timestamp_ms: u64,
}

impl From<&TransformUpdate> for TransformFrame {
    fn from(update: &TransformUpdate) -> Self {
        Self {
            entity_id: update.entity_id.0,
            position: update.position.to_array(),
            rotation: update.rotation.to_array(),
            velocity: update.velocity.to_array(),
            timestamp_ms: update.timestamp_ms,
        }
    }
}

impl From<TransformFrame> for TransformUpdate {
    fn from(frame: TransformFrame) -> Self {
        Self {
            entity_id: EntityId(frame.entity_id),
            position: DVec3::from_array(frame.position),
            rotation: DQuat::from_array(frame.rotation),
            velocity: DVec3::from_array(frame.velocity),
            timestamp_ms: frame.timestamp_ms,
        }
    }
}

/// Keepalive ping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ping {
    pub timestamp_ms: u64,
    pub sequence: u32,
}

/// Errors that can occur while decoding a message.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// The payload was empty (no version byte).
    #[error("empty payload, no version byte")]
    EmptyPayload,

    /// The version byte does not match [`PROTOCOL_VERSION`].
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    #[error("deserialization error: {0}")]
    Postcard(#[from] postcard::Error),
}

/// Encode a [`WorldMessage`] into a versioned payload.
pub fn encode_message(msg: &WorldMessage) -> Result<Vec<u8>, postcard::Error> {
    let body = postcard::to_allocvec(msg)?;
    let mut out = Vec::with_capacity(1 + body.len());
    out.push(PROTOCOL_VERSION);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decode a versioned payload.
pub fn decode_message(data: &[u8]) -> Result<WorldMessage, MessageError> {
    let (&version, body) = data.split_first().ok_or(MessageError::EmptyPayload)?;
    if version != PROTOCOL_VERSION {
        return Err(MessageError::UnsupportedVersion(version));
    }
    Ok(postcard::from_bytes(body)?)
}
