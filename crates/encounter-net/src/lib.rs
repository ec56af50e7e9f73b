//! Outbound connection to the world service.
//!
//! Transform updates are encoded as [`WorldMessage`]s, framed with a length
//! prefix and pushed over TCP by [`TcpWorldClient`], which implements the
//! [`WorldClient`](encounter_world::WorldClient) collaborator.

pub mod backoff;
pub mod client;
pub mod framing;
pub mod messages;

pub use backoff::{Backoff, ReconnectConfig, ReconnectError};
pub use client::{ConnectionState, ConnectionStateWatch, TcpWorldClient, WorldClientConfig};
pub use framing::{FrameConfig, FrameError, read_frame, write_frame};
pub use messages::{
    MessageError, PROTOCOL_VERSION, Ping, TransformFrame, WorldMessage, decode_message,
    encode_message,
};
