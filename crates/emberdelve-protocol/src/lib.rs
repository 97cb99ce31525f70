//! Wire protocol for Emberdelve sessions.
//!
//! The message vocabulary shared by server and client, the identifier types
//! that correlate connections with players, and the fixed-layout binary
//! codec. This crate is the leaf of the workspace: it knows nothing about
//! transports or game rules.

mod codec;
mod ids;
mod message;

pub use crate::codec::{decode, encode, CodecError, MAX_MESSAGE_SIZE, MAX_NAME_BYTES};
pub use crate::ids::{MessageIds, PlayerColor, PlayerId, KEEPALIVE_MESSAGE_ID};
pub use crate::message::{
    Direction, Directions, Envelope, MessageKind, Payload, RoomView, ScoreEntry,
};
