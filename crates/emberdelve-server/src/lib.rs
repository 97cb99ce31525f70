//! Emberdelve Session Server
//!
//! Authoritative server using Renet for networking.
//! Runs one session through lobby, dungeon, and scoring phases.

pub mod channels;
pub mod config;
pub mod registry;
pub mod scoreboard;
pub mod session;
pub mod transport;

pub use channels::*;
pub use config::{ConfigError, ScoreServiceConfig, ServerConfig};
pub use registry::{ConnectionRegistry, PlayerInfo, RegistryError};
pub use scoreboard::{Scoreboard, ScoreboardError, SubmissionBatch};
pub use session::{Outgoing, SendTo, Session};
pub use transport::{ServerRunner, TransportConfig, PROTOCOL_ID};
