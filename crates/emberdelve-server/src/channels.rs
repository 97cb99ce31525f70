//! Renet channel configuration shared by server and client.
//!
//! Channel 0: ReliableOrdered - every lobby and dungeon message
//! Channel 1: Unreliable - keep-alive probes and echoes

use std::time::Duration;

use renet::ChannelConfig;

/// Channel IDs for different message types
pub mod channel_id {
    /// Lobby and game traffic - must arrive in order
    pub const MESSAGES: u8 = 0;
    /// Keep-alive probes - can be lost
    pub const KEEPALIVE: u8 = 1;
}

/// Maximum bytes queued per channel
const MAX_CHANNEL_MEMORY: usize = 5 * 1024 * 1024; // 5 MB

/// Create the channel configurations both endpoints must agree on
pub fn create_channel_configs() -> Vec<ChannelConfig> {
    vec![
        // Channel 0: Messages (ReliableOrdered)
        // Every protocol message rides here; the turn protocol depends on
        // per-connection ordering.
        ChannelConfig {
            channel_id: channel_id::MESSAGES,
            max_memory_usage_bytes: MAX_CHANNEL_MEMORY,
            send_type: renet::SendType::ReliableOrdered {
                resend_time: Duration::from_millis(300),
            },
        },
        // Channel 1: Keep-alive (Unreliable)
        // Liveness probes; a lost probe just means the next one counts.
        ChannelConfig {
            channel_id: channel_id::KEEPALIVE,
            max_memory_usage_bytes: 64 * 1024, // 64 KB
            send_type: renet::SendType::Unreliable,
        },
    ]
}
