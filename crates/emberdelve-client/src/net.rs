//! Renet plumbing for a live connection.
//!
//! Owns the netcode transport and the renet client, pumps received frames
//! through a [`SessionMirror`], and keeps the connection alive with a
//! periodic probe. Everything game-shaped lives in the mirror; this module
//! only moves bytes.

use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;
use renet::{ConnectionConfig, RenetClient};
use renet_netcode::{ClientAuthentication, NetcodeClientTransport};
use tracing::{info, warn};

use emberdelve_protocol::{
    decode, encode, CodecError, Envelope, MessageIds, Payload, KEEPALIVE_MESSAGE_ID,
};
use emberdelve_server::{channel_id, create_channel_configs, PROTOCOL_ID};

use crate::mirror::SessionMirror;

/// How often the liveness probe goes out.
const PING_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("already connected or connecting")]
    AlreadyConnected,
    #[error("not connected")]
    NotConnected,
    #[error("failed to bind local socket: {0}")]
    Bind(std::io::Error),
    #[error("failed to set socket non-blocking: {0}")]
    Nonblocking(std::io::Error),
    #[error("failed to create netcode transport: {0}")]
    Netcode(String),
    #[error("failed to encode message: {0}")]
    Encode(#[from] CodecError),
}

/// Client endpoint: one UDP socket, one server.
#[derive(Default)]
pub struct ClientNet {
    client: Option<RenetClient>,
    transport: Option<NetcodeClientTransport>,
    state: ConnectionState,
    /// Request id allocator; keep-alives use the reserved id instead.
    ids: MessageIds,
    time_since_ping: Duration,
}

impl ClientNet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens an unsecure netcode connection to `server_addr`.
    ///
    /// The client id is random; the server tracks identity per connection,
    /// not per id, so collisions only matter for the handshake.
    pub fn connect(&mut self, server_addr: SocketAddr) -> Result<(), ClientError> {
        if self.state != ConnectionState::Disconnected {
            return Err(ClientError::AlreadyConnected);
        }

        let socket = UdpSocket::bind("0.0.0.0:0").map_err(ClientError::Bind)?;
        socket
            .set_nonblocking(true)
            .map_err(ClientError::Nonblocking)?;

        let current_time = SystemTime::now().duration_since(UNIX_EPOCH).unwrap();
        let client_id: u64 = rand::thread_rng().gen();
        let authentication = ClientAuthentication::Unsecure {
            client_id,
            protocol_id: PROTOCOL_ID,
            server_addr,
            user_data: None,
        };
        let transport = NetcodeClientTransport::new(current_time, authentication, socket)
            .map_err(|e| ClientError::Netcode(e.to_string()))?;

        let connection_config = ConnectionConfig {
            available_bytes_per_tick: 60_000,
            server_channels_config: create_channel_configs(),
            client_channels_config: create_channel_configs(),
        };

        self.transport = Some(transport);
        self.client = Some(RenetClient::new(connection_config));
        self.state = ConnectionState::Connecting;
        self.time_since_ping = Duration::ZERO;

        info!("Connecting to {server_addr} (protocol {PROTOCOL_ID:016x})");
        Ok(())
    }

    /// One tick: pump the transport, feed every received frame through the
    /// mirror, send the mirror's replies, and fire the liveness probe when
    /// it is due. Returns the decoded envelopes for the caller to render.
    pub fn process(&mut self, delta: Duration, mirror: &mut SessionMirror) -> Vec<Envelope> {
        let current_time = SystemTime::now().duration_since(UNIX_EPOCH).unwrap();

        let mut transport_failed = false;
        match (self.transport.as_mut(), self.client.as_mut()) {
            (Some(transport), Some(client)) => {
                if let Err(e) = transport.update(current_time, client) {
                    warn!("Transport error: {e}");
                    transport_failed = true;
                } else {
                    let _ = transport.send_packets(client);
                }
            }
            _ => return Vec::new(),
        }
        if transport_failed {
            self.cleanup_connection();
            return Vec::new();
        }

        let is_connected = self.client.as_ref().map_or(false, |c| c.is_connected());
        if self.state == ConnectionState::Connecting && is_connected {
            self.state = ConnectionState::Connected;
            info!("Connected to server");
        }

        // Collect first, then process; replies borrow the client again.
        let mut raw_frames = Vec::new();
        if let Some(client) = &mut self.client {
            while let Some(data) = client.receive_message(channel_id::MESSAGES) {
                raw_frames.push(data.to_vec());
            }
            while let Some(data) = client.receive_message(channel_id::KEEPALIVE) {
                raw_frames.push(data.to_vec());
            }
        }

        let mut inbound = Vec::new();
        for data in raw_frames {
            let envelope = match decode(&data) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!("Discarding malformed server frame: {e}");
                    continue;
                }
            };
            for reply in mirror.handle_message(&envelope) {
                if let Err(e) = self.send(reply) {
                    warn!("Failed to send reply: {e}");
                }
            }
            inbound.push(envelope);
        }

        self.time_since_ping += delta;
        if self.time_since_ping >= PING_INTERVAL && is_connected {
            self.time_since_ping = Duration::ZERO;
            self.send_keepalive();
        }

        inbound
    }

    /// Sends a request payload on the reliable channel and returns the id
    /// it was stamped with, for correlating a later `RequestDenied`.
    pub fn send(&mut self, payload: Payload) -> Result<u32, ClientError> {
        let Some(client) = &mut self.client else {
            return Err(ClientError::NotConnected);
        };
        let id = self.ids.allocate();
        let bytes = encode(&Envelope::new(id, payload))?;
        client.send_message(channel_id::MESSAGES, bytes);
        Ok(id)
    }

    pub fn disconnect(&mut self) {
        if let Some(transport) = &mut self.transport {
            transport.disconnect();
        }
        self.cleanup_connection();
        info!("Disconnected");
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    fn send_keepalive(&mut self) {
        if let Some(client) = &mut self.client {
            if let Ok(bytes) = encode(&Envelope::new(KEEPALIVE_MESSAGE_ID, Payload::None)) {
                client.send_message(channel_id::KEEPALIVE, bytes);
            }
        }
    }

    fn cleanup_connection(&mut self) {
        self.client = None;
        self.transport = None;
        self.state = ConnectionState::Disconnected;
        self.time_since_ping = Duration::ZERO;
    }
}
