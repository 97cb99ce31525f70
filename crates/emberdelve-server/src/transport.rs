//! Transport layer using renet_netcode for UDP communication.
//!
//! Owns the socket and the packet pump; everything above it works in
//! decoded messages and never sees an address.

use std::net::{SocketAddr, UdpSocket};
use std::time::{SystemTime, UNIX_EPOCH};

use renet::RenetServer;
use renet_netcode::{NetcodeServerTransport, ServerAuthentication, ServerConfig};
use tracing::{error, info};

/// Protocol ID shared by server and client ("EMBRDLV1" as ASCII bytes)
pub const PROTOCOL_ID: u64 = 0x454D_4252_444C_5631;

/// Transport settings, independent of game rules
pub struct TransportConfig {
    /// Address to listen on
    pub listen_address: SocketAddr,
    /// Connection slots offered to netcode
    pub max_clients: usize,
    /// 32-byte key for secure connect tokens; None is unsecure mode
    /// (development/LAN)
    pub private_key: Option<[u8; 32]>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            listen_address: "127.0.0.1:7777".parse().unwrap(),
            max_clients: 4,
            private_key: None,
        }
    }
}

/// Transport error types
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to bind {0}: {1}")]
    Bind(SocketAddr, std::io::Error),

    #[error("Failed to read the bound address for {0}: {1}")]
    BoundAddress(SocketAddr, std::io::Error),

    #[error("Failed to make the socket nonblocking: {0}")]
    Nonblocking(std::io::Error),

    #[error("Failed to create netcode transport: {0}")]
    Netcode(String),
}

/// Binds the UDP socket and wraps it in a netcode transport
pub fn create_server_transport(
    config: TransportConfig,
) -> Result<NetcodeServerTransport, TransportError> {
    let socket = UdpSocket::bind(config.listen_address)
        .map_err(|e| TransportError::Bind(config.listen_address, e))?;

    let bound_addr = socket
        .local_addr()
        .map_err(|e| TransportError::BoundAddress(config.listen_address, e))?;

    socket
        .set_nonblocking(true)
        .map_err(TransportError::Nonblocking)?;

    let current_time = SystemTime::now().duration_since(UNIX_EPOCH).unwrap();

    let authentication = match config.private_key {
        Some(key) => ServerAuthentication::Secure { private_key: key },
        None => ServerAuthentication::Unsecure,
    };

    let server_config = ServerConfig {
        current_time,
        max_clients: config.max_clients,
        protocol_id: PROTOCOL_ID,
        public_addresses: vec![bound_addr],
        authentication,
    };

    let transport = NetcodeServerTransport::new(server_config, socket)
        .map_err(|e| TransportError::Netcode(e.to_string()))?;

    info!(
        "Transport bound to {bound_addr} (max {} clients, protocol {PROTOCOL_ID:016x})",
        config.max_clients
    );

    Ok(transport)
}

/// Packet pump pairing a RenetServer with its NetcodeServerTransport
pub struct ServerRunner {
    transport: NetcodeServerTransport,
}

impl ServerRunner {
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        let transport = create_server_transport(config)?;
        Ok(Self { transport })
    }

    /// One tick: pull packets off the wire, push queued packets out
    pub fn update(&mut self, renet_server: &mut RenetServer) {
        let current_time = SystemTime::now().duration_since(UNIX_EPOCH).unwrap();

        if let Err(e) = self.transport.update(current_time, renet_server) {
            error!("Transport update error: {e}");
        }

        self.transport.send_packets(renet_server);
    }

    /// The address the socket actually bound
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.addresses().first().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_transport_on_ephemeral_port() {
        let config = TransportConfig {
            listen_address: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };

        match create_server_transport(config) {
            Ok(_) => {}
            Err(TransportError::Bind(_, err))
                if err.kind() == std::io::ErrorKind::PermissionDenied =>
            {
                // Some sandboxed environments disallow socket binds.
            }
            Err(err) => panic!("transport error: {err:?}"),
        }
    }

    #[test]
    fn protocol_id_spells_the_handshake() {
        assert_eq!(&PROTOCOL_ID.to_be_bytes(), b"EMBRDLV1");
    }
}
