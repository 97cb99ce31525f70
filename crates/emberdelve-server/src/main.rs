//! Emberdelve Session Server
//!
//! Authoritative server for the turn-based dungeon crawl: lobby, dungeon,
//! and score settling over a single renet endpoint.

use std::time::{Duration, Instant};

use renet::{ConnectionConfig, RenetServer, ServerEvent};
use tracing::{info, warn};

use emberdelve_server::{
    channel_id, create_channel_configs,
    config::ServerConfig,
    scoreboard::Scoreboard,
    session::{SendTo, Session},
    ServerRunner, TransportConfig,
};

/// Server state
struct Server {
    /// Renet server
    renet: RenetServer,
    /// The session state machine fed by renet events
    session: Session,
}

impl Server {
    fn new(config: ServerConfig, scoreboard: Option<Scoreboard>) -> Self {
        let connection_config = ConnectionConfig {
            available_bytes_per_tick: 60_000,
            server_channels_config: create_channel_configs(),
            client_channels_config: create_channel_configs(),
        };

        let renet = RenetServer::new(connection_config);
        let session = Session::new(config, scoreboard);

        Self { renet, session }
    }

    /// Main server loop tick - runs between transport pumps
    fn update(&mut self) {
        // Process server events
        while let Some(event) = self.renet.get_event() {
            match event {
                ServerEvent::ClientConnected { client_id } => {
                    self.session.client_connected(client_id);
                }
                ServerEvent::ClientDisconnected { client_id, reason } => {
                    info!("Client {client_id} disconnected: {reason}");
                    self.session.client_disconnected(client_id);
                }
            }
        }

        // Process client messages from both channels
        for client_id in self.renet.clients_id() {
            while let Some(message) = self.renet.receive_message(client_id, channel_id::MESSAGES) {
                self.session.message_received(client_id, &message);
            }
            while let Some(message) = self.renet.receive_message(client_id, channel_id::KEEPALIVE)
            {
                self.session.message_received(client_id, &message);
            }
        }

        self.session.tick(Instant::now());

        // Flush queued frames
        for frame in self.session.drain_outgoing() {
            match frame.to {
                SendTo::One(client_id) => {
                    self.renet.send_message(client_id, frame.channel, frame.bytes);
                }
                SendTo::All => {
                    self.renet.broadcast_message(frame.channel, frame.bytes);
                }
            }
        }

        // Drop connections the session gave up on
        for client_id in self.session.drain_kicks() {
            self.renet.disconnect(client_id);
        }
    }

    /// Access to Renet server for transport integration
    fn renet_server(&mut self) -> &mut RenetServer {
        &mut self.renet
    }
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("emberdelve_server=info")
        .init();

    // Optional YAML config path as the only argument
    let config = match std::env::args().nth(1) {
        Some(path) => match ServerConfig::load(&path) {
            Ok(config) => {
                info!("Loaded configuration from {path}");
                config
            }
            Err(e) => {
                tracing::error!("Failed to load {path}: {e}");
                std::process::exit(1);
            }
        },
        None => ServerConfig::default(),
    };

    let scoreboard = match &config.score_service {
        Some(service) => match Scoreboard::new(service.clone()) {
            Ok(scoreboard) => {
                // Reachability probe; the game runs fine without the service.
                match scoreboard.fetch_top_scores() {
                    Ok(table) => info!("Score service reachable ({} rows)", table.len()),
                    Err(e) => warn!("Score service probe failed: {e}"),
                }
                Some(scoreboard)
            }
            Err(e) => {
                warn!("Score service disabled: {e}");
                None
            }
        },
        None => None,
    };

    // Create transport layer
    let transport_config = TransportConfig {
        listen_address: config.bind_address,
        max_clients: config.max_connections as usize,
        private_key: None, // Unsecure mode for development
    };

    let mut transport = match ServerRunner::new(transport_config) {
        Ok(t) => t,
        Err(e) => {
            tracing::error!("Failed to create transport: {e}");
            std::process::exit(1);
        }
    };

    info!("Emberdelve Server v{}", env!("CARGO_PKG_VERSION"));
    info!("Listening on {}", config.bind_address);
    info!("Protocol ID: {:016x}", emberdelve_server::PROTOCOL_ID);

    let mut server = Server::new(config, scoreboard);

    // Main server loop
    let tick_duration = Duration::from_millis(16); // ~60 Hz
    loop {
        let start = Instant::now();

        // Update transport (receive/send packets)
        transport.update(server.renet_server());

        // Update session logic
        server.update();

        let elapsed = start.elapsed();
        if let Some(sleep_time) = tick_duration.checked_sub(elapsed) {
            std::thread::sleep(sleep_time);
        }
    }
}
