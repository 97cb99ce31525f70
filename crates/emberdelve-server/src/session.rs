//! The authoritative session: lobby, dungeon, and settling phases in one
//! state machine.
//!
//! The session owns no sockets. The main loop feeds it transport events
//! (`client_connected` / `client_disconnected` / `message_received` /
//! `tick`) and drains the encoded frames and kick requests it queues in
//! response, which keeps every rule testable without a network.

use std::time::Instant;

use emberdelve_core::{DungeonEngine, Outbound, MAX_HEALTH};
use emberdelve_protocol::{
    decode, encode, Envelope, MessageIds, Payload, PlayerId, ScoreEntry, KEEPALIVE_MESSAGE_ID,
};
use tracing::{debug, info, trace, warn};

use crate::channels::channel_id;
use crate::config::ServerConfig;
use crate::registry::{ConnectionRegistry, RegistryError};
use crate::scoreboard::{Scoreboard, SubmissionBatch};

/// Audience of one outbound frame
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendTo {
    One(u64),
    All,
}

/// An encoded frame waiting for the transport
#[derive(Clone, Debug)]
pub struct Outgoing {
    pub to: SendTo,
    pub channel: u8,
    pub bytes: Vec<u8>,
}

/// Which interpreter currently owns incoming messages.
///
/// Settling sits between a finished dungeon and the reopened lobby while
/// score submissions drain.
enum Phase {
    Lobby,
    Dungeon {
        engine: DungeonEngine,
    },
    Settling {
        scores: Vec<ScoreEntry>,
        batch: SubmissionBatch,
        deadline: Instant,
    },
}

pub struct Session {
    config: ServerConfig,
    registry: ConnectionRegistry,
    scoreboard: Option<Scoreboard>,
    ids: MessageIds,
    phase: Phase,
    outgoing: Vec<Outgoing>,
    kicks: Vec<u64>,
}

impl Session {
    pub fn new(config: ServerConfig, scoreboard: Option<Scoreboard>) -> Self {
        let registry = ConnectionRegistry::new(
            config.min_players_to_start as usize,
            config.max_connections as usize,
        );
        Self {
            config,
            registry,
            scoreboard,
            ids: MessageIds::new(),
            phase: Phase::Lobby,
            outgoing: Vec::new(),
            kicks: Vec::new(),
        }
    }

    /// Admits a connection or refuses it outright when full.
    ///
    /// On admission, existing connections hear about the (yet unnamed)
    /// newcomer first, then the newcomer receives the current roster and
    /// finally its own `Welcome`.
    pub fn client_connected(&mut self, client_id: u64) {
        let info = match self.registry.accept(client_id) {
            Ok(info) => info,
            Err(RegistryError::CapacityExceeded { capacity }) => {
                warn!("Refusing client {client_id}: all {capacity} slots taken");
                self.kicks.push(client_id);
                return;
            }
            Err(e) => {
                warn!("Refusing client {client_id}: {e}");
                self.kicks.push(client_id);
                return;
            }
        };
        info!("Client {client_id} admitted as player {}", info.player.0);

        let others: Vec<u64> = self
            .registry
            .iter()
            .map(|(id, _)| id)
            .filter(|&id| id != client_id)
            .collect();
        for other in others {
            self.send_to(
                other,
                Payload::NewPlayer {
                    player: info.player,
                    color: info.color,
                    name: String::new(),
                },
            );
        }

        let roster: Vec<Payload> = self
            .registry
            .iter()
            .filter(|(id, _)| *id != client_id)
            .map(|(_, existing)| Payload::NewPlayer {
                player: existing.player,
                color: existing.color,
                name: existing.name.clone(),
            })
            .collect();
        for payload in roster {
            self.send_to(client_id, payload);
        }

        self.send_to(
            client_id,
            Payload::Welcome {
                player: info.player,
                color: info.color,
            },
        );
    }

    /// Removes a connection and, mid-dungeon, lets the engine absorb the
    /// loss. A roster emptied by disconnects ends the game normally.
    pub fn client_disconnected(&mut self, client_id: u64) {
        let Some(info) = self.registry.remove(client_id) else {
            return;
        };
        info!("Client {client_id} (player {}) left", info.player.0);
        self.broadcast(Payload::PlayerLeft {
            player: info.player,
        });

        let mut engine_out = Vec::new();
        let mut game_over = false;
        if let Phase::Dungeon { engine } = &mut self.phase {
            engine_out = engine.handle_disconnect(info.player);
            game_over = engine.is_over();
        }
        self.deliver(engine_out);
        if game_over {
            self.enter_settling();
        }
    }

    /// Decodes and dispatches one client message. Undecodable input gets
    /// the connection dropped; the game must survive anything the wire
    /// carries.
    pub fn message_received(&mut self, client_id: u64, data: &[u8]) {
        let envelope = match decode(data) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Dropping client {client_id}: {e}");
                self.kicks.push(client_id);
                return;
            }
        };

        match &envelope.payload {
            Payload::None => {
                // Keep-alive probe; echo it so the client sees a live
                // server. Carries no game meaning in any phase.
                trace!("Keep-alive from client {client_id}");
                self.push_frame(
                    SendTo::One(client_id),
                    &Envelope::new(KEEPALIVE_MESSAGE_ID, Payload::None),
                );
            }
            Payload::SetName { name } => self.handle_set_name(client_id, name),
            request if request.kind().is_action_request() => {
                self.handle_action(client_id, envelope.id, request);
            }
            other => {
                debug!(
                    "Ignoring {:?} from client {client_id}; not a client-to-server message",
                    other.kind()
                );
            }
        }
    }

    /// Drives time-based work: settling deadlines. Call once per poll tick.
    pub fn tick(&mut self, now: Instant) {
        let settled = match &self.phase {
            Phase::Settling {
                batch, deadline, ..
            } => batch.is_settled() || now >= *deadline,
            _ => false,
        };
        if settled {
            self.finish_game();
        }
    }

    /// Encoded frames queued since the last drain.
    pub fn drain_outgoing(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.outgoing)
    }

    /// Connections the transport should disconnect.
    pub fn drain_kicks(&mut self) -> Vec<u64> {
        std::mem::take(&mut self.kicks)
    }

    fn handle_set_name(&mut self, client_id: u64, name: &str) {
        let info = match self.registry.set_name(client_id, name) {
            Ok(info) => info,
            Err(e) => {
                warn!("SetName rejected: {e}");
                return;
            }
        };
        info!("Player {} goes by \"{}\"", info.player.0, info.name);

        let announce = Payload::NewPlayer {
            player: info.player,
            color: info.color,
            name: info.name.clone(),
        };
        let others: Vec<u64> = self
            .registry
            .iter()
            .map(|(id, _)| id)
            .filter(|&id| id != client_id)
            .collect();
        for other in others {
            self.send_to(other, announce.clone());
        }

        // A completed name negotiation is what arms a game start; the gate
        // re-checks the whole lobby every time.
        if matches!(self.phase, Phase::Lobby) {
            self.maybe_start_game();
        }
    }

    fn handle_action(&mut self, client_id: u64, request_id: u32, request: &Payload) {
        let Some(player) = self.registry.get(client_id).map(|info| info.player) else {
            return;
        };
        let Phase::Dungeon { engine } = &mut self.phase else {
            // No dungeon to act in; the request can only be denied.
            debug!(
                "Denying {:?} from player {} outside the dungeon phase",
                request.kind(),
                player.0
            );
            self.send_to(
                client_id,
                Payload::RequestDenied {
                    denied_id: request_id,
                },
            );
            return;
        };

        let out = engine.handle_request(player, request_id, request);
        let game_over = engine.is_over();
        self.deliver(out);
        if game_over {
            self.enter_settling();
        }
    }

    fn maybe_start_game(&mut self) {
        if !self.registry.is_within_start_range() || !self.registry.all_named() {
            return;
        }

        let roster: Vec<PlayerId> = self.registry.iter().map(|(_, info)| info.player).collect();
        let seed = self.config.seed.unwrap_or_else(rand::random);
        info!(
            "Starting game: {} players, seed {seed:#018x}",
            roster.len()
        );

        self.broadcast(Payload::StartGame {
            start_health: MAX_HEALTH,
        });
        let (engine, opening) = DungeonEngine::new(&self.config.grid, seed, &roster);
        self.phase = Phase::Dungeon { engine };
        self.deliver(opening);
    }

    /// Leaves the dungeon phase: collect final scores, launch score
    /// submissions, and wait (bounded) for them before `EndGame` goes out.
    fn enter_settling(&mut self) {
        let scores = match &self.phase {
            Phase::Dungeon { engine } => engine.final_scores(),
            _ => return,
        };

        // The scoreboard keys on negotiated names; players who already
        // disconnected have no registry entry and nothing to submit.
        let entries: Vec<(String, u16)> = scores
            .iter()
            .filter_map(|entry| {
                self.registry
                    .name_of(entry.player)
                    .map(|name| (name.to_string(), entry.coins))
            })
            .collect();

        let (batch, deadline) = match &self.scoreboard {
            Some(scoreboard) if !entries.is_empty() => {
                info!("Submitting {} final scores", entries.len());
                let batch = scoreboard.submit(&entries);
                (batch, Instant::now() + scoreboard.settle_timeout())
            }
            _ => (SubmissionBatch::empty(), Instant::now()),
        };

        self.phase = Phase::Settling {
            scores,
            batch,
            deadline,
        };
    }

    fn finish_game(&mut self) {
        let Phase::Settling { scores, batch, .. } =
            std::mem::replace(&mut self.phase, Phase::Lobby)
        else {
            return;
        };
        if !batch.is_settled() {
            warn!(
                "{} score submissions still pending at the settle deadline",
                batch.len()
            );
        }
        info!(
            "Game over; lobby reopened with {} connections",
            self.registry.count()
        );
        self.broadcast(Payload::EndGame { scores });
    }

    fn deliver(&mut self, outbound: Vec<Outbound>) {
        for message in outbound {
            match message {
                Outbound::To(player, payload) => {
                    // Recipients can vanish between the engine step and
                    // delivery; skipping them is correct.
                    let Some(client_id) = self.registry.client_of(player) else {
                        continue;
                    };
                    self.send_to(client_id, payload);
                }
                Outbound::Broadcast(payload) => self.broadcast(payload),
            }
        }
    }

    fn send_to(&mut self, client_id: u64, payload: Payload) {
        let envelope = Envelope::new(self.ids.allocate(), payload);
        self.push_frame(SendTo::One(client_id), &envelope);
    }

    fn broadcast(&mut self, payload: Payload) {
        let envelope = Envelope::new(self.ids.allocate(), payload);
        self.push_frame(SendTo::All, &envelope);
    }

    fn push_frame(&mut self, to: SendTo, envelope: &Envelope) {
        let channel = if envelope.id == KEEPALIVE_MESSAGE_ID {
            channel_id::KEEPALIVE
        } else {
            channel_id::MESSAGES
        };
        match encode(envelope) {
            Ok(bytes) => self.outgoing.push(Outgoing { to, channel, bytes }),
            Err(e) => warn!(
                "Dropping unencodable {:?} frame: {e}",
                envelope.payload.kind()
            ),
        }
    }
}
