//! Turn-based dungeon state machine.
//!
//! The engine owns the grid, every participant's record, and the turn
//! rotation. It consumes already-decoded action requests and yields
//! outbound messages for the session layer to deliver; it never touches a
//! socket and allocates no message ids of its own.

use std::collections::BTreeMap;

use emberdelve_protocol::{Direction, Payload, PlayerId, RoomView, ScoreEntry};

use crate::grid::{Grid, GridSettings};
use crate::rng::GameRng;

/// Health every player starts a game with.
pub const MAX_HEALTH: u16 = 10;
/// Health restored by a defend action.
pub const HEAL_POWER: u16 = 1;
/// Damage a player deals to a monster.
pub const ATTACK_DAMAGE: u16 = 1;
/// Damage a monster deals to an undefended player.
pub const ENEMY_ATTACK: u16 = 2;

/// A message the engine wants delivered, tagged with its audience.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// To one player's connection.
    To(PlayerId, Payload),
    /// To every connection in the session.
    Broadcast(Payload),
}

/// Why a participant is no longer part of the turn rotation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Fate {
    Delving,
    Escaped,
    Slain,
}

/// Everything the game tracks about one participant, in one place.
#[derive(Clone, Debug)]
struct PlayerRecord {
    position: (u32, u32),
    health: u16,
    defending: bool,
    coins: u16,
    fate: Fate,
}

pub struct DungeonEngine {
    grid: Grid,
    /// One record per participant. Escaped and slain players keep their
    /// record (the coins are their score); a disconnect deletes it.
    records: BTreeMap<PlayerId, PlayerRecord>,
    /// Active rotation, in accept order.
    roster: Vec<PlayerId>,
    /// Index into `roster` of the current turn owner.
    cursor: usize,
}

impl DungeonEngine {
    /// Builds the dungeon and seats `players` (accept order) at random
    /// positions with full health, zero coins, and the defend flag raised
    /// so nobody is mauled before their first turn. Returns the engine and
    /// the opening messages: each player's starting `RoomInfo` and the
    /// first `PlayerTurn` broadcast.
    pub fn new(
        settings: &GridSettings,
        seed: u64,
        players: &[PlayerId],
    ) -> (DungeonEngine, Vec<Outbound>) {
        let mut rng = GameRng::seed_from_u64(seed);
        let grid = Grid::generate_with(settings, &mut rng);

        let mut records = BTreeMap::new();
        let mut roster = Vec::with_capacity(players.len());
        for &player in players {
            let x = rng.gen_index(grid.width() as usize) as u32;
            let y = rng.gen_index(grid.height() as usize) as u32;
            records.insert(
                player,
                PlayerRecord {
                    position: (x, y),
                    health: MAX_HEALTH,
                    defending: true,
                    coins: 0,
                    fate: Fate::Delving,
                },
            );
            roster.push(player);
        }
        let cursor = if roster.is_empty() {
            0
        } else {
            rng.gen_index(roster.len())
        };

        let engine = DungeonEngine {
            grid,
            records,
            roster,
            cursor,
        };

        let mut out = Vec::new();
        for &player in &engine.roster {
            if let Some(info) = engine.room_info(player) {
                out.push(Outbound::To(player, info));
            }
        }
        if let Some(current) = engine.current_player() {
            out.push(Outbound::Broadcast(Payload::PlayerTurn { player: current }));
        }
        (engine, out)
    }

    /// Applies one action request from `player`.
    ///
    /// `request_id` is echoed back in `RequestDenied` when a precondition
    /// fails. A request from anyone but the current turn owner is denied
    /// without touching game state.
    pub fn handle_request(
        &mut self,
        player: PlayerId,
        request_id: u32,
        payload: &Payload,
    ) -> Vec<Outbound> {
        if self.current_player() != Some(player) {
            return self.deny(player, request_id);
        }
        match payload {
            Payload::MoveRequest { direction } => self.handle_move(player, request_id, *direction),
            Payload::AttackRequest => self.handle_attack(player, request_id),
            Payload::DefendRequest => self.handle_defend(player, request_id),
            Payload::ClaimTreasureRequest => self.handle_claim_treasure(player, request_id),
            Payload::LeaveDungeonRequest => self.handle_leave(player, request_id),
            _ => Vec::new(),
        }
    }

    /// Handles a mid-game disconnect. The record goes away entirely, coins
    /// included; if it was that player's turn the rotation force-advances.
    pub fn handle_disconnect(&mut self, player: PlayerId) -> Vec<Outbound> {
        self.records.remove(&player);
        let was_current = self.current_player() == Some(player);
        if self.remove_from_roster(player).is_none() {
            return Vec::new();
        }
        if was_current && !self.roster.is_empty() {
            return self.advance_turn();
        }
        Vec::new()
    }

    /// The rotation is empty: everyone has died, escaped, or disconnected.
    pub fn is_over(&self) -> bool {
        self.roster.is_empty()
    }

    /// Final `(player, coins)` pairs for every participant still holding a
    /// record, in id order.
    pub fn final_scores(&self) -> Vec<ScoreEntry> {
        self.records
            .iter()
            .map(|(&player, record)| ScoreEntry {
                player,
                coins: record.coins,
            })
            .collect()
    }

    pub fn current_player(&self) -> Option<PlayerId> {
        self.roster.get(self.cursor).copied()
    }

    pub fn roster(&self) -> &[PlayerId] {
        &self.roster
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn position(&self, player: PlayerId) -> Option<(u32, u32)> {
        self.records.get(&player).map(|r| r.position)
    }

    pub fn health(&self, player: PlayerId) -> Option<u16> {
        self.records.get(&player).map(|r| r.health)
    }

    pub fn coins(&self, player: PlayerId) -> Option<u16> {
        self.records.get(&player).map(|r| r.coins)
    }

    pub fn is_defending(&self, player: PlayerId) -> Option<bool> {
        self.records.get(&player).map(|r| r.defending)
    }

    fn deny(&self, player: PlayerId, request_id: u32) -> Vec<Outbound> {
        vec![Outbound::To(
            player,
            Payload::RequestDenied {
                denied_id: request_id,
            },
        )]
    }

    fn handle_move(
        &mut self,
        player: PlayerId,
        request_id: u32,
        direction: Direction,
    ) -> Vec<Outbound> {
        let Some(record) = self.records.get(&player) else {
            return Vec::new();
        };
        let (x, y) = record.position;
        let (dx, dy) = direction.offset();
        let (nx, ny) = (x as i32 + dx, y as i32 + dy);
        if !self.grid.in_bounds(nx, ny) {
            return self.deny(player, request_id);
        }
        let destination = (nx as u32, ny as u32);

        let old_room = self.occupants_of_room((x, y), Some(player));
        let new_room = self.occupants_of_room(destination, Some(player));
        if let Some(record) = self.records.get_mut(&player) {
            record.position = destination;
        }

        let mut out = Vec::new();
        for other in old_room {
            out.push(Outbound::To(other, Payload::PlayerLeaveRoom { player }));
        }
        if let Some(info) = self.room_info(player) {
            out.push(Outbound::To(player, info));
        }
        for other in new_room {
            out.push(Outbound::To(other, Payload::PlayerEnterRoom { player }));
        }
        out.extend(self.advance_turn());
        out
    }

    fn handle_attack(&mut self, player: PlayerId, request_id: u32) -> Vec<Outbound> {
        let Some(record) = self.records.get(&player) else {
            return Vec::new();
        };
        let (x, y) = record.position;
        if !self.grid.room(x, y).has_live_monster() {
            return self.deny(player, request_id);
        }
        let room = self.grid.room_mut(x, y);
        room.monster_health = room.monster_health.saturating_sub(ATTACK_DAMAGE);

        let mut out = vec![Outbound::Broadcast(Payload::HitMonster {
            player,
            damage: ATTACK_DAMAGE,
        })];
        out.extend(self.advance_turn());
        out
    }

    fn handle_defend(&mut self, player: PlayerId, request_id: u32) -> Vec<Outbound> {
        let Some(record) = self.records.get(&player) else {
            return Vec::new();
        };
        let (x, y) = record.position;
        if !self.grid.room(x, y).has_live_monster() {
            return self.deny(player, request_id);
        }
        let health = {
            let Some(record) = self.records.get_mut(&player) else {
                return Vec::new();
            };
            record.defending = true;
            record.health = record.health.saturating_add(HEAL_POWER).min(MAX_HEALTH);
            record.health
        };

        // Other active players hear about the defend; the requester already
        // knows what they asked for.
        let mut out: Vec<Outbound> = self
            .roster
            .iter()
            .copied()
            .filter(|&other| other != player)
            .map(|other| Outbound::To(other, Payload::PlayerDefends { player, health }))
            .collect();
        out.extend(self.advance_turn());
        out
    }

    fn handle_claim_treasure(&mut self, player: PlayerId, request_id: u32) -> Vec<Outbound> {
        let Some(record) = self.records.get(&player) else {
            return Vec::new();
        };
        let position = record.position;
        let value = self.grid.room(position.0, position.1).treasure_value;
        if value == 0 {
            return self.deny(player, request_id);
        }

        // Everyone in the room shares, requester included; the integer
        // remainder is lost, not banked.
        let sharers = self.occupants_of_room(position, None);
        let share = value / sharers.len() as u16;

        let mut out = Vec::new();
        for &id in &sharers {
            if let Some(record) = self.records.get_mut(&id) {
                record.coins = record.coins.saturating_add(share);
            }
            out.push(Outbound::To(id, Payload::ObtainTreasure { amount: share }));
        }
        self.grid.room_mut(position.0, position.1).treasure_value = 0;
        out.extend(self.advance_turn());
        out
    }

    fn handle_leave(&mut self, player: PlayerId, request_id: u32) -> Vec<Outbound> {
        let Some(record) = self.records.get(&player) else {
            return Vec::new();
        };
        let (x, y) = record.position;
        if !self.grid.room(x, y).has_exit {
            return self.deny(player, request_id);
        }

        let mut out = vec![Outbound::Broadcast(Payload::PlayerLeftDungeon { player })];
        if let Some(record) = self.records.get_mut(&player) {
            record.fate = Fate::Escaped;
        }
        self.remove_from_roster(player);
        if !self.roster.is_empty() {
            out.extend(self.advance_turn());
        }
        out
    }

    /// Moves the turn to the next active player (wrapping), resolving the
    /// monster attack against whoever the cursor lands on. A player slain
    /// by that attack is removed and the advance re-enters to skip past
    /// them; a surviving player's defend flag clears before their turn is
    /// announced.
    fn advance_turn(&mut self) -> Vec<Outbound> {
        let mut out = Vec::new();
        loop {
            if self.roster.is_empty() {
                return out;
            }
            self.cursor = (self.cursor + 1) % self.roster.len();
            let current = self.roster[self.cursor];

            let monster_present = self
                .records
                .get(&current)
                .map(|r| r.position)
                .is_some_and(|(x, y)| self.grid.room(x, y).has_live_monster());

            if monster_present {
                let (health, died) = {
                    let Some(record) = self.records.get_mut(&current) else {
                        return out;
                    };
                    let damage = if record.defending { 0 } else { ENEMY_ATTACK };
                    record.health = record.health.saturating_sub(damage);
                    if record.health == 0 {
                        record.fate = Fate::Slain;
                    }
                    (record.health, record.health == 0)
                };
                out.push(Outbound::Broadcast(Payload::HitByMonster {
                    player: current,
                    health,
                }));
                if died {
                    out.push(Outbound::Broadcast(Payload::PlayerDies { player: current }));
                    self.remove_from_roster(current);
                    continue;
                }
            }

            if let Some(record) = self.records.get_mut(&current) {
                record.defending = false;
            }
            out.push(Outbound::Broadcast(Payload::PlayerTurn { player: current }));
            return out;
        }
    }

    /// Removes `player` from the rotation, keeping the pre-removal "next"
    /// player next: indices at or before the cursor shift down by one.
    fn remove_from_roster(&mut self, player: PlayerId) -> Option<usize> {
        let index = self.roster.iter().position(|&p| p == player)?;
        self.roster.remove(index);
        if index <= self.cursor {
            self.cursor = if self.cursor == 0 {
                self.roster.len().saturating_sub(1)
            } else {
                self.cursor - 1
            };
        }
        Some(index)
    }

    fn occupants_of_room(&self, position: (u32, u32), exclude: Option<PlayerId>) -> Vec<PlayerId> {
        self.roster
            .iter()
            .copied()
            .filter(|&id| Some(id) != exclude)
            .filter(|id| {
                self.records
                    .get(id)
                    .is_some_and(|r| r.position == position)
            })
            .collect()
    }

    /// Fresh view of the room `player` stands in: open directions, contents,
    /// and the other active players there. Players never see other rooms.
    fn room_info(&self, player: PlayerId) -> Option<Payload> {
        let record = self.records.get(&player)?;
        let (x, y) = record.position;
        let room = self.grid.room(x, y);
        Some(Payload::RoomInfo {
            room: RoomView {
                directions: self.grid.open_directions(x, y),
                treasure: room.treasure_value,
                monster: room.has_live_monster(),
                exit: room.has_exit,
                occupants: self.occupants_of_room((x, y), Some(player)),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Room;

    fn make_players(count: usize) -> Vec<PlayerId> {
        (0..count).map(|i| PlayerId(i as i32)).collect()
    }

    fn blank_rooms(width: u32, height: u32) -> Vec<Room> {
        vec![Room::default(); (width * height) as usize]
    }

    /// Engine with everyone at (0,0), full health, not defending, cursor 0.
    fn engine_on(grid: Grid, players: &[PlayerId]) -> DungeonEngine {
        let records = players
            .iter()
            .map(|&id| {
                (
                    id,
                    PlayerRecord {
                        position: (0, 0),
                        health: MAX_HEALTH,
                        defending: false,
                        coins: 0,
                        fate: Fate::Delving,
                    },
                )
            })
            .collect();
        DungeonEngine {
            grid,
            records,
            roster: players.to_vec(),
            cursor: 0,
        }
    }

    fn place(engine: &mut DungeonEngine, player: PlayerId, position: (u32, u32)) {
        engine.records.get_mut(&player).unwrap().position = position;
    }

    #[test]
    fn new_engine_deals_room_info_then_first_turn() {
        let players = make_players(3);
        let (engine, out) = DungeonEngine::new(&GridSettings::default(), 4, &players);

        let infos = out
            .iter()
            .filter(|o| matches!(o, Outbound::To(_, Payload::RoomInfo { .. })))
            .count();
        assert_eq!(infos, 3);
        match out.last() {
            Some(Outbound::Broadcast(Payload::PlayerTurn { player })) => {
                assert_eq!(Some(*player), engine.current_player());
            }
            other => panic!("expected PlayerTurn broadcast, got {other:?}"),
        }
        assert!(players
            .iter()
            .all(|&p| engine.health(p) == Some(MAX_HEALTH)));
        assert!(players.iter().all(|&p| engine.is_defending(p) == Some(true)));
    }

    #[test]
    fn out_of_bounds_move_is_denied_without_mutation() {
        let players = make_players(2);
        let grid = Grid::from_rooms(1, 1, blank_rooms(1, 1));
        let mut engine = engine_on(grid, &players);

        for direction in Direction::ALL {
            let out = engine.handle_request(
                players[0],
                41,
                &Payload::MoveRequest { direction },
            );
            assert_eq!(
                out,
                vec![Outbound::To(
                    players[0],
                    Payload::RequestDenied { denied_id: 41 }
                )]
            );
        }
        assert_eq!(engine.position(players[0]), Some((0, 0)));
        assert_eq!(engine.current_player(), Some(players[0]));
    }

    #[test]
    fn move_notifies_rooms_in_order_and_advances() {
        let players = make_players(3);
        let grid = Grid::from_rooms(2, 1, blank_rooms(2, 1));
        let mut engine = engine_on(grid, &players);
        place(&mut engine, players[2], (1, 0));

        let out = engine.handle_request(
            players[0],
            1,
            &Payload::MoveRequest {
                direction: Direction::East,
            },
        );

        // Old-room occupant hears the departure, the mover gets a fresh
        // view, the new-room occupant hears the arrival, then the turn
        // advances.
        assert_eq!(
            out[0],
            Outbound::To(players[1], Payload::PlayerLeaveRoom { player: players[0] })
        );
        match &out[1] {
            Outbound::To(to, Payload::RoomInfo { room }) => {
                assert_eq!(*to, players[0]);
                assert_eq!(room.occupants, vec![players[2]]);
                assert!(room.directions.contains(Direction::West));
                assert!(!room.directions.contains(Direction::East));
            }
            other => panic!("expected RoomInfo, got {other:?}"),
        }
        assert_eq!(
            out[2],
            Outbound::To(players[2], Payload::PlayerEnterRoom { player: players[0] })
        );
        assert_eq!(
            out[3],
            Outbound::Broadcast(Payload::PlayerTurn { player: players[1] })
        );
        assert_eq!(engine.position(players[0]), Some((1, 0)));
    }

    #[test]
    fn request_from_non_owner_is_denied_and_mutates_nothing() {
        let players = make_players(2);
        let mut rooms = blank_rooms(2, 1);
        rooms[1].treasure_value = 40;
        let grid = Grid::from_rooms(2, 1, rooms);
        let mut engine = engine_on(grid, &players);
        place(&mut engine, players[1], (1, 0));

        let out = engine.handle_request(players[1], 9, &Payload::ClaimTreasureRequest);
        assert_eq!(
            out,
            vec![Outbound::To(
                players[1],
                Payload::RequestDenied { denied_id: 9 }
            )]
        );
        assert_eq!(engine.coins(players[1]), Some(0));
        assert_eq!(engine.grid.room(1, 0).treasure_value, 40);
        assert_eq!(engine.current_player(), Some(players[0]));
    }

    #[test]
    fn attack_chips_monster_and_broadcasts() {
        let players = make_players(2);
        let mut rooms = blank_rooms(1, 1);
        rooms[0].monster_health = 3;
        let grid = Grid::from_rooms(1, 1, rooms);
        let mut engine = engine_on(grid, &players);

        let out = engine.handle_request(players[0], 2, &Payload::AttackRequest);
        assert_eq!(engine.grid.room(0, 0).monster_health, 3 - ATTACK_DAMAGE);
        assert_eq!(
            out[0],
            Outbound::Broadcast(Payload::HitMonster {
                player: players[0],
                damage: ATTACK_DAMAGE,
            })
        );
        // The monster then mauls the incoming player before their turn.
        assert_eq!(
            out[1],
            Outbound::Broadcast(Payload::HitByMonster {
                player: players[1],
                health: MAX_HEALTH - ENEMY_ATTACK,
            })
        );
        assert_eq!(
            out[2],
            Outbound::Broadcast(Payload::PlayerTurn { player: players[1] })
        );
    }

    #[test]
    fn attack_without_monster_is_denied() {
        let players = make_players(1);
        let grid = Grid::from_rooms(1, 1, blank_rooms(1, 1));
        let mut engine = engine_on(grid, &players);

        let out = engine.handle_request(players[0], 5, &Payload::AttackRequest);
        assert_eq!(
            out,
            vec![Outbound::To(
                players[0],
                Payload::RequestDenied { denied_id: 5 }
            )]
        );
    }

    #[test]
    fn defend_heals_capped_and_tells_other_players_only() {
        let players = make_players(3);
        let mut rooms = blank_rooms(2, 1);
        rooms[0].monster_health = 5;
        let grid = Grid::from_rooms(2, 1, rooms);
        let mut engine = engine_on(grid, &players);
        place(&mut engine, players[1], (1, 0));
        place(&mut engine, players[2], (1, 0));
        engine.records.get_mut(&players[0]).unwrap().health = 7;

        let out = engine.handle_request(players[0], 3, &Payload::DefendRequest);

        assert_eq!(engine.health(players[0]), Some(7 + HEAL_POWER));
        assert_eq!(engine.is_defending(players[0]), Some(true));
        let defends: Vec<_> = out
            .iter()
            .filter_map(|o| match o {
                Outbound::To(to, Payload::PlayerDefends { player, health }) => {
                    Some((*to, *player, *health))
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            defends,
            vec![
                (players[1], players[0], 8),
                (players[2], players[0], 8),
            ]
        );
    }

    #[test]
    fn defend_heal_caps_at_max_health() {
        let players = make_players(1);
        let mut rooms = blank_rooms(1, 1);
        rooms[0].monster_health = 5;
        let grid = Grid::from_rooms(1, 1, rooms);
        let mut engine = engine_on(grid, &players);

        engine.handle_request(players[0], 1, &Payload::DefendRequest);
        assert_eq!(engine.health(players[0]), Some(MAX_HEALTH));
    }

    #[test]
    fn treasure_splits_evenly_with_remainder_lost() {
        let players = make_players(3);
        let mut rooms = blank_rooms(2, 1);
        rooms[0].treasure_value = 7;
        let grid = Grid::from_rooms(2, 1, rooms);
        let mut engine = engine_on(grid, &players);
        place(&mut engine, players[2], (1, 0));

        let out = engine.handle_request(players[0], 6, &Payload::ClaimTreasureRequest);

        // 7 split between the two players in the room: 3 each, 1 lost.
        assert_eq!(engine.coins(players[0]), Some(3));
        assert_eq!(engine.coins(players[1]), Some(3));
        assert_eq!(engine.coins(players[2]), Some(0));
        assert_eq!(engine.grid.room(0, 0).treasure_value, 0);

        let grants = out
            .iter()
            .filter(|o| matches!(o, Outbound::To(_, Payload::ObtainTreasure { amount: 3 })))
            .count();
        assert_eq!(grants, 2);
    }

    #[test]
    fn claim_without_treasure_is_denied() {
        let players = make_players(1);
        let grid = Grid::from_rooms(1, 1, blank_rooms(1, 1));
        let mut engine = engine_on(grid, &players);

        let out = engine.handle_request(players[0], 8, &Payload::ClaimTreasureRequest);
        assert_eq!(
            out,
            vec![Outbound::To(
                players[0],
                Payload::RequestDenied { denied_id: 8 }
            )]
        );
    }

    #[test]
    fn leaving_needs_the_exit() {
        let players = make_players(2);
        let mut rooms = blank_rooms(2, 1);
        rooms[1].has_exit = true;
        let grid = Grid::from_rooms(2, 1, rooms);
        let mut engine = engine_on(grid, &players);

        let denied = engine.handle_request(players[0], 10, &Payload::LeaveDungeonRequest);
        assert!(matches!(
            denied[0],
            Outbound::To(_, Payload::RequestDenied { denied_id: 10 })
        ));

        place(&mut engine, players[0], (1, 0));
        let out = engine.handle_request(players[0], 11, &Payload::LeaveDungeonRequest);
        assert_eq!(
            out[0],
            Outbound::Broadcast(Payload::PlayerLeftDungeon { player: players[0] })
        );
        assert_eq!(engine.roster(), &players[1..]);
        assert!(!engine.is_over());
    }

    #[test]
    fn last_escape_ends_the_game_with_scores() {
        let players = make_players(2);
        let mut rooms = blank_rooms(1, 1);
        rooms[0].has_exit = true;
        let grid = Grid::from_rooms(1, 1, rooms);
        let mut engine = engine_on(grid, &players);
        engine.records.get_mut(&players[0]).unwrap().coins = 30;

        engine.handle_request(players[0], 1, &Payload::LeaveDungeonRequest);
        engine.handle_request(players[1], 2, &Payload::LeaveDungeonRequest);

        assert!(engine.is_over());
        let scores = engine.final_scores();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].player, players[0]);
        assert_eq!(scores[0].coins, 30);
        assert_eq!(scores[1].coins, 0);
    }

    #[test]
    fn monster_mauls_undefended_incoming_player() {
        let players = make_players(2);
        let mut rooms = blank_rooms(2, 1);
        rooms[1].monster_health = 4;
        let grid = Grid::from_rooms(2, 1, rooms);
        let mut engine = engine_on(grid, &players);
        place(&mut engine, players[1], (1, 0));

        let out = engine.advance_turn();
        assert_eq!(
            out,
            vec![
                Outbound::Broadcast(Payload::HitByMonster {
                    player: players[1],
                    health: MAX_HEALTH - ENEMY_ATTACK,
                }),
                Outbound::Broadcast(Payload::PlayerTurn { player: players[1] }),
            ]
        );
        assert_eq!(engine.health(players[1]), Some(MAX_HEALTH - ENEMY_ATTACK));
    }

    #[test]
    fn defending_player_takes_zero_damage_then_flag_resets() {
        let players = make_players(2);
        let mut rooms = blank_rooms(2, 1);
        rooms[1].monster_health = 4;
        let grid = Grid::from_rooms(2, 1, rooms);
        let mut engine = engine_on(grid, &players);
        place(&mut engine, players[1], (1, 0));
        engine.records.get_mut(&players[1]).unwrap().defending = true;

        let out = engine.advance_turn();
        // The monster still swings; the defend soaks it, then expires.
        assert_eq!(
            out[0],
            Outbound::Broadcast(Payload::HitByMonster {
                player: players[1],
                health: MAX_HEALTH,
            })
        );
        assert_eq!(engine.health(players[1]), Some(MAX_HEALTH));
        assert_eq!(engine.is_defending(players[1]), Some(false));
    }

    #[test]
    fn lethal_monster_attack_removes_player_and_skips_onward() {
        let players = make_players(3);
        let mut rooms = blank_rooms(2, 1);
        rooms[1].monster_health = 4;
        let grid = Grid::from_rooms(2, 1, rooms);
        let mut engine = engine_on(grid, &players);
        place(&mut engine, players[1], (1, 0));
        engine.records.get_mut(&players[1]).unwrap().health = ENEMY_ATTACK;

        let out = engine.advance_turn();
        assert_eq!(
            out,
            vec![
                Outbound::Broadcast(Payload::HitByMonster {
                    player: players[1],
                    health: 0,
                }),
                Outbound::Broadcast(Payload::PlayerDies { player: players[1] }),
                Outbound::Broadcast(Payload::PlayerTurn { player: players[2] }),
            ]
        );
        assert_eq!(engine.roster(), &[players[0], players[2]]);
        // The slain player's coins still count at the end.
        assert_eq!(engine.final_scores().len(), 3);
    }

    #[test]
    fn death_chain_can_empty_the_roster() {
        let players = make_players(2);
        let mut rooms = blank_rooms(1, 1);
        rooms[0].monster_health = 9;
        let grid = Grid::from_rooms(1, 1, rooms);
        let mut engine = engine_on(grid, &players);
        engine.records.get_mut(&players[0]).unwrap().health = 1;
        engine.records.get_mut(&players[1]).unwrap().health = 1;

        let out = engine.advance_turn();
        assert!(engine.is_over());
        let deaths = out
            .iter()
            .filter(|o| matches!(o, Outbound::Broadcast(Payload::PlayerDies { .. })))
            .count();
        assert_eq!(deaths, 2);
        assert!(!out
            .iter()
            .any(|o| matches!(o, Outbound::Broadcast(Payload::PlayerTurn { .. }))));
    }

    #[test]
    fn removal_before_cursor_keeps_current_player_current() {
        let players = make_players(3);
        let grid = Grid::from_rooms(2, 1, blank_rooms(2, 1));
        let mut engine = engine_on(grid, &players);
        engine.cursor = 2; // players[2] to act

        engine.handle_disconnect(players[0]);
        assert_eq!(engine.current_player(), Some(players[2]));

        // Next in rotation after the shrink is players[1].
        let out = engine.advance_turn();
        assert_eq!(
            out,
            vec![Outbound::Broadcast(Payload::PlayerTurn { player: players[1] })]
        );
    }

    #[test]
    fn removal_after_cursor_leaves_rotation_alone() {
        let players = make_players(3);
        let grid = Grid::from_rooms(2, 1, blank_rooms(2, 1));
        let mut engine = engine_on(grid, &players);

        engine.handle_disconnect(players[2]);
        assert_eq!(engine.current_player(), Some(players[0]));
        let out = engine.advance_turn();
        assert_eq!(
            out,
            vec![Outbound::Broadcast(Payload::PlayerTurn { player: players[1] })]
        );
    }

    #[test]
    fn disconnect_of_current_player_force_advances() {
        let players = make_players(3);
        let grid = Grid::from_rooms(2, 1, blank_rooms(2, 1));
        let mut engine = engine_on(grid, &players);

        let out = engine.handle_disconnect(players[0]);
        assert_eq!(
            out,
            vec![Outbound::Broadcast(Payload::PlayerTurn { player: players[1] })]
        );
        assert_eq!(engine.current_player(), Some(players[1]));
    }

    #[test]
    fn disconnect_discards_coins_from_scoring() {
        let players = make_players(2);
        let grid = Grid::from_rooms(2, 1, blank_rooms(2, 1));
        let mut engine = engine_on(grid, &players);
        engine.records.get_mut(&players[1]).unwrap().coins = 99;

        engine.handle_disconnect(players[1]);
        let scores = engine.final_scores();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].player, players[0]);
    }

    #[test]
    fn rotation_stays_valid_across_many_removals() {
        let players = make_players(6);
        let grid = Grid::from_rooms(3, 1, blank_rooms(3, 1));
        let mut engine = engine_on(grid, &players);
        engine.cursor = 3;

        for &leaver in &[players[5], players[0], players[3], players[2], players[4]] {
            engine.handle_disconnect(leaver);
            if let Some(current) = engine.current_player() {
                assert!(engine.roster().contains(&current));
            } else {
                assert!(engine.is_over());
            }
        }
        assert_eq!(engine.roster(), &[players[1]]);
    }
}
