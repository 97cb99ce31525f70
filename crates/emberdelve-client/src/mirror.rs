//! Client-side mirror of the session state.
//!
//! The mirror owns no sockets. [`ClientNet`](crate::ClientNet) (or a test)
//! feeds it decoded envelopes and sends whatever reply payloads it returns.
//! It tracks server-confirmed state only: nothing here predicts an outcome,
//! every action is a request awaiting the server's verdict. The cached view
//! exists so obviously doomed requests are refused locally before they
//! spend a round trip.

use std::collections::BTreeMap;

use emberdelve_protocol::{
    Direction, Envelope, Payload, PlayerColor, PlayerId, RoomView, ScoreEntry,
};
use tracing::debug;

/// Roster entry for one known player, self included.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlayerView {
    pub name: String,
    pub color: PlayerColor,
}

/// One of the five in-dungeon actions a player can take on their turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayerAction {
    Move(Direction),
    Attack,
    Defend,
    ClaimTreasure,
    LeaveDungeon,
}

impl PlayerAction {
    /// The request payload this action puts on the wire.
    pub fn payload(self) -> Payload {
        match self {
            PlayerAction::Move(direction) => Payload::MoveRequest { direction },
            PlayerAction::Attack => Payload::AttackRequest,
            PlayerAction::Defend => Payload::DefendRequest,
            PlayerAction::ClaimTreasure => Payload::ClaimTreasureRequest,
            PlayerAction::LeaveDungeon => Payload::LeaveDungeonRequest,
        }
    }
}

/// Why an action was refused locally, before reaching the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("no game is running")]
    NotInGame,
    #[error("not this player's turn")]
    NotMyTurn,
    #[error("no room view received yet")]
    NoRoomView,
    #[error("a live monster blocks the way")]
    MonsterInTheWay,
    #[error("no open passage to the {0:?}")]
    DirectionClosed(Direction),
    #[error("nothing here to attack")]
    NoMonster,
    #[error("no treasure in this room")]
    NoTreasure,
    #[error("this room has no exit")]
    NoExit,
}

/// Pure state machine mirroring what the server has confirmed.
///
/// `PlayerTurn` is the only message that moves the turn flag; sending a
/// request leaves it untouched and a `RequestDenied` is a state no-op, so
/// a denied player can always correct and retry.
pub struct SessionMirror {
    /// Name offered to the server in reply to `Welcome`.
    name: String,
    my_id: Option<PlayerId>,
    my_color: Option<PlayerColor>,
    players: BTreeMap<PlayerId, PlayerView>,
    in_game: bool,
    my_turn: bool,
    /// Latest room snapshot, patched by enter/leave broadcasts in between.
    room: Option<RoomView>,
    health: u16,
    coins: u16,
    scores: Vec<ScoreEntry>,
    last_denied: Option<u32>,
}

impl SessionMirror {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            my_id: None,
            my_color: None,
            players: BTreeMap::new(),
            in_game: false,
            my_turn: false,
            room: None,
            health: 0,
            coins: 0,
            scores: Vec::new(),
            last_denied: None,
        }
    }

    /// Applies one decoded envelope and returns the payloads to send back.
    pub fn handle_message(&mut self, envelope: &Envelope) -> Vec<Payload> {
        match &envelope.payload {
            Payload::None => Vec::new(),
            Payload::Welcome { player, color } => {
                self.my_id = Some(*player);
                self.my_color = Some(*color);
                self.players.insert(
                    *player,
                    PlayerView {
                        name: self.name.clone(),
                        color: *color,
                    },
                );
                vec![Payload::SetName {
                    name: self.name.clone(),
                }]
            }
            Payload::NewPlayer {
                player,
                color,
                name,
            } => {
                // Covers both the unnamed announce and the rename rebroadcast.
                self.players.insert(
                    *player,
                    PlayerView {
                        name: name.clone(),
                        color: *color,
                    },
                );
                Vec::new()
            }
            Payload::PlayerLeft { player } => {
                self.players.remove(player);
                self.drop_occupant(*player);
                Vec::new()
            }
            Payload::StartGame { start_health } => {
                self.in_game = true;
                self.my_turn = false;
                self.room = None;
                self.health = *start_health;
                self.coins = 0;
                self.scores.clear();
                Vec::new()
            }
            Payload::PlayerTurn { player } => {
                self.my_turn = self.my_id == Some(*player);
                Vec::new()
            }
            Payload::RoomInfo { room } => {
                self.room = Some(room.clone());
                Vec::new()
            }
            Payload::PlayerEnterRoom { player } => {
                if let Some(view) = &mut self.room {
                    if !view.occupants.contains(player) {
                        view.occupants.push(*player);
                    }
                }
                Vec::new()
            }
            Payload::PlayerLeaveRoom { player } => {
                self.drop_occupant(*player);
                Vec::new()
            }
            Payload::ObtainTreasure { amount } => {
                self.coins = self.coins.saturating_add(*amount);
                // The claim emptied the room for everyone who shared.
                if let Some(view) = &mut self.room {
                    view.treasure = 0;
                }
                Vec::new()
            }
            // Carries damage dealt, not remaining health; whether the
            // monster died is only learned from the next RoomInfo.
            Payload::HitMonster { .. } => Vec::new(),
            Payload::HitByMonster { player, health } => {
                if self.my_id == Some(*player) {
                    self.health = *health;
                }
                Vec::new()
            }
            Payload::PlayerDefends { player, health } => {
                if self.my_id == Some(*player) {
                    self.health = *health;
                }
                Vec::new()
            }
            Payload::PlayerLeftDungeon { player } | Payload::PlayerDies { player } => {
                self.drop_occupant(*player);
                if self.my_id == Some(*player) {
                    self.in_game = false;
                    self.my_turn = false;
                    self.room = None;
                }
                Vec::new()
            }
            Payload::EndGame { scores } => {
                self.in_game = false;
                self.my_turn = false;
                self.room = None;
                self.scores = scores.clone();
                self.scores
                    .sort_by(|a, b| b.coins.cmp(&a.coins).then(a.player.cmp(&b.player)));
                Vec::new()
            }
            Payload::RequestDenied { denied_id } => {
                // UI feedback only; turn state is never re-derived from it.
                self.last_denied = Some(*denied_id);
                Vec::new()
            }
            other => {
                debug!(kind = ?other.kind(), "ignoring client-bound payload");
                Vec::new()
            }
        }
    }

    /// Checks `action` against the cached view and hands back its payload.
    ///
    /// The server stays authoritative: a stale cache can still earn a
    /// `RequestDenied`, this only filters the requests that cannot work.
    pub fn request(&self, action: PlayerAction) -> Result<Payload, ActionError> {
        if !self.in_game {
            return Err(ActionError::NotInGame);
        }
        if !self.my_turn {
            return Err(ActionError::NotMyTurn);
        }
        let Some(room) = &self.room else {
            return Err(ActionError::NoRoomView);
        };
        match action {
            PlayerAction::Move(direction) => {
                if room.monster {
                    Err(ActionError::MonsterInTheWay)
                } else if !room.directions.contains(direction) {
                    Err(ActionError::DirectionClosed(direction))
                } else {
                    Ok(action.payload())
                }
            }
            PlayerAction::Attack | PlayerAction::Defend => {
                if room.monster {
                    Ok(action.payload())
                } else {
                    Err(ActionError::NoMonster)
                }
            }
            PlayerAction::ClaimTreasure => {
                if room.treasure > 0 {
                    Ok(action.payload())
                } else {
                    Err(ActionError::NoTreasure)
                }
            }
            PlayerAction::LeaveDungeon => {
                if room.exit {
                    Ok(action.payload())
                } else {
                    Err(ActionError::NoExit)
                }
            }
        }
    }

    /// Every action the cached view says would currently be accepted.
    pub fn legal_actions(&self) -> Vec<PlayerAction> {
        let mut candidates = vec![
            PlayerAction::Attack,
            PlayerAction::Defend,
            PlayerAction::ClaimTreasure,
            PlayerAction::LeaveDungeon,
        ];
        candidates.extend(Direction::ALL.map(PlayerAction::Move));
        candidates
            .into_iter()
            .filter(|&action| self.request(action).is_ok())
            .collect()
    }

    /// The most pressing legal action: fight, then loot, then leave.
    /// Movement is left to the caller since direction is a choice.
    pub fn suggested_action(&self) -> Option<PlayerAction> {
        [
            PlayerAction::Attack,
            PlayerAction::ClaimTreasure,
            PlayerAction::LeaveDungeon,
        ]
        .into_iter()
        .find(|&action| self.request(action).is_ok())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn my_id(&self) -> Option<PlayerId> {
        self.my_id
    }

    pub fn my_color(&self) -> Option<PlayerColor> {
        self.my_color
    }

    /// Known players in id order, self included once welcomed.
    pub fn players(&self) -> impl Iterator<Item = (PlayerId, &PlayerView)> {
        self.players.iter().map(|(id, view)| (*id, view))
    }

    pub fn player_name(&self, player: PlayerId) -> Option<&str> {
        self.players.get(&player).map(|view| view.name.as_str())
    }

    pub fn in_game(&self) -> bool {
        self.in_game
    }

    pub fn is_my_turn(&self) -> bool {
        self.my_turn
    }

    pub fn room(&self) -> Option<&RoomView> {
        self.room.as_ref()
    }

    pub fn health(&self) -> u16 {
        self.health
    }

    pub fn coins(&self) -> u16 {
        self.coins
    }

    /// Final scores of the last finished game, highest coins first.
    pub fn scores(&self) -> &[ScoreEntry] {
        &self.scores
    }

    /// Id of the most recently denied request, for UI feedback.
    pub fn last_denied(&self) -> Option<u32> {
        self.last_denied
    }

    fn drop_occupant(&mut self, player: PlayerId) {
        if let Some(view) = &mut self.room {
            view.occupants.retain(|&p| p != player);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ME: PlayerId = PlayerId(1);
    const OTHER: PlayerId = PlayerId(2);

    fn feed(mirror: &mut SessionMirror, payload: Payload) -> Vec<Payload> {
        mirror.handle_message(&Envelope::new(9, payload))
    }

    fn welcomed() -> SessionMirror {
        let mut mirror = SessionMirror::new("tam");
        feed(
            &mut mirror,
            Payload::Welcome {
                player: ME,
                color: PlayerColor(0xAA2211FF),
            },
        );
        mirror
    }

    fn room(monster: bool, treasure: u16, exit: bool) -> RoomView {
        RoomView {
            directions: [Direction::North, Direction::East].into_iter().collect(),
            treasure,
            monster,
            exit,
            occupants: vec![OTHER],
        }
    }

    /// Puts the mirror in the dungeon, on its own turn, in `view`.
    fn in_room(view: RoomView) -> SessionMirror {
        let mut mirror = welcomed();
        feed(&mut mirror, Payload::StartGame { start_health: 10 });
        feed(&mut mirror, Payload::PlayerTurn { player: ME });
        feed(&mut mirror, Payload::RoomInfo { room: view });
        mirror
    }

    #[test]
    fn welcome_replies_with_the_chosen_name() {
        let mut mirror = SessionMirror::new("tam");
        let replies = feed(
            &mut mirror,
            Payload::Welcome {
                player: ME,
                color: PlayerColor(0x01020304),
            },
        );
        assert_eq!(replies, vec![Payload::SetName { name: "tam".into() }]);
        assert_eq!(mirror.my_id(), Some(ME));
        assert_eq!(mirror.player_name(ME), Some("tam"));
    }

    #[test]
    fn roster_upserts_follow_renames() {
        let mut mirror = welcomed();
        feed(
            &mut mirror,
            Payload::NewPlayer {
                player: OTHER,
                color: PlayerColor(0x11223344),
                name: String::new(),
            },
        );
        assert_eq!(mirror.player_name(OTHER), Some(""));

        feed(
            &mut mirror,
            Payload::NewPlayer {
                player: OTHER,
                color: PlayerColor(0x11223344),
                name: "bo".into(),
            },
        );
        assert_eq!(mirror.player_name(OTHER), Some("bo"));
        assert_eq!(mirror.players().count(), 2);

        feed(&mut mirror, Payload::PlayerLeft { player: OTHER });
        assert_eq!(mirror.player_name(OTHER), None);
    }

    #[test]
    fn turn_flag_follows_player_turn_only() {
        let mut mirror = in_room(room(false, 0, false));
        assert!(mirror.is_my_turn());

        feed(&mut mirror, Payload::PlayerTurn { player: OTHER });
        assert!(!mirror.is_my_turn());

        feed(&mut mirror, Payload::PlayerTurn { player: ME });
        assert!(mirror.is_my_turn());
    }

    #[test]
    fn denial_is_a_state_no_op() {
        let mut mirror = in_room(room(true, 0, false));
        assert!(mirror.request(PlayerAction::Attack).is_ok());

        feed(&mut mirror, Payload::RequestDenied { denied_id: 17 });
        assert_eq!(mirror.last_denied(), Some(17));
        // Still our turn; the corrected request can go straight out.
        assert!(mirror.is_my_turn());
        assert!(mirror.request(PlayerAction::Attack).is_ok());
    }

    #[test]
    fn move_gates_on_monsters_and_walls() {
        let mirror = in_room(room(true, 0, false));
        assert_eq!(
            mirror.request(PlayerAction::Move(Direction::North)),
            Err(ActionError::MonsterInTheWay)
        );

        let mirror = in_room(room(false, 0, false));
        assert_eq!(
            mirror.request(PlayerAction::Move(Direction::South)),
            Err(ActionError::DirectionClosed(Direction::South))
        );
        assert_eq!(
            mirror.request(PlayerAction::Move(Direction::North)),
            Ok(Payload::MoveRequest {
                direction: Direction::North
            })
        );
    }

    #[test]
    fn fight_actions_need_a_monster() {
        let mirror = in_room(room(false, 0, false));
        assert_eq!(
            mirror.request(PlayerAction::Attack),
            Err(ActionError::NoMonster)
        );
        assert_eq!(
            mirror.request(PlayerAction::Defend),
            Err(ActionError::NoMonster)
        );
    }

    #[test]
    fn treasure_claim_clears_the_cache() {
        let mut mirror = in_room(room(false, 12, false));
        assert!(mirror.request(PlayerAction::ClaimTreasure).is_ok());

        feed(&mut mirror, Payload::ObtainTreasure { amount: 6 });
        assert_eq!(mirror.coins(), 6);
        assert_eq!(
            mirror.request(PlayerAction::ClaimTreasure),
            Err(ActionError::NoTreasure)
        );
    }

    #[test]
    fn hit_monster_keeps_the_cached_monster_alive() {
        let mut mirror = in_room(room(true, 0, false));
        feed(
            &mut mirror,
            Payload::HitMonster {
                player: ME,
                damage: 1,
            },
        );
        // Liveness is only learned from the next room view.
        assert!(mirror.request(PlayerAction::Attack).is_ok());
    }

    #[test]
    fn occupants_patch_from_broadcasts() {
        let mut mirror = in_room(room(false, 0, false));
        let third = PlayerId(3);

        feed(&mut mirror, Payload::PlayerEnterRoom { player: third });
        assert_eq!(mirror.room().map(|r| r.occupants.len()), Some(2));

        feed(&mut mirror, Payload::PlayerLeaveRoom { player: OTHER });
        feed(&mut mirror, Payload::PlayerDies { player: third });
        assert_eq!(mirror.room().map(|r| r.occupants.len()), Some(0));
    }

    #[test]
    fn own_death_ends_the_game_locally() {
        let mut mirror = in_room(room(true, 0, false));
        feed(&mut mirror, Payload::PlayerDies { player: ME });
        assert!(!mirror.in_game());
        assert_eq!(
            mirror.request(PlayerAction::Attack),
            Err(ActionError::NotInGame)
        );
    }

    #[test]
    fn health_tracks_hits_addressed_to_me() {
        let mut mirror = in_room(room(true, 0, false));
        assert_eq!(mirror.health(), 10);

        feed(
            &mut mirror,
            Payload::HitByMonster {
                player: OTHER,
                health: 4,
            },
        );
        assert_eq!(mirror.health(), 10);

        feed(
            &mut mirror,
            Payload::HitByMonster {
                player: ME,
                health: 8,
            },
        );
        assert_eq!(mirror.health(), 8);
    }

    #[test]
    fn end_game_sorts_scores_descending() {
        let mut mirror = in_room(room(false, 0, true));
        feed(
            &mut mirror,
            Payload::EndGame {
                scores: vec![
                    ScoreEntry {
                        player: PlayerId(0),
                        coins: 5,
                    },
                    ScoreEntry {
                        player: ME,
                        coins: 30,
                    },
                    ScoreEntry {
                        player: OTHER,
                        coins: 5,
                    },
                ],
            },
        );
        assert!(!mirror.in_game());
        let coins: Vec<u16> = mirror.scores().iter().map(|s| s.coins).collect();
        assert_eq!(coins, vec![30, 5, 5]);
        // Ties break on the lower player id.
        assert_eq!(mirror.scores()[1].player, PlayerId(0));
    }

    #[test]
    fn suggested_action_prefers_fighting() {
        let mirror = in_room(room(true, 9, true));
        assert_eq!(mirror.suggested_action(), Some(PlayerAction::Attack));

        let mirror = in_room(room(false, 9, true));
        assert_eq!(mirror.suggested_action(), Some(PlayerAction::ClaimTreasure));

        let mirror = in_room(room(false, 0, true));
        assert_eq!(mirror.suggested_action(), Some(PlayerAction::LeaveDungeon));

        let mirror = in_room(room(false, 0, false));
        assert_eq!(mirror.suggested_action(), None);
    }

    #[test]
    fn legal_actions_match_the_room() {
        let mirror = in_room(room(true, 0, false));
        let legal = mirror.legal_actions();
        assert!(legal.contains(&PlayerAction::Attack));
        assert!(legal.contains(&PlayerAction::Defend));
        assert!(!legal.contains(&PlayerAction::ClaimTreasure));
        assert!(!legal.iter().any(|a| matches!(a, PlayerAction::Move(_))));
    }

    #[test]
    fn requests_outside_a_game_are_refused() {
        let mirror = welcomed();
        assert_eq!(
            mirror.request(PlayerAction::LeaveDungeon),
            Err(ActionError::NotInGame)
        );

        let mut mirror = welcomed();
        feed(&mut mirror, Payload::StartGame { start_health: 10 });
        feed(&mut mirror, Payload::PlayerTurn { player: ME });
        assert_eq!(
            mirror.request(PlayerAction::Attack),
            Err(ActionError::NoRoomView)
        );
    }

    #[test]
    fn not_my_turn_blocks_everything() {
        let mut mirror = in_room(room(true, 5, true));
        feed(&mut mirror, Payload::PlayerTurn { player: OTHER });
        for action in [
            PlayerAction::Attack,
            PlayerAction::Defend,
            PlayerAction::ClaimTreasure,
            PlayerAction::LeaveDungeon,
            PlayerAction::Move(Direction::North),
        ] {
            assert_eq!(mirror.request(action), Err(ActionError::NotMyTurn));
        }
    }
}
