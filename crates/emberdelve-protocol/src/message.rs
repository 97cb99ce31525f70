use serde::{Deserialize, Serialize};

use crate::{PlayerColor, PlayerId};

/// Cardinal movement direction, carried on the wire as a single set bit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    North,
    East,
    South,
    West,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    /// Wire encoding: one bit per direction.
    pub const fn bit(self) -> u8 {
        match self {
            Direction::North => 0b0001,
            Direction::East => 0b0010,
            Direction::South => 0b0100,
            Direction::West => 0b1000,
        }
    }

    pub const fn from_bit(byte: u8) -> Option<Direction> {
        match byte {
            0b0001 => Some(Direction::North),
            0b0010 => Some(Direction::East),
            0b0100 => Some(Direction::South),
            0b1000 => Some(Direction::West),
            _ => None,
        }
    }

    /// Grid offset for one step; north increases `y`.
    pub const fn offset(self) -> (i32, i32) {
        match self {
            Direction::North => (0, 1),
            Direction::East => (1, 0),
            Direction::South => (0, -1),
            Direction::West => (-1, 0),
        }
    }
}

/// Set of traversable directions out of a room, packed as a bitmask.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Directions(pub u8);

impl Directions {
    pub fn insert(&mut self, direction: Direction) {
        self.0 |= direction.bit();
    }

    pub fn contains(self, direction: Direction) -> bool {
        self.0 & direction.bit() != 0
    }

    pub fn iter(self) -> impl Iterator<Item = Direction> {
        Direction::ALL.into_iter().filter(move |d| self.contains(*d))
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl FromIterator<Direction> for Directions {
    fn from_iter<I: IntoIterator<Item = Direction>>(iter: I) -> Self {
        let mut dirs = Directions::default();
        for d in iter {
            dirs.insert(d);
        }
        dirs
    }
}

/// Snapshot of a single room from one player's point of view.
///
/// Computed fresh by the server on demand; a player only ever sees the room
/// they currently occupy.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomView {
    /// Directions with a room on the other side (grid bounds only).
    pub directions: Directions,
    /// Unclaimed treasure value; 0 means none.
    pub treasure: u16,
    /// Whether a live monster is present.
    pub monster: bool,
    /// Whether this room is the dungeon exit.
    pub exit: bool,
    /// Every *other* active player in this room.
    pub occupants: Vec<PlayerId>,
}

/// One row of an end-of-game scoreboard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub player: PlayerId,
    pub coins: u16,
}

/// Wire tag identifying a payload layout.
///
/// Values are fixed by the protocol and must never be reordered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum MessageKind {
    None = 0,
    NewPlayer = 1,
    Welcome = 2,
    SetName = 3,
    RequestDenied = 4,
    PlayerLeft = 5,
    StartGame = 6,
    PlayerTurn = 7,
    RoomInfo = 8,
    PlayerEnterRoom = 9,
    PlayerLeaveRoom = 10,
    ObtainTreasure = 11,
    HitMonster = 12,
    HitByMonster = 13,
    PlayerDefends = 14,
    PlayerLeftDungeon = 15,
    PlayerDies = 16,
    EndGame = 17,
    MoveRequest = 18,
    AttackRequest = 19,
    DefendRequest = 20,
    ClaimTreasureRequest = 21,
    LeaveDungeonRequest = 22,
}

impl MessageKind {
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    pub const fn from_u16(tag: u16) -> Option<MessageKind> {
        Some(match tag {
            0 => MessageKind::None,
            1 => MessageKind::NewPlayer,
            2 => MessageKind::Welcome,
            3 => MessageKind::SetName,
            4 => MessageKind::RequestDenied,
            5 => MessageKind::PlayerLeft,
            6 => MessageKind::StartGame,
            7 => MessageKind::PlayerTurn,
            8 => MessageKind::RoomInfo,
            9 => MessageKind::PlayerEnterRoom,
            10 => MessageKind::PlayerLeaveRoom,
            11 => MessageKind::ObtainTreasure,
            12 => MessageKind::HitMonster,
            13 => MessageKind::HitByMonster,
            14 => MessageKind::PlayerDefends,
            15 => MessageKind::PlayerLeftDungeon,
            16 => MessageKind::PlayerDies,
            17 => MessageKind::EndGame,
            18 => MessageKind::MoveRequest,
            19 => MessageKind::AttackRequest,
            20 => MessageKind::DefendRequest,
            21 => MessageKind::ClaimTreasureRequest,
            22 => MessageKind::LeaveDungeonRequest,
            _ => return None,
        })
    }

    /// Whether this kind is one of the five in-dungeon action requests.
    pub const fn is_action_request(self) -> bool {
        matches!(
            self,
            MessageKind::MoveRequest
                | MessageKind::AttackRequest
                | MessageKind::DefendRequest
                | MessageKind::ClaimTreasureRequest
                | MessageKind::LeaveDungeonRequest
        )
    }
}

/// Typed message body. Each variant maps one-to-one onto a [`MessageKind`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Payload {
    /// Keep-alive probe; carries nothing and elicits an echo.
    None,
    /// A player's identity, sent both for the unnamed announce at accept
    /// time and for every rename.
    NewPlayer {
        player: PlayerId,
        color: PlayerColor,
        name: String,
    },
    /// First message a newcomer receives: its own id and color.
    Welcome {
        player: PlayerId,
        color: PlayerColor,
    },
    /// Client request to (re)negotiate its display name.
    SetName { name: String },
    /// A request failed a precondition; echoes the request's id.
    RequestDenied { denied_id: u32 },
    PlayerLeft { player: PlayerId },
    /// The lobby is over; everyone starts with this much health.
    StartGame { start_health: u16 },
    PlayerTurn { player: PlayerId },
    RoomInfo { room: RoomView },
    PlayerEnterRoom { player: PlayerId },
    PlayerLeaveRoom { player: PlayerId },
    /// The receiving player's share of a claimed treasure.
    ObtainTreasure { amount: u16 },
    /// `player` dealt `damage` to the monster in their room.
    HitMonster { player: PlayerId, damage: u16 },
    /// The monster struck `player`, leaving them at `health`.
    HitByMonster { player: PlayerId, health: u16 },
    /// `player` braced for the next monster attack and healed to `health`.
    PlayerDefends { player: PlayerId, health: u16 },
    PlayerLeftDungeon { player: PlayerId },
    PlayerDies { player: PlayerId },
    EndGame { scores: Vec<ScoreEntry> },
    MoveRequest { direction: Direction },
    AttackRequest,
    DefendRequest,
    ClaimTreasureRequest,
    LeaveDungeonRequest,
}

impl Payload {
    pub const fn kind(&self) -> MessageKind {
        match self {
            Payload::None => MessageKind::None,
            Payload::NewPlayer { .. } => MessageKind::NewPlayer,
            Payload::Welcome { .. } => MessageKind::Welcome,
            Payload::SetName { .. } => MessageKind::SetName,
            Payload::RequestDenied { .. } => MessageKind::RequestDenied,
            Payload::PlayerLeft { .. } => MessageKind::PlayerLeft,
            Payload::StartGame { .. } => MessageKind::StartGame,
            Payload::PlayerTurn { .. } => MessageKind::PlayerTurn,
            Payload::RoomInfo { .. } => MessageKind::RoomInfo,
            Payload::PlayerEnterRoom { .. } => MessageKind::PlayerEnterRoom,
            Payload::PlayerLeaveRoom { .. } => MessageKind::PlayerLeaveRoom,
            Payload::ObtainTreasure { .. } => MessageKind::ObtainTreasure,
            Payload::HitMonster { .. } => MessageKind::HitMonster,
            Payload::HitByMonster { .. } => MessageKind::HitByMonster,
            Payload::PlayerDefends { .. } => MessageKind::PlayerDefends,
            Payload::PlayerLeftDungeon { .. } => MessageKind::PlayerLeftDungeon,
            Payload::PlayerDies { .. } => MessageKind::PlayerDies,
            Payload::EndGame { .. } => MessageKind::EndGame,
            Payload::MoveRequest { .. } => MessageKind::MoveRequest,
            Payload::AttackRequest => MessageKind::AttackRequest,
            Payload::DefendRequest => MessageKind::DefendRequest,
            Payload::ClaimTreasureRequest => MessageKind::ClaimTreasureRequest,
            Payload::LeaveDungeonRequest => MessageKind::LeaveDungeonRequest,
        }
    }
}

/// A complete wire message: allocator-issued id plus typed body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: u32,
    pub payload: Payload,
}

impl Envelope {
    pub fn new(id: u32, payload: Payload) -> Self {
        Self { id, payload }
    }
}
