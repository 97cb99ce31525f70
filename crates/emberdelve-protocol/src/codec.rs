//! Fixed-layout binary codec.
//!
//! Every message starts with a little-endian header `(kind: u16, id: u32)`
//! followed by the kind-specific body. Variable-length fields are always
//! count-prefixed so decoding is total: a decoder never scans for a
//! terminator, and a single `u8` count bounds every nested list.

use thiserror::Error;

use crate::{
    Direction, Envelope, MessageKind, Payload, PlayerColor, PlayerId, RoomView, ScoreEntry,
};

/// Hard cap on one encoded message, enforced in both directions.
pub const MAX_MESSAGE_SIZE: usize = 2048;

/// Longest accepted display name, in bytes of UTF-8.
pub const MAX_NAME_BYTES: usize = 64;

/// Codec failure. Any decode error is grounds for dropping the offending
/// connection; the shared session state stays untouched.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("message truncated")]
    Truncated,
    #[error("unknown message kind tag {0}")]
    UnknownKind(u16),
    #[error("invalid direction byte {0:#04x}")]
    InvalidDirection(u8),
    #[error("name exceeds {MAX_NAME_BYTES} bytes")]
    NameTooLong,
    #[error("name is not valid UTF-8")]
    InvalidName,
    #[error("list exceeds {} entries", u8::MAX)]
    ListTooLong,
    #[error("message exceeds {MAX_MESSAGE_SIZE} bytes")]
    Oversized,
}

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new() -> Self {
        Self {
            buf: Vec::with_capacity(64),
        }
    }

    fn u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    fn u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn name(&mut self, name: &str) -> Result<(), CodecError> {
        let bytes = name.as_bytes();
        if bytes.len() > MAX_NAME_BYTES {
            return Err(CodecError::NameTooLong);
        }
        self.u16(bytes.len() as u16);
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    fn count(&mut self, len: usize) -> Result<(), CodecError> {
        if len > usize::from(u8::MAX) {
            return Err(CodecError::ListTooLong);
        }
        self.u8(len as u8);
        Ok(())
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        let end = self.pos.checked_add(len).ok_or(CodecError::Truncated)?;
        if end > self.buf.len() {
            return Err(CodecError::Truncated);
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, CodecError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn i32(&mut self) -> Result<i32, CodecError> {
        let bytes = self.take(4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn bool(&mut self) -> Result<bool, CodecError> {
        Ok(self.u8()? != 0)
    }

    fn name(&mut self) -> Result<String, CodecError> {
        let len = usize::from(self.u16()?);
        if len > MAX_NAME_BYTES {
            return Err(CodecError::NameTooLong);
        }
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidName)
    }
}

/// Encodes an envelope into its wire form.
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, CodecError> {
    let mut w = Writer::new();
    w.u16(envelope.payload.kind().as_u16());
    w.u32(envelope.id);

    match &envelope.payload {
        Payload::None
        | Payload::AttackRequest
        | Payload::DefendRequest
        | Payload::ClaimTreasureRequest
        | Payload::LeaveDungeonRequest => {}
        Payload::NewPlayer {
            player,
            color,
            name,
        } => {
            w.i32(player.0);
            w.u32(color.0);
            w.name(name)?;
        }
        Payload::Welcome { player, color } => {
            w.i32(player.0);
            w.u32(color.0);
        }
        Payload::SetName { name } => w.name(name)?,
        Payload::RequestDenied { denied_id } => w.u32(*denied_id),
        Payload::PlayerLeft { player }
        | Payload::PlayerTurn { player }
        | Payload::PlayerEnterRoom { player }
        | Payload::PlayerLeaveRoom { player }
        | Payload::PlayerLeftDungeon { player }
        | Payload::PlayerDies { player } => w.i32(player.0),
        Payload::StartGame { start_health } => w.u16(*start_health),
        Payload::RoomInfo { room } => {
            w.u8(room.directions.0);
            w.u16(room.treasure);
            w.u8(room.monster as u8);
            w.u8(room.exit as u8);
            w.count(room.occupants.len())?;
            for occupant in &room.occupants {
                w.i32(occupant.0);
            }
        }
        Payload::ObtainTreasure { amount } => w.u16(*amount),
        Payload::HitMonster { player, damage } => {
            w.i32(player.0);
            w.u16(*damage);
        }
        Payload::HitByMonster { player, health } | Payload::PlayerDefends { player, health } => {
            w.i32(player.0);
            w.u16(*health);
        }
        Payload::EndGame { scores } => {
            w.count(scores.len())?;
            for entry in scores {
                w.i32(entry.player.0);
                w.u16(entry.coins);
            }
        }
        Payload::MoveRequest { direction } => w.u8(direction.bit()),
    }

    if w.buf.len() > MAX_MESSAGE_SIZE {
        return Err(CodecError::Oversized);
    }
    Ok(w.buf)
}

/// Decodes one message. Bytes past the end of a complete layout are
/// ignored, matching the writer side which never emits them.
pub fn decode(bytes: &[u8]) -> Result<Envelope, CodecError> {
    if bytes.len() > MAX_MESSAGE_SIZE {
        return Err(CodecError::Oversized);
    }

    let mut r = Reader::new(bytes);
    let tag = r.u16()?;
    let kind = MessageKind::from_u16(tag).ok_or(CodecError::UnknownKind(tag))?;
    let id = r.u32()?;

    let payload = match kind {
        MessageKind::None => Payload::None,
        MessageKind::NewPlayer => Payload::NewPlayer {
            player: PlayerId(r.i32()?),
            color: PlayerColor(r.u32()?),
            name: r.name()?,
        },
        MessageKind::Welcome => Payload::Welcome {
            player: PlayerId(r.i32()?),
            color: PlayerColor(r.u32()?),
        },
        MessageKind::SetName => Payload::SetName { name: r.name()? },
        MessageKind::RequestDenied => Payload::RequestDenied { denied_id: r.u32()? },
        MessageKind::PlayerLeft => Payload::PlayerLeft {
            player: PlayerId(r.i32()?),
        },
        MessageKind::StartGame => Payload::StartGame {
            start_health: r.u16()?,
        },
        MessageKind::PlayerTurn => Payload::PlayerTurn {
            player: PlayerId(r.i32()?),
        },
        MessageKind::RoomInfo => {
            let directions = crate::Directions(r.u8()?);
            let treasure = r.u16()?;
            let monster = r.bool()?;
            let exit = r.bool()?;
            let count = usize::from(r.u8()?);
            let mut occupants = Vec::with_capacity(count);
            for _ in 0..count {
                occupants.push(PlayerId(r.i32()?));
            }
            Payload::RoomInfo {
                room: RoomView {
                    directions,
                    treasure,
                    monster,
                    exit,
                    occupants,
                },
            }
        }
        MessageKind::PlayerEnterRoom => Payload::PlayerEnterRoom {
            player: PlayerId(r.i32()?),
        },
        MessageKind::PlayerLeaveRoom => Payload::PlayerLeaveRoom {
            player: PlayerId(r.i32()?),
        },
        MessageKind::ObtainTreasure => Payload::ObtainTreasure { amount: r.u16()? },
        MessageKind::HitMonster => Payload::HitMonster {
            player: PlayerId(r.i32()?),
            damage: r.u16()?,
        },
        MessageKind::HitByMonster => Payload::HitByMonster {
            player: PlayerId(r.i32()?),
            health: r.u16()?,
        },
        MessageKind::PlayerDefends => Payload::PlayerDefends {
            player: PlayerId(r.i32()?),
            health: r.u16()?,
        },
        MessageKind::PlayerLeftDungeon => Payload::PlayerLeftDungeon {
            player: PlayerId(r.i32()?),
        },
        MessageKind::PlayerDies => Payload::PlayerDies {
            player: PlayerId(r.i32()?),
        },
        MessageKind::EndGame => {
            let count = usize::from(r.u8()?);
            let mut scores = Vec::with_capacity(count);
            for _ in 0..count {
                scores.push(ScoreEntry {
                    player: PlayerId(r.i32()?),
                    coins: r.u16()?,
                });
            }
            Payload::EndGame { scores }
        }
        MessageKind::MoveRequest => {
            let byte = r.u8()?;
            let direction = Direction::from_bit(byte).ok_or(CodecError::InvalidDirection(byte))?;
            Payload::MoveRequest { direction }
        }
        MessageKind::AttackRequest => Payload::AttackRequest,
        MessageKind::DefendRequest => Payload::DefendRequest,
        MessageKind::ClaimTreasureRequest => Payload::ClaimTreasureRequest,
        MessageKind::LeaveDungeonRequest => Payload::LeaveDungeonRequest,
    };

    Ok(Envelope { id, payload })
}
