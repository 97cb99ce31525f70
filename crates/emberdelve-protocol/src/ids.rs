use serde::{Deserialize, Serialize};

/// Stable per-connection identifier assigned by the server at accept time.
///
/// Lives for the lifetime of the connection; never reused within a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub i32);

/// Display color assigned alongside the player id, packed as 0xRRGGBBAA.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerColor(pub u32);

impl PlayerColor {
    /// Alpha channel byte.
    pub const fn alpha(self) -> u8 {
        (self.0 & 0xFF) as u8
    }
}

/// Reserved message id for keep-alive traffic. Never handed out by
/// [`MessageIds`], so a keep-alive can always be told apart in a trace.
pub const KEEPALIVE_MESSAGE_ID: u32 = 0;

/// Allocator for wire message ids.
///
/// Ids exist for traceability and denial correlation only; ordering is the
/// transport's job. Each session (and each client) owns its own allocator
/// rather than sharing a process-wide counter.
#[derive(Clone, Debug, Default)]
pub struct MessageIds {
    next: u32,
}

impl MessageIds {
    pub fn new() -> Self {
        Self { next: 0 }
    }

    /// Hands out the next id. The first allocated id is 1; the counter wraps
    /// past [`KEEPALIVE_MESSAGE_ID`] without ever returning it.
    pub fn allocate(&mut self) -> u32 {
        self.next = self.next.wrapping_add(1);
        if self.next == KEEPALIVE_MESSAGE_ID {
            self.next = 1;
        }
        self.next
    }
}
