//! Dungeon grid generation.

use serde::{Deserialize, Serialize};

use emberdelve_protocol::{Direction, Directions};

use crate::rng::GameRng;

/// Static generation parameters, fixed for the lifetime of one game.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSettings {
    pub width: u32,
    pub height: u32,
    /// Rooms holding treasure; clamped to the available non-exit rooms.
    pub treasure_count: u32,
    pub min_coins_per_treasure: u16,
    pub max_coins_per_treasure: u16,
    /// Multiplier turning a coin draw into a treasure value.
    pub coin_worth: u16,
    /// Rooms holding a monster; clamped to the available non-exit rooms.
    pub monster_count: u32,
    pub min_monster_health: u16,
    pub max_monster_health: u16,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            width: 4,
            height: 4,
            treasure_count: 3,
            min_coins_per_treasure: 1,
            max_coins_per_treasure: 5,
            coin_worth: 10,
            monster_count: 2,
            min_monster_health: 2,
            max_monster_health: 5,
        }
    }
}

/// Settings rejected before a game can start.
#[derive(Clone, Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("grid dimensions must be nonzero ({width}x{height})")]
    EmptyGrid { width: u32, height: u32 },
    #[error("treasure coin range is inverted ({min}..{max})")]
    InvertedCoinRange { min: u16, max: u16 },
    #[error("monster health range is inverted ({min}..{max})")]
    InvertedHealthRange { min: u16, max: u16 },
    #[error("monster health draw may be zero")]
    ZeroHealthMonster,
}

impl GridSettings {
    /// Checks every invariant generation relies on.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.width == 0 || self.height == 0 {
            return Err(SettingsError::EmptyGrid {
                width: self.width,
                height: self.height,
            });
        }
        if self.min_coins_per_treasure > self.max_coins_per_treasure {
            return Err(SettingsError::InvertedCoinRange {
                min: self.min_coins_per_treasure,
                max: self.max_coins_per_treasure,
            });
        }
        if self.min_monster_health > self.max_monster_health {
            return Err(SettingsError::InvertedHealthRange {
                min: self.min_monster_health,
                max: self.max_monster_health,
            });
        }
        // A spawned monster with zero health would read as already dead.
        if self.monster_count > 0 && self.min_monster_health == 0 {
            return Err(SettingsError::ZeroHealthMonster);
        }
        Ok(())
    }
}

/// One grid cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Room {
    pub has_exit: bool,
    /// Unclaimed treasure value; 0 means none.
    pub treasure_value: u16,
    /// Remaining monster health; 0 means none or dead.
    pub monster_health: u16,
}

impl Room {
    pub fn has_live_monster(&self) -> bool {
        self.monster_health > 0
    }

    pub fn has_treasure(&self) -> bool {
        self.treasure_value > 0
    }
}

/// Rectangular dungeon, row-major. Shape is immutable after generation;
/// only room contents mutate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grid {
    width: u32,
    height: u32,
    rooms: Vec<Room>,
}

impl Grid {
    /// Generates a dungeon fully determined by `seed`.
    pub fn generate(settings: &GridSettings, seed: u64) -> Grid {
        let mut rng = GameRng::seed_from_u64(seed);
        Self::generate_with(settings, &mut rng)
    }

    /// Generates a dungeon drawing from a caller-owned rng, so player
    /// placement can continue the same deterministic stream.
    pub fn generate_with(settings: &GridSettings, rng: &mut GameRng) -> Grid {
        let width = settings.width.max(1);
        let height = settings.height.max(1);
        let mut rooms = vec![Room::default(); (width * height) as usize];

        let exit = rng.gen_index(rooms.len());
        rooms[exit].has_exit = true;

        // Treasure rooms are drawn without replacement from the non-exit rooms.
        let mut candidates: Vec<usize> = (0..rooms.len()).filter(|&i| i != exit).collect();
        let treasure_count = (settings.treasure_count as usize).min(candidates.len());
        for _ in 0..treasure_count {
            let room = candidates.swap_remove(rng.gen_index(candidates.len()));
            let coins = rng.gen_range_u16(
                settings.min_coins_per_treasure,
                settings.max_coins_per_treasure,
            );
            let value = u32::from(coins) * u32::from(settings.coin_worth);
            rooms[room].treasure_value = value.min(u32::from(u16::MAX)) as u16;
        }

        // Monsters draw from a fresh candidate list: they may share a room
        // with treasure, never with the exit.
        let mut candidates: Vec<usize> = (0..rooms.len()).filter(|&i| i != exit).collect();
        let monster_count = (settings.monster_count as usize).min(candidates.len());
        for _ in 0..monster_count {
            let room = candidates.swap_remove(rng.gen_index(candidates.len()));
            rooms[room].monster_health =
                rng.gen_range_u16(settings.min_monster_health, settings.max_monster_health);
        }

        Grid {
            width,
            height,
            rooms,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height
    }

    fn index(&self, x: u32, y: u32) -> usize {
        debug_assert!(x < self.width && y < self.height);
        (y * self.width + x) as usize
    }

    pub fn room(&self, x: u32, y: u32) -> &Room {
        &self.rooms[self.index(x, y)]
    }

    pub fn room_mut(&mut self, x: u32, y: u32) -> &mut Room {
        let index = self.index(x, y);
        &mut self.rooms[index]
    }

    /// Directions with a room on the other side; bounded by grid edges only.
    pub fn open_directions(&self, x: u32, y: u32) -> Directions {
        Direction::ALL
            .into_iter()
            .filter(|d| {
                let (dx, dy) = d.offset();
                self.in_bounds(x as i32 + dx, y as i32 + dy)
            })
            .collect()
    }

    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.iter()
    }

    #[cfg(test)]
    pub(crate) fn from_rooms(width: u32, height: u32, rooms: Vec<Room>) -> Grid {
        assert_eq!(rooms.len(), (width * height) as usize);
        Grid {
            width,
            height,
            rooms,
        }
    }
}
