//! Connection registry: every live connection and what the lobby knows
//! about it.
//!
//! The registry owns identity only (ids, names, colors). Game state lives
//! in the engine; the two meet through `PlayerId`.

use emberdelve_protocol::{PlayerColor, PlayerId};
use rand::Rng;

/// Identity of one live connection
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlayerInfo {
    pub player: PlayerId,
    pub color: PlayerColor,
    /// Empty until the client negotiates one
    pub name: String,
}

/// Registry error types
#[derive(Clone, Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("session is full ({capacity} connections)")]
    CapacityExceeded { capacity: usize },

    #[error("unknown client {0}")]
    UnknownClient(u64),
}

/// Live connections in accept order, keyed by netcode client id.
pub struct ConnectionRegistry {
    min_players: usize,
    capacity: usize,
    next_player: i32,
    connections: Vec<(u64, PlayerInfo)>,
}

impl ConnectionRegistry {
    pub fn new(min_players: usize, capacity: usize) -> Self {
        Self {
            min_players,
            capacity,
            next_player: 0,
            connections: Vec::with_capacity(capacity),
        }
    }

    /// Admits a connection, assigning the next sequential player id and a
    /// random opaque display color. Admission beyond capacity is refused,
    /// never queued.
    pub fn accept(&mut self, client_id: u64) -> Result<PlayerInfo, RegistryError> {
        if self.connections.len() >= self.capacity {
            return Err(RegistryError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        let info = PlayerInfo {
            player: PlayerId(self.next_player),
            color: PlayerColor(rand::thread_rng().gen::<u32>() | 0xFF),
            name: String::new(),
        };
        self.next_player += 1;
        self.connections.push((client_id, info.clone()));
        Ok(info)
    }

    pub fn set_name(&mut self, client_id: u64, name: &str) -> Result<PlayerInfo, RegistryError> {
        let (_, info) = self
            .connections
            .iter_mut()
            .find(|(id, _)| *id == client_id)
            .ok_or(RegistryError::UnknownClient(client_id))?;
        info.name = name.to_string();
        Ok(info.clone())
    }

    pub fn remove(&mut self, client_id: u64) -> Option<PlayerInfo> {
        let index = self.connections.iter().position(|(id, _)| *id == client_id)?;
        Some(self.connections.remove(index).1)
    }

    pub fn get(&self, client_id: u64) -> Option<&PlayerInfo> {
        self.connections
            .iter()
            .find(|(id, _)| *id == client_id)
            .map(|(_, info)| info)
    }

    pub fn client_of(&self, player: PlayerId) -> Option<u64> {
        self.connections
            .iter()
            .find(|(_, info)| info.player == player)
            .map(|(id, _)| *id)
    }

    pub fn name_of(&self, player: PlayerId) -> Option<&str> {
        self.connections
            .iter()
            .find(|(_, info)| info.player == player)
            .map(|(_, info)| info.name.as_str())
    }

    /// Connections in accept order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &PlayerInfo)> {
        self.connections.iter().map(|(id, info)| (*id, info))
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Enough players to start, without exceeding capacity.
    pub fn is_within_start_range(&self) -> bool {
        let count = self.connections.len();
        count >= self.min_players && count <= self.capacity
    }

    /// Every connection has completed name negotiation.
    pub fn all_named(&self) -> bool {
        self.connections.iter().all(|(_, info)| !info.name.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_ids_are_sequential_from_zero() {
        let mut registry = ConnectionRegistry::new(2, 4);
        let a = registry.accept(100).unwrap();
        let b = registry.accept(101).unwrap();
        let c = registry.accept(102).unwrap();
        assert_eq!(a.player, PlayerId(0));
        assert_eq!(b.player, PlayerId(1));
        assert_eq!(c.player, PlayerId(2));
        // Ids are never reused, even after a removal.
        registry.remove(101);
        let d = registry.accept(103).unwrap();
        assert_eq!(d.player, PlayerId(3));
    }

    #[test]
    fn admission_beyond_capacity_is_refused() {
        let mut registry = ConnectionRegistry::new(1, 2);
        registry.accept(1).unwrap();
        registry.accept(2).unwrap();
        let refused = registry.accept(3);
        assert!(matches!(
            refused,
            Err(RegistryError::CapacityExceeded { capacity: 2 })
        ));
        assert_eq!(registry.count(), 2);
        assert!(registry.get(3).is_none());
    }

    #[test]
    fn colors_are_opaque() {
        let mut registry = ConnectionRegistry::new(1, 8);
        for client_id in 0..8 {
            let info = registry.accept(client_id).unwrap();
            assert_eq!(info.color.alpha(), 0xFF);
        }
    }

    #[test]
    fn set_name_updates_and_rejects_unknown() {
        let mut registry = ConnectionRegistry::new(1, 4);
        registry.accept(7).unwrap();
        let info = registry.set_name(7, "Brynn").unwrap();
        assert_eq!(info.name, "Brynn");
        assert_eq!(registry.get(7).unwrap().name, "Brynn");
        assert!(matches!(
            registry.set_name(8, "Ghost"),
            Err(RegistryError::UnknownClient(8))
        ));
    }

    #[test]
    fn removal_preserves_accept_order() {
        let mut registry = ConnectionRegistry::new(1, 4);
        registry.accept(10).unwrap();
        registry.accept(11).unwrap();
        registry.accept(12).unwrap();
        let removed = registry.remove(11).unwrap();
        assert_eq!(removed.player, PlayerId(1));
        let order: Vec<u64> = registry.iter().map(|(id, _)| id).collect();
        assert_eq!(order, vec![10, 12]);
        assert!(registry.remove(11).is_none());
    }

    #[test]
    fn lookups_by_player_id() {
        let mut registry = ConnectionRegistry::new(1, 4);
        registry.accept(20).unwrap();
        registry.accept(21).unwrap();
        registry.set_name(21, "Maeve").unwrap();
        assert_eq!(registry.client_of(PlayerId(1)), Some(21));
        assert_eq!(registry.name_of(PlayerId(1)), Some("Maeve"));
        assert_eq!(registry.client_of(PlayerId(9)), None);
    }

    #[test]
    fn start_range_gating() {
        let mut registry = ConnectionRegistry::new(2, 3);
        assert!(!registry.is_within_start_range());
        registry.accept(1).unwrap();
        assert!(!registry.is_within_start_range());
        registry.accept(2).unwrap();
        assert!(registry.is_within_start_range());
        registry.accept(3).unwrap();
        assert!(registry.is_within_start_range());

        assert!(!registry.all_named());
        for client_id in [1, 2, 3] {
            registry.set_name(client_id, "delver").unwrap();
        }
        assert!(registry.all_named());
    }
}
