//! Snapshot of the game world, folded from ingested events and read by the
//! boards.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, RwLock},
};

use herald_events::EventPayload;

pub type SharedWorld = Arc<RwLock<WorldState>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub name: String,
    pub last_chat: Option<String>,
}

#[derive(Debug, Default)]
pub struct WorldState {
    pub online: bool,
    pub world: Option<String>,
    pub players: BTreeMap<u64, Player>,
    /// Entity id to owning player.
    entities: HashMap<u64, u64>,
}

impl WorldState {
    pub fn shared() -> SharedWorld {
        Arc::new(RwLock::new(Self::default()))
    }

    /// Fold one payload into the snapshot. Aggregates and bookkeeping
    /// events leave it untouched.
    pub fn apply(&mut self, payload: &EventPayload) {
        match payload {
            EventPayload::ServerStarted { world } => {
                self.online = true;
                self.world = Some(world.clone());
            },
            EventPayload::ServerStopped => {
                self.online = false;
                self.players.clear();
                self.entities.clear();
            },
            EventPayload::PlayerJoined { player_id, name } => {
                self.online = true;
                self.players.insert(*player_id, Player {
                    name: name.clone(),
                    last_chat: None,
                });
            },
            EventPayload::PlayerLeft { player_id } => {
                self.players.remove(player_id);
                self.entities.retain(|_, owner| owner != player_id);
            },
            EventPayload::ChatMessage {
                player_id: Some(id),
                text,
                ..
            } => {
                if let Some(player) = self.players.get_mut(id) {
                    player.last_chat = Some(text.clone());
                }
            },
            EventPayload::EntityChanged {
                entity_id,
                owner_id,
            } => match owner_id {
                Some(owner) => {
                    self.entities.insert(*entity_id, *owner);
                },
                None => {
                    self.entities.remove(entity_id);
                },
            },
            _ => {},
        }
    }

    pub fn entity_count(&self, player_id: u64) -> usize {
        self.entities.values().filter(|o| **o == player_id).count()
    }

    pub fn player_name(&self, player_id: u64) -> Option<&str> {
        self.players.get(&player_id).map(|p| p.name.as_str())
    }
}
