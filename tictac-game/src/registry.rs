use crate::contract::Participants;
use crate::error::{GameError, Result};
use crate::session::GameSession;

use bitcoin::{Amount, OutPoint};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tictac_core::GameConfig;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Live sessions keyed by game id. Each game sits behind its own lock, so
/// moves on one game never wait on another.
#[derive(Default)]
pub struct GameRegistry {
    games: Arc<RwLock<HashMap<Uuid, Arc<Mutex<GameSession>>>>>,
}

impl GameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_game(
        &self,
        participants: Participants,
        deploy: OutPoint,
        stake: Amount,
        config: GameConfig,
    ) -> Result<Arc<Mutex<GameSession>>> {
        let session = GameSession::new(Uuid::new_v4(), participants, deploy, stake, config)?;
        let id = session.id();
        self.insert(session)
            .ok_or_else(|| GameError::internal(format!("Game {} already registered", id)))
    }

    /// Registers a session; returns `None` if the id is already taken.
    pub fn insert(&self, session: GameSession) -> Option<Arc<Mutex<GameSession>>> {
        let id = session.id();
        let mut games = self.games.write();
        if games.contains_key(&id) {
            return None;
        }

        let handle = Arc::new(Mutex::new(session));
        games.insert(id, handle.clone());
        tracing::info!("Registered game {}", id);
        Some(handle)
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<Mutex<GameSession>>> {
        self.games.read().get(&id).cloned()
    }

    pub fn remove(&self, id: Uuid) -> Option<Arc<Mutex<GameSession>>> {
        self.games.write().remove(&id)
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.games.read().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.games.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.read().is_empty()
    }
}
