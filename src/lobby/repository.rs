use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use super::models::LobbyModel;
use crate::shared::{AppError, Pagination};

/// Result of attempting to join a lobby
#[derive(Debug, Clone)]
pub enum JoinLobbyResult {
    /// Joined, returns the lobby with the incremented counter
    Success(LobbyModel),
    /// Lobby is at capacity
    LobbyFull,
    /// Lobby does not exist or has expired
    LobbyNotFound,
}

/// Ephemeral key-value store for lobbies
///
/// Counters are changed with atomic operations and entries may carry an
/// expiration: an expired lobby reads as absent.
#[async_trait]
pub trait LobbyRepository: Send + Sync {
    async fn create_lobby(&self, lobby: &LobbyModel, ttl: Duration) -> Result<(), AppError>;
    async fn get_lobby(&self, lobby_id: &str) -> Result<Option<LobbyModel>, AppError>;
    async fn list_lobbies(&self, page: &Pagination) -> Result<Vec<LobbyModel>, AppError>;

    /// Removes a lobby, returning it as it was at removal
    async fn delete_lobby(&self, lobby_id: &str) -> Result<Option<LobbyModel>, AppError>;

    /// Puts back a lobby taken out by `delete_lobby`
    ///
    /// The expiration is armed only when nobody holds a seat.
    async fn restore_lobby(&self, lobby: &LobbyModel, ttl: Duration) -> Result<(), AppError>;

    /// Checks capacity, increments the player counter and clears the expiration in one step
    async fn try_join_lobby(&self, lobby_id: &str) -> Result<JoinLobbyResult, AppError>;

    /// Decrements the player counter, returning the count before the decrement
    async fn decrement_players(&self, lobby_id: &str) -> Result<Option<i32>, AppError>;

    /// Arms the expiration of a lobby, false when it does not exist
    async fn expire(&self, lobby_id: &str, ttl: Duration) -> Result<bool, AppError>;

    /// Drops expired entries, returns how many were removed
    async fn purge_expired(&self) -> Result<u64, AppError>;
}

#[derive(Debug, Clone)]
struct LobbyEntry {
    lobby: LobbyModel,
    expires_at: Option<Instant>,
}

impl LobbyEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// In-memory implementation of LobbyRepository for development and testing
pub struct InMemoryLobbyRepository {
    lobbies: Mutex<HashMap<String, LobbyEntry>>,
}

impl Default for InMemoryLobbyRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLobbyRepository {
    /// Creates a new empty in-memory repository
    pub fn new() -> Self {
        Self {
            lobbies: Mutex::new(HashMap::new()),
        }
    }

    /// Whether the lobby currently has an expiration armed
    pub fn has_expiration(&self, lobby_id: &str) -> bool {
        self.lobbies
            .lock()
            .unwrap()
            .get(lobby_id)
            .is_some_and(|entry| entry.expires_at.is_some())
    }

    /// Live entry for an id, evicting it first if it has expired
    fn live_entry<'a>(
        lobbies: &'a mut HashMap<String, LobbyEntry>,
        lobby_id: &str,
    ) -> Option<&'a mut LobbyEntry> {
        let now = Instant::now();
        if lobbies.get(lobby_id).is_some_and(|e| e.is_expired(now)) {
            debug!(lobby_id = %lobby_id, "Lobby expired, evicting");
            lobbies.remove(lobby_id);
            return None;
        }
        lobbies.get_mut(lobby_id)
    }
}

#[async_trait]
impl LobbyRepository for InMemoryLobbyRepository {
    #[instrument(skip(self, lobby))]
    async fn create_lobby(&self, lobby: &LobbyModel, ttl: Duration) -> Result<(), AppError> {
        debug!(lobby_id = %lobby.id, creator_id = %lobby.creator_id, "Creating lobby in memory");

        let mut lobbies = self.lobbies.lock().unwrap();
        if Self::live_entry(&mut lobbies, &lobby.id).is_some() {
            warn!(lobby_id = %lobby.id, "Lobby already exists in memory");
            return Err(AppError::DatabaseError("Lobby already exists".to_string()));
        }
        lobbies.insert(
            lobby.id.clone(),
            LobbyEntry {
                lobby: lobby.clone(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_lobby(&self, lobby_id: &str) -> Result<Option<LobbyModel>, AppError> {
        let mut lobbies = self.lobbies.lock().unwrap();
        Ok(Self::live_entry(&mut lobbies, lobby_id).map(|e| e.lobby.clone()))
    }

    #[instrument(skip(self))]
    async fn list_lobbies(&self, page: &Pagination) -> Result<Vec<LobbyModel>, AppError> {
        let lobbies = self.lobbies.lock().unwrap();
        let now = Instant::now();

        let mut live: Vec<LobbyModel> = lobbies
            .values()
            .filter(|e| !e.is_expired(now))
            .map(|e| e.lobby.clone())
            .collect();
        live.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        Ok(live
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect())
    }

    #[instrument(skip(self))]
    async fn delete_lobby(&self, lobby_id: &str) -> Result<Option<LobbyModel>, AppError> {
        let mut lobbies = self.lobbies.lock().unwrap();
        let removed = Self::live_entry(&mut lobbies, lobby_id).map(|e| e.lobby.clone());
        lobbies.remove(lobby_id);
        Ok(removed)
    }

    #[instrument(skip(self, lobby))]
    async fn restore_lobby(&self, lobby: &LobbyModel, ttl: Duration) -> Result<(), AppError> {
        let mut lobbies = self.lobbies.lock().unwrap();
        if Self::live_entry(&mut lobbies, &lobby.id).is_some() {
            warn!(lobby_id = %lobby.id, "Lobby reappeared before restore");
            return Err(AppError::DatabaseError("Lobby already exists".to_string()));
        }

        let expires_at = (lobby.current_players == 0).then(|| Instant::now() + ttl);
        lobbies.insert(
            lobby.id.clone(),
            LobbyEntry {
                lobby: lobby.clone(),
                expires_at,
            },
        );
        debug!(lobby_id = %lobby.id, current_players = lobby.current_players, "Lobby restored");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn try_join_lobby(&self, lobby_id: &str) -> Result<JoinLobbyResult, AppError> {
        let mut lobbies = self.lobbies.lock().unwrap();

        let entry = match Self::live_entry(&mut lobbies, lobby_id) {
            Some(entry) => entry,
            None => {
                debug!(lobby_id = %lobby_id, "Lobby not found");
                return Ok(JoinLobbyResult::LobbyNotFound);
            }
        };

        if entry.lobby.is_full() {
            debug!(lobby_id = %lobby_id, current_players = entry.lobby.current_players, "Lobby is full");
            return Ok(JoinLobbyResult::LobbyFull);
        }

        entry.lobby.current_players += 1;
        entry.expires_at = None;

        info!(
            lobby_id = %lobby_id,
            current_players = entry.lobby.current_players,
            "Player joined lobby (atomic)"
        );
        Ok(JoinLobbyResult::Success(entry.lobby.clone()))
    }

    #[instrument(skip(self))]
    async fn decrement_players(&self, lobby_id: &str) -> Result<Option<i32>, AppError> {
        let mut lobbies = self.lobbies.lock().unwrap();

        Ok(Self::live_entry(&mut lobbies, lobby_id).map(|entry| {
            let previous = entry.lobby.current_players;
            entry.lobby.current_players = (previous - 1).max(0);
            previous
        }))
    }

    #[instrument(skip(self))]
    async fn expire(&self, lobby_id: &str, ttl: Duration) -> Result<bool, AppError> {
        let mut lobbies = self.lobbies.lock().unwrap();

        match Self::live_entry(&mut lobbies, lobby_id) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    #[instrument(skip(self))]
    async fn purge_expired(&self) -> Result<u64, AppError> {
        let mut lobbies = self.lobbies.lock().unwrap();
        let now = Instant::now();
        let initial_count = lobbies.len();

        lobbies.retain(|_, entry| !entry.is_expired(now));

        let removed_count = initial_count - lobbies.len();
        debug!(expired_lobbies_removed = removed_count, "Expired lobbies purged from memory");
        Ok(removed_count as u64)
    }
}
