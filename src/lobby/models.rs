use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::game::models::GameParameters;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobbyError {
    #[error("Lobby does not exist")]
    LobbyNotFound,

    #[error("Lobby is full")]
    LobbyFull,

    #[error("Only the lobby creator can start the game")]
    OnlyCreatorCanStart,

    #[error("Only the lobby creator can delete the lobby")]
    OnlyCreatorCanDelete,
}

/// Pre-game room kept in the ephemeral store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbyModel {
    pub id: String, // Random pet name, words joined by dashes
    pub creator_id: String,
    pub parameters: GameParameters,
    pub max_players: i32,
    pub current_players: i32,
    pub created_at: DateTime<Utc>,
}

impl LobbyModel {
    pub fn new(
        creator_id: &str,
        parameters: GameParameters,
        max_players: i32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: petname::Petnames::default().generate_one(3, "-"),
            creator_id: creator_id.to_string(),
            parameters,
            max_players,
            current_players: 0,
            created_at: now,
        }
    }

    pub fn is_full(&self) -> bool {
        self.current_players >= self.max_players
    }

    pub fn is_created_by(&self, user_id: &str) -> bool {
        self.creator_id == user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::Provider;

    #[test]
    fn test_new_lobby_is_empty() {
        let parameters = GameParameters {
            rounds: 5,
            timer_seconds: 60,
            moving_allowed: false,
            provider: Provider::Mapillary,
        };
        let mut lobby = LobbyModel::new("alice", parameters, 2, Utc::now());

        assert_eq!(lobby.id.split('-').count(), 3);
        assert_eq!(lobby.current_players, 0);
        assert!(lobby.is_created_by("alice"));
        assert!(!lobby.is_full());

        lobby.current_players = 2;
        assert!(lobby.is_full());
    }
}
