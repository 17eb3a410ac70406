use serde::{Deserialize, Serialize};

use crate::game::types::CreateGameRequest;

fn default_max_players() -> i32 {
    8
}

/// Request payload for creating a lobby, the game fields sit at the top level
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLobbyRequest {
    #[serde(flatten)]
    pub game: CreateGameRequest,
    #[serde(default = "default_max_players")]
    pub max_players: i32,
}

/// Response for a lobby promoted into a game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartGameResponse {
    pub game_id: i64,
}
