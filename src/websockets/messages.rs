use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::game::models::GameSummary;
use crate::game::types::{GuessResponse, RoundResponse, RoundResultResponse};
use crate::session::UserIdentity;
use crate::shared::AppError;

/// Messages a client may send over a live channel
///
/// Wire format: `{"type": "submit-guess", "payload": {"lat": 1.0, "lng": 2.0}}`,
/// variants without data may omit the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum ClientMessage {
    // Game channel
    SubmitGuess { lat: f64, lng: f64 },
    EndRound,
    NextRound,
    EndGame,

    // Lobby channel
    StartGame,

    // Both
    ChatMessage { content: String },
}

/// Messages pushed from the server to connected clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum ServerMessage {
    UserConnected { user: UserIdentity },
    UserDisconnected { user: UserIdentity },
    /// Sent to a joiner with everyone currently on the channel
    Roster { users: Vec<UserIdentity> },
    ChatMessage { user: UserIdentity, content: String },
    GameRedirect { game_id: i64 },

    /// Sender's own copy of the scored guess
    GuessAccepted { guess: GuessResponse },
    /// Tells the others someone guessed, without revealing where
    GuessSubmitted { user_id: String },
    RoundStarted { round: RoundResponse },
    RoundResult { result: RoundResultResponse },
    GameResult { summary: GameSummary },

    Error { reason: String },
}

impl ServerMessage {
    pub fn error(reason: impl Into<String>) -> Self {
        ServerMessage::Error {
            reason: reason.into(),
        }
    }

    /// Error reply for a failed action, store failures stay opaque
    pub fn from_error(error: &AppError) -> Self {
        match error {
            AppError::DatabaseError(_) | AppError::Internal => Self::error("Internal server error"),
            other => Self::error(other.to_string()),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to serialize server message");
            r#"{"type":"error","payload":{"reason":"Internal server error"}}"#.to_string()
        })
    }
}
