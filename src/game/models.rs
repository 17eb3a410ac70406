use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::panorama::PanoramaPoint;
use crate::scoring::Provider;

/// Which state machine drives a game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GameMode {
    Singleplayer,
    Multiplayer,
}

/// Parameters chosen when a game (or the lobby it comes from) is set up
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GameParameters {
    pub rounds: i32,
    /// Per-round timer, 0 means untimed
    pub timer_seconds: i32,
    pub moving_allowed: bool,
    pub provider: Provider,
}

/// Database model for the games table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameModel {
    pub id: i64,
    pub mode: GameMode,
    pub creator_id: String,
    pub rounds: i32,
    pub timer_seconds: i32,
    pub moving_allowed: bool,
    pub provider: Provider,
    pub round_current: i32,
    /// Accumulated score, singleplayer only
    pub score: Option<i32>,
    /// Roster size snapshot, multiplayer only
    pub player_count: Option<i32>,
    pub finished: bool,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl GameModel {
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.creator_id == user_id
    }

    pub fn has_rounds_remaining(&self) -> bool {
        self.round_current < self.rounds
    }

    pub fn parameters(&self) -> GameParameters {
        GameParameters {
            rounds: self.rounds,
            timer_seconds: self.timer_seconds,
            moving_allowed: self.moving_allowed,
            provider: self.provider,
        }
    }
}

/// Insert payload for a game row plus its initial roster
#[derive(Debug, Clone)]
pub struct NewGame {
    pub mode: GameMode,
    pub creator_id: String,
    pub parameters: GameParameters,
    pub players: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl NewGame {
    pub fn singleplayer(creator_id: &str, parameters: GameParameters, now: DateTime<Utc>) -> Self {
        Self {
            mode: GameMode::Singleplayer,
            creator_id: creator_id.to_string(),
            parameters,
            players: vec![creator_id.to_string()],
            created_at: now,
        }
    }

    pub fn multiplayer(
        creator_id: &str,
        parameters: GameParameters,
        players: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            mode: GameMode::Multiplayer,
            creator_id: creator_id.to_string(),
            parameters,
            players,
            created_at: now,
        }
    }

    /// Row as it looks right after insertion under the given id
    pub fn into_model(self, id: i64) -> GameModel {
        let (score, player_count) = match self.mode {
            GameMode::Singleplayer => (Some(0), None),
            GameMode::Multiplayer => (None, Some(self.players.len() as i32)),
        };

        GameModel {
            id,
            mode: self.mode,
            creator_id: self.creator_id,
            rounds: self.parameters.rounds,
            timer_seconds: self.parameters.timer_seconds,
            moving_allowed: self.parameters.moving_allowed,
            provider: self.parameters.provider,
            round_current: 0,
            score,
            player_count,
            finished: false,
            created_at: self.created_at,
            ended_at: None,
        }
    }
}

/// Database model for the rounds table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundModel {
    pub id: i64,
    pub game_id: i64,
    pub round_num: i32,
    pub point_id: String,
    pub streetview_ref: String,
    pub lat: f64,
    pub lng: f64,
    pub created_at: DateTime<Utc>,
    /// When the round becomes playable, a little after creation
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub finished: bool,
    pub guesses_count: i32,
}

impl RoundModel {
    /// When the round timer runs out, `None` for untimed games
    pub fn deadline(&self, timer_seconds: i32) -> Option<DateTime<Utc>> {
        (timer_seconds > 0).then(|| self.started_at + Duration::seconds(i64::from(timer_seconds)))
    }

    pub fn timer_elapsed(&self, timer_seconds: i32, now: DateTime<Utc>) -> bool {
        self.deadline(timer_seconds)
            .is_some_and(|deadline| now >= deadline)
    }

    /// True while the results of a just-finished round should stay on screen
    pub fn in_result_window(&self, round_end_delay: Duration, now: DateTime<Utc>) -> bool {
        match self.ended_at {
            Some(ended_at) if self.finished => now < ended_at + round_end_delay,
            _ => false,
        }
    }
}

/// Insert payload for a round row
#[derive(Debug, Clone)]
pub struct NewRound {
    pub game_id: i64,
    pub round_num: i32,
    pub point: PanoramaPoint,
    pub created_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
}

impl NewRound {
    pub fn into_model(self, id: i64) -> RoundModel {
        RoundModel {
            id,
            game_id: self.game_id,
            round_num: self.round_num,
            point_id: self.point.id,
            streetview_ref: self.point.streetview_ref,
            lat: self.point.lat,
            lng: self.point.lng,
            created_at: self.created_at,
            started_at: self.started_at,
            ended_at: None,
            finished: false,
            guesses_count: 0,
        }
    }
}

/// Database model for the guesses table, joined with its round number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuessModel {
    pub id: i64,
    pub round_id: i64,
    pub round_num: i32,
    pub user_id: String,
    pub lat: f64,
    pub lng: f64,
    pub score: i32,
    pub distance: f64,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a guess row
#[derive(Debug, Clone)]
pub struct NewGuess {
    pub round_id: i64,
    pub user_id: String,
    pub lat: f64,
    pub lng: f64,
    pub score: i32,
    pub distance: f64,
    pub created_at: DateTime<Utc>,
}

/// A stored guess together with the round it was made in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmittedGuess {
    pub round: RoundModel,
    pub guess: GuessModel,
}

/// Per-player aggregate over every guess of a game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerTotal {
    pub user_id: String,
    pub score: i64,
    pub distance: f64,
    pub guesses: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundWithGuesses {
    pub round: RoundModel,
    pub guesses: Vec<GuessModel>,
}

/// Final state of a game with its whole guess history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSummary {
    pub game: GameModel,
    pub guesses: Vec<GuessModel>,
    pub totals: Vec<PlayerTotal>,
}
