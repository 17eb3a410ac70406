use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::models::{GameParameters, GuessModel, RoundModel, RoundWithGuesses, SubmittedGuess};
use crate::scoring::Provider;

fn default_moving_allowed() -> bool {
    true
}

fn default_provider() -> Provider {
    Provider::Google
}

/// Request payload for creating a game or a lobby
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGameRequest {
    pub rounds: i32,
    #[serde(default)]
    pub timer_seconds: i32,
    #[serde(default = "default_moving_allowed")]
    pub moving_allowed: bool,
    #[serde(default = "default_provider")]
    pub provider: Provider,
}

impl From<CreateGameRequest> for GameParameters {
    fn from(request: CreateGameRequest) -> Self {
        GameParameters {
            rounds: request.rounds,
            timer_seconds: request.timer_seconds,
            moving_allowed: request.moving_allowed,
            provider: request.provider,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GuessRequest {
    pub lat: f64,
    pub lng: f64,
}

/// True location of a round, only revealed once it is finished
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundLocation {
    pub point_id: String,
    pub lat: f64,
    pub lng: f64,
}

/// Round as shown to players
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundResponse {
    pub id: i64,
    pub game_id: i64,
    pub round_num: i32,
    pub streetview_ref: String,
    pub started_at: DateTime<Utc>,
    pub deadline: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub finished: bool,
    pub guesses_count: i32,
    pub location: Option<RoundLocation>,
}

impl RoundResponse {
    pub fn new(round: RoundModel, timer_seconds: i32) -> Self {
        let deadline = round.deadline(timer_seconds);
        let location = round.finished.then(|| RoundLocation {
            point_id: round.point_id.clone(),
            lat: round.lat,
            lng: round.lng,
        });

        Self {
            id: round.id,
            game_id: round.game_id,
            round_num: round.round_num,
            streetview_ref: round.streetview_ref,
            started_at: round.started_at,
            deadline,
            ended_at: round.ended_at,
            finished: round.finished,
            guesses_count: round.guesses_count,
            location,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuessResponse {
    pub round: RoundResponse,
    pub guess: GuessModel,
}

impl GuessResponse {
    pub fn new(submitted: SubmittedGuess, timer_seconds: i32) -> Self {
        Self {
            round: RoundResponse::new(submitted.round, timer_seconds),
            guess: submitted.guess,
        }
    }
}

/// A finished round with every guess made in it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundResultResponse {
    pub round: RoundResponse,
    pub guesses: Vec<GuessModel>,
}

impl RoundResultResponse {
    pub fn new(result: RoundWithGuesses, timer_seconds: i32) -> Self {
        Self {
            round: RoundResponse::new(result.round, timer_seconds),
            guesses: result.guesses,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::models::NewRound;
    use crate::panorama::PanoramaPoint;

    #[test]
    fn test_open_round_hides_location() {
        let now = Utc::now();
        let mut round = NewRound {
            game_id: 1,
            round_num: 1,
            point: PanoramaPoint::new("secret", "pano-ref", 12.0, 34.0),
            created_at: now,
            started_at: now,
        }
        .into_model(3);

        let open = RoundResponse::new(round.clone(), 60);
        assert!(open.location.is_none());
        assert_eq!(open.deadline, Some(now + chrono::Duration::seconds(60)));
        let json = serde_json::to_string(&open).unwrap();
        assert!(!json.contains("secret"));

        round.finished = true;
        let closed = RoundResponse::new(round, 0);
        assert_eq!(closed.location.unwrap().lat, 12.0);
        assert_eq!(closed.deadline, None);
    }

    #[test]
    fn test_create_request_defaults() {
        let request: CreateGameRequest = serde_json::from_str(r#"{"rounds": 5}"#).unwrap();
        let parameters = GameParameters::from(request);

        assert_eq!(parameters.rounds, 5);
        assert_eq!(parameters.timer_seconds, 0);
        assert!(parameters.moving_allowed);
        assert_eq!(parameters.provider, Provider::Google);
    }
}
