use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use super::errors::GameError;
use super::models::{GameModel, GameParameters, GameSummary, NewRound, RoundModel};
use super::repository::GameTransaction;
use crate::panorama::PanoramaCatalog;
use crate::scoring::{self, ScoreResult};
use crate::shared::AppError;

/// Timing and limits shared by both round state machines
#[derive(Debug, Clone, Copy)]
pub struct GameSettings {
    /// Buffer between creating a round and it becoming playable
    pub round_start_delay: Duration,
    /// How long results of a finished multiplayer round stay up before advancing
    pub round_end_delay: Duration,
    pub max_rounds: i32,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            round_start_delay: Duration::seconds(2),
            round_end_delay: Duration::seconds(5),
            max_rounds: 20,
        }
    }
}

pub(crate) fn validate_parameters(
    parameters: &GameParameters,
    settings: &GameSettings,
) -> Result<(), AppError> {
    if parameters.rounds < 1 || parameters.rounds > settings.max_rounds {
        return Err(AppError::BadRequest(format!(
            "rounds must be between 1 and {}",
            settings.max_rounds
        )));
    }
    if parameters.timer_seconds < 0 {
        return Err(AppError::BadRequest(
            "timer_seconds must not be negative".to_string(),
        ));
    }
    Ok(())
}

/// Scores a guess, a guess that arrives after the round timer never scores
pub(crate) fn score_guess(
    game: &GameModel,
    round: &RoundModel,
    lat: f64,
    lng: f64,
    now: DateTime<Utc>,
) -> ScoreResult {
    let result = scoring::score(game.provider, round.lat, round.lng, lat, lng);

    if round.timer_elapsed(game.timer_seconds, now) {
        debug!(
            game_id = game.id,
            round_num = round.round_num,
            distance = result.distance,
            "Guess arrived after the deadline, forcing score to zero"
        );
        return ScoreResult {
            score: 0,
            distance: result.distance,
        };
    }
    result
}

/// Round the game currently points at, `None` before the first round
pub(crate) async fn current_round(
    tx: &mut dyn GameTransaction,
    game: &GameModel,
) -> Result<Option<RoundModel>, AppError> {
    if game.round_current == 0 {
        return Ok(None);
    }
    match tx.get_round(game.id, game.round_current).await? {
        Some(round) => Ok(Some(round)),
        None => Err(GameError::RoundNotFound.into()),
    }
}

/// Inserts round `round_current + 1` and moves the game onto it
///
/// Must run inside the transaction that holds the game lock.
pub(crate) async fn open_next_round(
    tx: &mut dyn GameTransaction,
    game: &mut GameModel,
    catalog: &dyn PanoramaCatalog,
    settings: &GameSettings,
    now: DateTime<Utc>,
) -> Result<RoundModel, AppError> {
    if !game.has_rounds_remaining() {
        return Err(GameError::RoundMaxAmount.into());
    }

    let point = catalog.random_point(game.provider).await?;
    let round = tx
        .insert_round(&NewRound {
            game_id: game.id,
            round_num: game.round_current + 1,
            point,
            created_at: now,
            started_at: now + settings.round_start_delay,
        })
        .await?;

    game.round_current = round.round_num;
    tx.update_game(game).await?;
    Ok(round)
}

/// Fails unless every round has been played and the last one is closed
pub(crate) async fn ensure_game_can_end(
    tx: &mut dyn GameTransaction,
    game: &GameModel,
) -> Result<(), AppError> {
    if game.has_rounds_remaining() {
        return Err(GameError::GameStillActive.into());
    }
    match current_round(tx, game).await? {
        Some(round) if round.finished => Ok(()),
        _ => Err(GameError::RoundStillActive.into()),
    }
}

pub(crate) async fn summarize(
    tx: &mut dyn GameTransaction,
    game: GameModel,
) -> Result<GameSummary, AppError> {
    let guesses = tx.guesses_for_game(game.id).await?;
    let totals = tx.player_totals(game.id).await?;
    Ok(GameSummary {
        game,
        guesses,
        totals,
    })
}
