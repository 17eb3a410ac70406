use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::errors::GameError;
use super::models::{
    GameMode, GameModel, GameParameters, GameSummary, NewGame, NewGuess, RoundModel,
    RoundWithGuesses, SubmittedGuess,
};
use super::repository::{GameStore, GameTransaction, IsolationLevel};
use super::rounds::{self, GameSettings};
use crate::clock::Clock;
use crate::panorama::PanoramaCatalog;
use crate::shared::{AppError, Pagination};

/// Round state machine for solo games
///
/// Rounds are `pending -> active -> finished`: a round is created pending,
/// becomes playable at `started_at` and is closed by the single guess the
/// owner submits for it.
pub struct SingleplayerService {
    store: Arc<dyn GameStore>,
    catalog: Arc<dyn PanoramaCatalog>,
    clock: Arc<dyn Clock>,
    settings: GameSettings,
}

impl SingleplayerService {
    pub fn new(
        store: Arc<dyn GameStore>,
        catalog: Arc<dyn PanoramaCatalog>,
        clock: Arc<dyn Clock>,
        settings: GameSettings,
    ) -> Self {
        Self {
            store,
            catalog,
            clock,
            settings,
        }
    }

    #[instrument(skip(self))]
    pub async fn create_game(
        &self,
        user_id: &str,
        parameters: GameParameters,
    ) -> Result<GameModel, AppError> {
        rounds::validate_parameters(&parameters, &self.settings)?;

        let mut tx = self.store.begin(IsolationLevel::ReadCommitted).await?;
        let game = tx
            .insert_game(&NewGame::singleplayer(user_id, parameters, self.clock.now()))
            .await?;
        tx.commit().await?;

        info!(game_id = game.id, user_id = %user_id, rounds = game.rounds, "Singleplayer game created");
        Ok(game)
    }

    #[instrument(skip(self))]
    pub async fn get_game(&self, user_id: &str, game_id: i64) -> Result<GameModel, AppError> {
        let game = self
            .store
            .get_game(game_id)
            .await?
            .filter(|g| g.mode == GameMode::Singleplayer)
            .ok_or(GameError::GameNotFound)?;

        ensure_owner(&game, user_id)?;
        Ok(game)
    }

    /// Creates the next round, or returns the current one while it is still open
    #[instrument(skip(self))]
    pub async fn new_round(&self, user_id: &str, game_id: i64) -> Result<RoundModel, AppError> {
        let mut tx = self.store.begin(IsolationLevel::ReadCommitted).await?;
        let mut game = lock_owned_game(tx.as_mut(), game_id, user_id).await?;

        if let Some(current) = rounds::current_round(tx.as_mut(), &game).await? {
            if !current.finished {
                debug!(game_id, round_num = current.round_num, "Current round still open, returning it");
                return Ok(current);
            }
        }

        let now = self.clock.now();
        let round = rounds::open_next_round(
            tx.as_mut(),
            &mut game,
            self.catalog.as_ref(),
            &self.settings,
            now,
        )
        .await?;
        tx.commit().await?;

        info!(game_id, round_num = round.round_num, "Singleplayer round created");
        Ok(round)
    }

    #[instrument(skip(self))]
    pub async fn current_round(&self, user_id: &str, game_id: i64) -> Result<RoundModel, AppError> {
        let game = self.get_game(user_id, game_id).await?;
        if game.round_current == 0 {
            return Err(GameError::RoundNotFound.into());
        }

        self.store
            .get_round(game_id, game.round_current)
            .await?
            .ok_or_else(|| GameError::RoundNotFound.into())
    }

    /// Scores the owner's guess and closes the current round in one transaction
    #[instrument(skip(self))]
    pub async fn submit_guess(
        &self,
        user_id: &str,
        game_id: i64,
        lat: f64,
        lng: f64,
    ) -> Result<SubmittedGuess, AppError> {
        let mut tx = self.store.begin(IsolationLevel::ReadCommitted).await?;
        let mut game = lock_owned_game(tx.as_mut(), game_id, user_id).await?;

        let mut round = rounds::current_round(tx.as_mut(), &game)
            .await?
            .ok_or(GameError::RoundNotFound)?;
        if round.finished {
            return Err(GameError::RoundAlreadyFinished.into());
        }

        let now = self.clock.now();
        let result = rounds::score_guess(&game, &round, lat, lng, now);

        let guess = tx
            .insert_guess(&NewGuess {
                round_id: round.id,
                user_id: user_id.to_string(),
                lat,
                lng,
                score: result.score,
                distance: result.distance,
                created_at: now,
            })
            .await?;
        round.guesses_count = tx.increment_guess_count(round.id).await?;
        tx.finish_round(round.id, now).await?;
        round.finished = true;
        round.ended_at = Some(now);

        game.score = Some(game.score.unwrap_or(0) + guess.score);
        tx.update_game(&game).await?;
        tx.commit().await?;

        info!(
            game_id,
            round_num = round.round_num,
            score = guess.score,
            distance = guess.distance,
            "Singleplayer round finished"
        );
        Ok(SubmittedGuess { round, guess })
    }

    /// Marks the game finished once its last round is closed, repeat calls return the same summary
    #[instrument(skip(self))]
    pub async fn end_game(&self, user_id: &str, game_id: i64) -> Result<GameSummary, AppError> {
        let mut tx = self.store.begin(IsolationLevel::ReadCommitted).await?;
        let mut game = lock_owned_game(tx.as_mut(), game_id, user_id).await?;

        if game.finished {
            debug!(game_id, "Game already finished, returning stored summary");
            return rounds::summarize(tx.as_mut(), game).await;
        }

        rounds::ensure_game_can_end(tx.as_mut(), &game).await?;

        game.finished = true;
        game.ended_at = Some(self.clock.now());
        tx.update_game(&game).await?;
        let summary = rounds::summarize(tx.as_mut(), game).await?;
        tx.commit().await?;

        info!(game_id, score = ?summary.game.score, "Singleplayer game finished");
        Ok(summary)
    }

    #[instrument(skip(self))]
    pub async fn list_games(
        &self,
        user_id: &str,
        page: &Pagination,
    ) -> Result<Vec<GameModel>, AppError> {
        page.validate()?;
        self.store
            .list_games_for_user(user_id, GameMode::Singleplayer, page)
            .await
    }

    #[instrument(skip(self))]
    pub async fn finished_rounds(
        &self,
        user_id: &str,
        game_id: i64,
    ) -> Result<Vec<RoundWithGuesses>, AppError> {
        self.get_game(user_id, game_id).await?;
        self.store.finished_rounds(game_id).await
    }
}

fn ensure_owner(game: &GameModel, user_id: &str) -> Result<(), GameError> {
    if game.is_owned_by(user_id) {
        Ok(())
    } else {
        Err(GameError::WrongUser)
    }
}

async fn lock_owned_game(
    tx: &mut dyn GameTransaction,
    game_id: i64,
    user_id: &str,
) -> Result<GameModel, AppError> {
    let game = tx
        .lock_game(game_id)
        .await?
        .filter(|g| g.mode == GameMode::Singleplayer)
        .ok_or(GameError::GameNotFound)?;
    ensure_owner(&game, user_id)?;
    Ok(game)
}
