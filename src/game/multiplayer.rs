use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::errors::GameError;
use super::models::{
    GameMode, GameModel, GameParameters, GameSummary, GuessModel, NewGame, NewGuess, RoundModel,
    RoundWithGuesses, SubmittedGuess,
};
use super::repository::{GameStore, GameTransaction, IsolationLevel};
use super::rounds::{self, GameSettings};
use crate::clock::Clock;
use crate::panorama::PanoramaCatalog;
use crate::shared::{AppError, Pagination};

/// Result of asking to close the current multiplayer round
#[derive(Debug, Clone, PartialEq)]
pub enum EndRoundOutcome {
    /// The round is closed, either now or by an earlier caller
    Finished {
        round: RoundModel,
        guesses: Vec<GuessModel>,
    },
    /// Neither every player has guessed nor has the timer run out
    StillActive,
}

impl EndRoundOutcome {
    /// Turns `StillActive` into an error for callers that report it
    pub fn into_result(self) -> Result<RoundWithGuesses, GameError> {
        match self {
            EndRoundOutcome::Finished { round, guesses } => Ok(RoundWithGuesses { round, guesses }),
            EndRoundOutcome::StillActive => Err(GameError::RoundStillActive),
        }
    }
}

/// Round state machine shared by every player of a game
///
/// A round closes on consensus: once every player has guessed or the timer
/// ran out. Any member may ask to advance, and the game row lock makes sure
/// only the first of several concurrent callers actually does.
pub struct MultiplayerService {
    store: Arc<dyn GameStore>,
    catalog: Arc<dyn PanoramaCatalog>,
    clock: Arc<dyn Clock>,
    settings: GameSettings,
}

impl MultiplayerService {
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

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    /// Creates a game for the given roster, the creator is always part of it
    #[instrument(skip(self))]
    pub async fn create_game(
        &self,
        creator_id: &str,
        parameters: GameParameters,
        players: Vec<String>,
    ) -> Result<GameModel, AppError> {
        rounds::validate_parameters(&parameters, &self.settings)?;

        let mut tx = self.store.begin(IsolationLevel::ReadCommitted).await?;
        let game = tx
            .insert_game(&NewGame::multiplayer(
                creator_id,
                parameters,
                roster(creator_id, players),
                self.clock.now(),
            ))
            .await?;
        tx.commit().await?;

        info!(
            game_id = game.id,
            creator_id = %creator_id,
            player_count = ?game.player_count,
            "Multiplayer game created"
        );
        Ok(game)
    }

    /// Creates a game and opens its first round in the same transaction
    ///
    /// Nothing is stored when the first round cannot be opened.
    #[instrument(skip(self))]
    pub async fn start_game(
        &self,
        creator_id: &str,
        parameters: GameParameters,
        players: Vec<String>,
    ) -> Result<(GameModel, RoundModel), AppError> {
        rounds::validate_parameters(&parameters, &self.settings)?;
        let now = self.clock.now();

        let mut tx = self.store.begin(IsolationLevel::ReadCommitted).await?;
        let mut game = tx
            .insert_game(&NewGame::multiplayer(
                creator_id,
                parameters,
                roster(creator_id, players),
                now,
            ))
            .await?;
        let round = rounds::open_next_round(
            tx.as_mut(),
            &mut game,
            self.catalog.as_ref(),
            &self.settings,
            now,
        )
        .await?;
        tx.commit().await?;

        info!(
            game_id = game.id,
            creator_id = %creator_id,
            player_count = ?game.player_count,
            "Multiplayer game started"
        );
        Ok((game, round))
    }

    #[instrument(skip(self))]
    pub async fn get_game(&self, user_id: &str, game_id: i64) -> Result<GameModel, AppError> {
        let game = self
            .store
            .get_game(game_id)
            .await?
            .filter(|g| g.mode == GameMode::Multiplayer)
            .ok_or(GameError::GameNotFound)?;

        if !self.store.is_member(game_id, user_id).await? {
            return Err(GameError::WrongMembership.into());
        }
        Ok(game)
    }

    /// Advances to the next round
    ///
    /// Returns the current round unchanged while it is open or while its
    /// results are still on display.
    #[instrument(skip(self))]
    pub async fn new_round(&self, user_id: &str, game_id: i64) -> Result<RoundModel, AppError> {
        let mut tx = self.store.begin(IsolationLevel::ReadCommitted).await?;
        let mut game = lock_member_game(tx.as_mut(), game_id, user_id).await?;
        let now = self.clock.now();

        if let Some(current) = rounds::current_round(tx.as_mut(), &game).await? {
            if !current.finished || current.in_result_window(self.settings.round_end_delay, now) {
                debug!(
                    game_id,
                    round_num = current.round_num,
                    finished = current.finished,
                    "Not advancing, returning current round"
                );
                return Ok(current);
            }
        }

        let round = rounds::open_next_round(
            tx.as_mut(),
            &mut game,
            self.catalog.as_ref(),
            &self.settings,
            now,
        )
        .await?;
        tx.commit().await?;

        info!(game_id, round_num = round.round_num, "Multiplayer round started");
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

    /// Records a player's guess for the current round without closing it
    ///
    /// Submitting again while the round is open returns the stored guess.
    #[instrument(skip(self))]
    pub async fn submit_guess(
        &self,
        user_id: &str,
        game_id: i64,
        lat: f64,
        lng: f64,
    ) -> Result<SubmittedGuess, AppError> {
        let mut tx = self.store.begin(IsolationLevel::ReadCommitted).await?;
        let game = lock_member_game(tx.as_mut(), game_id, user_id).await?;

        let mut round = rounds::current_round(tx.as_mut(), &game)
            .await?
            .ok_or(GameError::RoundNotFound)?;
        if round.finished {
            return Err(GameError::RoundAlreadyFinished.into());
        }

        if let Some(existing) = tx.find_guess(round.id, user_id).await? {
            debug!(game_id, round_num = round.round_num, user_id = %user_id, "Guess already recorded");
            return Ok(SubmittedGuess {
                round,
                guess: existing,
            });
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
        tx.commit().await?;

        info!(
            game_id,
            round_num = round.round_num,
            user_id = %user_id,
            score = guess.score,
            guesses = round.guesses_count,
            "Multiplayer guess recorded"
        );
        Ok(SubmittedGuess { round, guess })
    }

    /// Closes the current round once every player guessed or the timer ran out
    ///
    /// Players without a guess get a zero-sentinel guess so the result lists
    /// everyone. Closing an already closed round returns the same guesses.
    #[instrument(skip(self))]
    pub async fn end_round(&self, user_id: &str, game_id: i64) -> Result<EndRoundOutcome, AppError> {
        let mut tx = self.store.begin(IsolationLevel::ReadCommitted).await?;
        let game = lock_member_game(tx.as_mut(), game_id, user_id).await?;

        let round = rounds::current_round(tx.as_mut(), &game)
            .await?
            .ok_or(GameError::RoundNotFound)?;

        if round.finished {
            let guesses = tx.guesses_for_round(round.id).await?;
            return Ok(EndRoundOutcome::Finished { round, guesses });
        }

        let now = self.clock.now();
        let player_count = game.player_count.unwrap_or(0);
        let quorum = round.guesses_count >= player_count;
        let timed_out = round.timer_elapsed(game.timer_seconds, now);

        if !quorum && !timed_out {
            debug!(
                game_id,
                round_num = round.round_num,
                guesses = round.guesses_count,
                player_count,
                "Round still active"
            );
            return Ok(EndRoundOutcome::StillActive);
        }

        for player in tx.game_players(game_id).await? {
            if tx.find_guess(round.id, &player).await?.is_none() {
                tx.insert_guess(&NewGuess {
                    round_id: round.id,
                    user_id: player,
                    lat: 0.0,
                    lng: 0.0,
                    score: 0,
                    distance: 0.0,
                    created_at: now,
                })
                .await?;
                tx.increment_guess_count(round.id).await?;
            }
        }

        tx.finish_round(round.id, now).await?;
        let round = tx
            .get_round(game_id, round.round_num)
            .await?
            .ok_or(GameError::RoundNotFound)?;
        let guesses = tx.guesses_for_round(round.id).await?;
        tx.commit().await?;

        info!(
            game_id,
            round_num = round.round_num,
            quorum,
            timed_out,
            "Multiplayer round finished"
        );
        Ok(EndRoundOutcome::Finished { round, guesses })
    }

    /// Marks the game finished once its last round is closed, repeat calls return the same summary
    #[instrument(skip(self))]
    pub async fn end_game(&self, user_id: &str, game_id: i64) -> Result<GameSummary, AppError> {
        let mut tx = self.store.begin(IsolationLevel::ReadCommitted).await?;
        let mut game = lock_member_game(tx.as_mut(), game_id, user_id).await?;

        if game.finished {
            return rounds::summarize(tx.as_mut(), game).await;
        }

        rounds::ensure_game_can_end(tx.as_mut(), &game).await?;

        game.finished = true;
        game.ended_at = Some(self.clock.now());
        tx.update_game(&game).await?;
        let summary = rounds::summarize(tx.as_mut(), game).await?;
        tx.commit().await?;

        info!(game_id, "Multiplayer game finished");
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
            .list_games_for_user(user_id, GameMode::Multiplayer, page)
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

/// Deduplicated roster with the creator first
fn roster(creator_id: &str, players: Vec<String>) -> Vec<String> {
    let mut roster = vec![creator_id.to_string()];
    for player in players {
        if !roster.contains(&player) {
            roster.push(player);
        }
    }
    roster
}

async fn lock_member_game(
    tx: &mut dyn GameTransaction,
    game_id: i64,
    user_id: &str,
) -> Result<GameModel, AppError> {
    let game = tx
        .lock_game(game_id)
        .await?
        .filter(|g| g.mode == GameMode::Multiplayer)
        .ok_or(GameError::GameNotFound)?;

    if !tx.is_member(game_id, user_id).await? {
        return Err(GameError::WrongMembership.into());
    }
    Ok(game)
}
