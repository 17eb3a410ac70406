use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::connection_manager::{ConnectionManager, GroupId, LiveSession, SessionListener};
use super::messages::{ClientMessage, ServerMessage};
use super::socket::MessageHandler;
use crate::game::models::RoundWithGuesses;
use crate::game::types::{GuessResponse, RoundResponse, RoundResultResponse};
use crate::game::{EndRoundOutcome, MultiplayerService};
use crate::shared::AppError;

/// Live side of a multiplayer game
///
/// Every state change goes through MultiplayerService first, pushes only
/// happen after it committed.
pub struct GameLiveHandler {
    multiplayer: Arc<MultiplayerService>,
    connection_manager: Arc<dyn ConnectionManager>,
}

impl GameLiveHandler {
    pub fn new(
        multiplayer: Arc<MultiplayerService>,
        connection_manager: Arc<dyn ConnectionManager>,
    ) -> Self {
        Self {
            multiplayer,
            connection_manager,
        }
    }

    async fn submit_guess(
        &self,
        session: &LiveSession,
        game_id: i64,
        lat: f64,
        lng: f64,
    ) -> Result<(), AppError> {
        let user_id = &session.user.user_id;
        let game = self.multiplayer.get_game(user_id, game_id).await?;
        let submitted = self
            .multiplayer
            .submit_guess(user_id, game_id, lat, lng)
            .await?;

        self.connection_manager
            .send_to(
                &session.id,
                &ServerMessage::GuessAccepted {
                    guess: GuessResponse::new(submitted, game.timer_seconds),
                }
                .to_json(),
            )
            .await;
        self.connection_manager
            .broadcast_to_group_except(
                &session.group,
                &session.id,
                &ServerMessage::GuessSubmitted {
                    user_id: user_id.clone(),
                }
                .to_json(),
            )
            .await;

        // The last guess closes the round for everyone
        self.end_round(session, game_id).await
    }

    async fn end_round(&self, session: &LiveSession, game_id: i64) -> Result<(), AppError> {
        let user_id = &session.user.user_id;
        let game = self.multiplayer.get_game(user_id, game_id).await?;

        match self.multiplayer.end_round(user_id, game_id).await? {
            EndRoundOutcome::Finished { round, guesses } => {
                let result =
                    RoundResultResponse::new(RoundWithGuesses { round, guesses }, game.timer_seconds);
                self.connection_manager
                    .broadcast_to_group(&session.group, &ServerMessage::RoundResult { result }.to_json())
                    .await;
            }
            EndRoundOutcome::StillActive => {
                debug!(game_id, "Round still active, waiting for more guesses or the timer");
            }
        }
        Ok(())
    }

    async fn next_round(&self, session: &LiveSession, game_id: i64) -> Result<(), AppError> {
        let user_id = &session.user.user_id;
        let game = self.multiplayer.get_game(user_id, game_id).await?;
        let round = self.multiplayer.new_round(user_id, game_id).await?;

        info!(game_id, round_num = round.round_num, "Round started over live channel");
        self.connection_manager
            .broadcast_to_group(
                &session.group,
                &ServerMessage::RoundStarted {
                    round: RoundResponse::new(round, game.timer_seconds),
                }
                .to_json(),
            )
            .await;
        Ok(())
    }

    async fn end_game(&self, session: &LiveSession, game_id: i64) -> Result<(), AppError> {
        let summary = self
            .multiplayer
            .end_game(&session.user.user_id, game_id)
            .await?;

        self.connection_manager
            .broadcast_to_group(&session.group, &ServerMessage::GameResult { summary }.to_json())
            .await;
        Ok(())
    }

    async fn dispatch(
        &self,
        session: &LiveSession,
        game_id: i64,
        message: ClientMessage,
    ) -> Result<(), AppError> {
        match message {
            ClientMessage::SubmitGuess { lat, lng } => {
                self.submit_guess(session, game_id, lat, lng).await
            }
            ClientMessage::EndRound => self.end_round(session, game_id).await,
            ClientMessage::NextRound => self.next_round(session, game_id).await,
            ClientMessage::EndGame => self.end_game(session, game_id).await,
            ClientMessage::ChatMessage { content } => {
                self.connection_manager
                    .broadcast_to_group(
                        &session.group,
                        &ServerMessage::ChatMessage {
                            user: session.user.clone(),
                            content,
                        }
                        .to_json(),
                    )
                    .await;
                Ok(())
            }
            ClientMessage::StartGame => Err(AppError::BadRequest(
                "Game has already started".to_string(),
            )),
        }
    }
}

#[async_trait]
impl SessionListener for GameLiveHandler {
    async fn on_connect(&self, session: &LiveSession) -> Result<(), AppError> {
        let GroupId::Game(game_id) = session.group else {
            return Ok(());
        };

        self.connection_manager
            .broadcast_to_group_except(
                &session.group,
                &session.id,
                &ServerMessage::UserConnected {
                    user: session.user.clone(),
                }
                .to_json(),
            )
            .await;
        debug!(game_id, user_id = %session.user.user_id, "User joined game channel");
        Ok(())
    }

    async fn on_disconnect(&self, session: &LiveSession) {
        if !matches!(session.group, GroupId::Game(_)) {
            return;
        }

        // Leaving the channel does not leave the game, the player can come back
        self.connection_manager
            .broadcast_to_group(
                &session.group,
                &ServerMessage::UserDisconnected {
                    user: session.user.clone(),
                }
                .to_json(),
            )
            .await;
    }
}

#[async_trait]
impl MessageHandler for GameLiveHandler {
    async fn handle_message(&self, session: &LiveSession, message: String) {
        let GroupId::Game(game_id) = session.group else {
            return;
        };

        let result = match serde_json::from_str::<ClientMessage>(&message) {
            Ok(parsed) => self.dispatch(session, game_id, parsed).await,
            Err(e) => {
                warn!(game_id, error = %e, "Failed to parse live message");
                Err(AppError::BadRequest("Malformed message".to_string()))
            }
        };

        if let Err(e) = result {
            match &e {
                // Early callers, they retry once the round or game can move on
                AppError::Game(err) if err.is_still_active() => {
                    debug!(game_id, user_id = %session.user.user_id, error = %e, "Live game action too early");
                }
                _ => warn!(
                    game_id,
                    user_id = %session.user.user_id,
                    error = %e,
                    "Live game action failed"
                ),
            }
            self.connection_manager
                .send_to(&session.id, &ServerMessage::from_error(&e).to_json())
                .await;
        }
    }
}
